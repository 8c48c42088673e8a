//! Error types for the message router.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use sim_msgrouter::{Body, RequestConfig, Result};
//!
//! async fn example(router: &MsgRouter) -> Result<()> {
//!     let reply = router.send("/simulation-list", Body::Empty, RequestConfig::json())?.await?;
//!     println!("{:?}", reply.data);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Usage | [`Error::InvalidArgument`], [`Error::InvalidUpload`], [`Error::DuplicateAsyncMsg`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`] |
//! | Application | [`Error::Http`], [`Error::SrException`], [`Error::ErrorReply`] |
//! | Session | [`Error::SessionRotated`], [`Error::Abandoned`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::Encode`], [`Error::Decode`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::ReqSeq;

// ============================================================================
// Constants
// ============================================================================

/// Status attached to synthetic rejections for protocol violations.
pub const PROTOCOL_ERROR_STATUS: u16 = 500;

/// Status attached to replies that decoded fine but carry an `error` field.
pub const ERROR_REPLY_STATUS: u16 = 200;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned by the router builder when a setting is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// Invalid argument to a router call.
    ///
    /// Returned when a request URI cannot be percent-decoded.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Multipart form data the wire format cannot carry.
    ///
    /// More than one file field, or a file field not named `file`.
    #[error("Invalid upload: {message}")]
    InvalidUpload {
        /// Description of the invalid form.
        message: String,
    },

    /// A handler is already registered for this async message method.
    #[error("Async message handler already registered: {method}")]
    DuplicateAsyncMsg {
        /// The method name registered twice.
        method: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The router task has stopped.
    ///
    /// Returned when the router was shut down while a call was in progress.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected reply.
    ///
    /// Version mismatch, unknown kind, or a content shape that does not
    /// match the expected response type.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
        /// Sequence number of the affected request, if any.
        req_seq: Option<ReqSeq>,
    },

    // ========================================================================
    // Application Errors
    // ========================================================================
    /// Server raised an HTTP-style exception.
    #[error("HTTP error {status}")]
    Http {
        /// Status code supplied by the server.
        status: u16,
    },

    /// Server raised an application-level exception.
    #[error("Server exception: {route_name}")]
    SrException {
        /// Route the client is expected to follow (e.g. `login`).
        route_name: String,
        /// Route parameters supplied by the server.
        params: Value,
    },

    /// Reply decoded successfully but carries an `error` field.
    #[error("Server replied with error: {data}")]
    ErrorReply {
        /// The full reply content.
        data: Value,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// The session cookie was changed by someone else.
    ///
    /// Fatal to the session; the application must reload.
    #[error("Session cookie {cookie_name} was rotated externally")]
    SessionRotated {
        /// Name of the session cookie.
        cookie_name: String,
    },

    /// The request was dropped without a reply.
    ///
    /// Produced by [`clear_models`](crate::MsgRouter::clear_models) and by
    /// sends skipped because a session rotation is pending. Callers are
    /// expected to be torn down and should not present it.
    #[error("Request abandoned")]
    Abandoned,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Msgpack encode error.
    #[error("Msgpack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Msgpack decode error.
    #[error("Msgpack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Msgpack value conversion error.
    #[error("Msgpack value error: {0}")]
    Value(#[from] rmpv::ext::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid upload error.
    #[inline]
    pub fn invalid_upload(message: impl Into<String>) -> Self {
        Self::InvalidUpload {
            message: message.into(),
        }
    }

    /// Creates a duplicate async message error.
    #[inline]
    pub fn duplicate_async_msg(method: impl Into<String>) -> Self {
        Self::DuplicateAsyncMsg {
            method: method.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error not tied to a request.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            req_seq: None,
        }
    }

    /// Creates a protocol error for a specific request.
    #[inline]
    pub fn protocol_for(req_seq: ReqSeq, message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            req_seq: Some(req_seq),
        }
    }

    /// Creates an HTTP-style error.
    #[inline]
    pub fn http(status: u16) -> Self {
        Self::Http { status }
    }

    /// Creates an application-level server exception.
    #[inline]
    pub fn sr_exception(route_name: impl Into<String>, params: Value) -> Self {
        Self::SrException {
            route_name: route_name.into(),
            params,
        }
    }

    /// Creates a session rotated error.
    #[inline]
    pub fn session_rotated(cookie_name: impl Into<String>) -> Self {
        Self::SessionRotated {
            cookie_name: cookie_name.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the HTTP-shaped status of a rejection, if it has one.
    ///
    /// Protocol errors map to 500, server `httpException`s to their code.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Protocol { .. } => Some(PROTOCOL_ERROR_STATUS),
            Self::Http { status } => Some(*status),
            Self::ErrorReply { .. } => Some(ERROR_REPLY_STATUS),
            _ => None,
        }
    }

    /// Returns `true` if this is a protocol error.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns `true` if this error indicates a caller bug.
    #[inline]
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. }
                | Self::InvalidUpload { .. }
                | Self::DuplicateAsyncMsg { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the request was dropped without a reply.
    #[inline]
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        matches!(self, Self::Abandoned)
    }

    /// Returns `true` if the application must reload.
    #[inline]
    #[must_use]
    pub fn is_session_rotated(&self) -> bool {
        matches!(self, Self::SessionRotated { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing url");
        assert_eq!(err.to_string(), "Configuration error: missing url");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::protocol("bad version").status(), Some(500));
        assert_eq!(Error::http(404).status(), Some(404));
        assert_eq!(
            Error::ErrorReply {
                data: json!({"error": "nope"})
            }
            .status(),
            Some(200)
        );
        assert_eq!(Error::sr_exception("login", json!({})).status(), None);
        assert_eq!(Error::Abandoned.status(), None);
    }

    #[test]
    fn test_protocol_for_keeps_req_seq() {
        let err = Error::protocol_for(ReqSeq::new(7), "unexpected kind");
        match err {
            Error::Protocol { req_seq, .. } => assert_eq!(req_seq, Some(ReqSeq::new(7))),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_is_usage_error() {
        assert!(Error::invalid_argument("bad uri").is_usage_error());
        assert!(Error::invalid_upload("two files").is_usage_error());
        assert!(Error::duplicate_async_msg("setCookies").is_usage_error());
        assert!(!Error::protocol("x").is_usage_error());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_session_predicates() {
        assert!(Error::Abandoned.is_abandoned());
        assert!(Error::session_rotated("sirepo_dev").is_session_rotated());
        assert!(!Error::Abandoned.is_session_rotated());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
