//! Frame header types.
//!
//! Every frame, in both directions, starts with a msgpack-encoded header
//! map. [`WireHeader`] is the loose record as it appears on the wire;
//! [`Header`] is the checked form where `kind` decides which fields exist.
//!
//! # Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "kind": 1,
//!   "reqSeq": 17,
//!   "uri": "/simulation-list"
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identifiers::ReqSeq;

// ============================================================================
// Constants
// ============================================================================

/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: u32 = 1;

// ============================================================================
// Kind
// ============================================================================

/// Frame kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Client request (client → server).
    HttpRequest,
    /// Successful reply (server → client).
    HttpReply,
    /// Application-level exception (server → client).
    SrException,
    /// Unsolicited push message (server → client).
    AsyncMsg,
}

impl Kind {
    /// Returns the wire code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::HttpRequest => 1,
            Self::HttpReply => 2,
            Self::SrException => 3,
            Self::AsyncMsg => 4,
        }
    }

    /// Parses a wire code.
    #[inline]
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::HttpRequest),
            2 => Some(Self::HttpReply),
            3 => Some(Self::SrException),
            4 => Some(Self::AsyncMsg),
            _ => None,
        }
    }
}

// ============================================================================
// WireHeader
// ============================================================================

/// Header record exactly as encoded on the wire.
///
/// Fields are optional here so that a malformed header can still be
/// inspected (e.g. for its `reqSeq`) before it is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireHeader {
    /// Protocol version of the sender.
    pub version: u32,

    /// Raw kind code.
    pub kind: u8,

    /// Correlation id.
    #[serde(rename = "reqSeq", default, skip_serializing_if = "Option::is_none")]
    pub req_seq: Option<ReqSeq>,

    /// Request path (requests only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Handler name (async messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl WireHeader {
    /// Validates the record into a typed [`Header`].
    ///
    /// Does not check `version`; callers compare it themselves so they can
    /// still correlate the frame with a request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the kind is unknown or a field the
    /// kind requires is missing.
    pub fn into_header(self) -> Result<Header> {
        let kind = Kind::from_code(self.kind).ok_or_else(|| Self::malformed(&self, "unknown kind"))?;

        let header = match kind {
            Kind::HttpRequest => Header::HttpRequest {
                req_seq: self.require_req_seq()?,
                uri: self
                    .uri
                    .clone()
                    .ok_or_else(|| Self::malformed(&self, "httpRequest without uri"))?,
            },
            Kind::HttpReply => Header::HttpReply {
                req_seq: self.require_req_seq()?,
            },
            Kind::SrException => Header::SrException {
                req_seq: self.require_req_seq()?,
            },
            Kind::AsyncMsg => Header::AsyncMsg {
                method: self
                    .method
                    .clone()
                    .ok_or_else(|| Self::malformed(&self, "asyncMsg without method"))?,
            },
        };

        Ok(header)
    }

    fn require_req_seq(&self) -> Result<ReqSeq> {
        self.req_seq
            .ok_or_else(|| Self::malformed(self, "missing reqSeq"))
    }

    fn malformed(header: &Self, what: &str) -> Error {
        let message = format!("{what}: {header:?}");
        match header.req_seq {
            Some(req_seq) => Error::protocol_for(req_seq, message),
            None => Error::protocol(message),
        }
    }
}

// ============================================================================
// Header
// ============================================================================

/// Checked frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    /// Client request.
    HttpRequest {
        /// Correlation id.
        req_seq: ReqSeq,
        /// Decoded request path.
        uri: String,
    },
    /// Successful reply.
    HttpReply {
        /// Correlation id echoed by the server.
        req_seq: ReqSeq,
    },
    /// Application-level exception.
    SrException {
        /// Correlation id echoed by the server.
        req_seq: ReqSeq,
    },
    /// Server push.
    AsyncMsg {
        /// Registered handler name.
        method: String,
    },
}

impl Header {
    /// Returns the kind of this header.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::HttpRequest { .. } => Kind::HttpRequest,
            Self::HttpReply { .. } => Kind::HttpReply,
            Self::SrException { .. } => Kind::SrException,
            Self::AsyncMsg { .. } => Kind::AsyncMsg,
        }
    }

    /// Returns the correlation id, if this kind carries one.
    #[inline]
    #[must_use]
    pub fn req_seq(&self) -> Option<ReqSeq> {
        match self {
            Self::HttpRequest { req_seq, .. }
            | Self::HttpReply { req_seq }
            | Self::SrException { req_seq } => Some(*req_seq),
            Self::AsyncMsg { .. } => None,
        }
    }

    /// Converts to the wire record for the given protocol version.
    #[must_use]
    pub fn to_wire(&self, version: u32) -> WireHeader {
        let mut wire = WireHeader {
            version,
            kind: self.kind().code(),
            req_seq: self.req_seq(),
            ..WireHeader::default()
        };

        match self {
            Self::HttpRequest { uri, .. } => wire.uri = Some(uri.clone()),
            Self::AsyncMsg { method } => wire.method = Some(method.clone()),
            Self::HttpReply { .. } | Self::SrException { .. } => {}
        }

        wire
    }
}

// ============================================================================
// Tests
// ============================================================================
