//! Reply types and content coercion.
//!
//! The expected [`ResponseType`] of a request decides how the content of
//! its `httpReply` is interpreted:
//!
//! | Response type | Accepted content | Result |
//! |---------------|------------------|--------|
//! | `Default` | anything | [`ReplyData::Raw`] |
//! | `Json` | map, array, or JSON text | [`ReplyData::Json`] |
//! | `Blob` | binary | [`ReplyData::Blob`] |

// ============================================================================
// Imports
// ============================================================================

use rmpv::Value;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::identifiers::ReqSeq;

// ============================================================================
// Constants
// ============================================================================

/// Status of every successful reply.
pub const OK_STATUS: u16 = 200;

/// Route name the server uses for HTTP-style exceptions.
const HTTP_EXCEPTION_ROUTE: &str = "httpException";

// ============================================================================
// ResponseType
// ============================================================================

/// How a reply's content should be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseType {
    /// Pass the msgpack value through.
    #[default]
    Default,
    /// Expect JSON-shaped content.
    Json,
    /// Expect raw bytes.
    Blob,
}

// ============================================================================
// RequestConfig
// ============================================================================

/// Per-request options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestConfig {
    /// Expected reply decoding.
    pub response_type: ResponseType,
}

impl RequestConfig {
    /// Config expecting a JSON reply.
    #[inline]
    #[must_use]
    pub const fn json() -> Self {
        Self {
            response_type: ResponseType::Json,
        }
    }

    /// Config expecting a binary reply.
    #[inline]
    #[must_use]
    pub const fn blob() -> Self {
        Self {
            response_type: ResponseType::Blob,
        }
    }
}

// ============================================================================
// Reply
// ============================================================================

/// A settled, successful reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Decoded content.
    pub data: ReplyData,
    /// Always 200 for successful replies.
    pub status: u16,
}

/// Decoded reply content.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyData {
    /// Untouched msgpack value.
    Raw(Value),
    /// JSON document.
    Json(JsonValue),
    /// Binary payload (file or image download).
    Blob(Blob),
}

impl ReplyData {
    /// Returns the JSON document, if this is one.
    #[inline]
    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the blob, if this is one.
    #[inline]
    #[must_use]
    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(blob) => Some(blob),
            _ => None,
        }
    }
}

/// Binary reply payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blob {
    bytes: Vec<u8>,
}

impl Blob {
    /// Wraps raw bytes.
    #[inline]
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Returns the bytes.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the blob, returning its bytes.
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Returns the size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the blob is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ============================================================================
// Coercion
// ============================================================================

/// Interprets `httpReply` content according to the expected response type.
///
/// # Errors
///
/// - [`Error::Protocol`] if the content shape does not fit `response_type`
/// - [`Error::ErrorReply`] if JSON content carries an `error` field
pub fn coerce_reply(req_seq: ReqSeq, response_type: ResponseType, content: Value) -> Result<Reply> {
    let data = match response_type {
        ResponseType::Default => ReplyData::Raw(content),
        ResponseType::Blob => match content {
            Value::Binary(bytes) => ReplyData::Blob(Blob::new(bytes)),
            other => {
                return Err(Error::protocol_for(
                    req_seq,
                    format!("expected binary content for blob reply, got {other}"),
                ));
            }
        },
        ResponseType::Json => ReplyData::Json(coerce_json(req_seq, content)?),
    };

    Ok(Reply {
        data,
        status: OK_STATUS,
    })
}

fn coerce_json(req_seq: ReqSeq, content: Value) -> Result<JsonValue> {
    let json = match content {
        Value::String(text) => {
            let Some(text) = text.as_str() else {
                return Err(Error::protocol_for(req_seq, "reply text is not UTF-8"));
            };
            serde_json::from_str::<JsonValue>(text).map_err(|e| {
                Error::protocol_for(req_seq, format!("reply text is not JSON: {e}"))
            })?
        }
        content @ (Value::Map(_) | Value::Array(_)) => to_json(req_seq, content)?,
        other => {
            return Err(Error::protocol_for(
                req_seq,
                format!("unexpected content for json reply: {other}"),
            ));
        }
    };

    if json.get("error").is_some() {
        return Err(Error::ErrorReply { data: json });
    }

    Ok(json)
}

/// Builds the rejection for an `srException` frame.
///
/// Content is `{routeName, params}`. The `httpException` route becomes an
/// [`Error::Http`] with `params.code` as status; any other route becomes an
/// [`Error::SrException`].
#[must_use]
pub fn sr_exception_error(req_seq: ReqSeq, content: Value) -> Error {
    let json = match to_json(req_seq, content) {
        Ok(json) => json,
        Err(e) => return e,
    };

    let Some(route_name) = json.get("routeName").and_then(JsonValue::as_str) else {
        return Error::protocol_for(req_seq, format!("srException without routeName: {json}"));
    };
    let params = json.get("params").cloned().unwrap_or(JsonValue::Null);

    if route_name == HTTP_EXCEPTION_ROUTE {
        let status = params
            .get("code")
            .and_then(JsonValue::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(crate::error::PROTOCOL_ERROR_STATUS);
        return Error::http(status);
    }

    Error::sr_exception(route_name, params)
}

fn to_json(req_seq: ReqSeq, content: Value) -> Result<JsonValue> {
    rmpv::ext::from_value::<JsonValue>(content)
        .map_err(|e| Error::protocol_for(req_seq, format!("content is not JSON-shaped: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
