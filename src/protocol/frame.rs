//! Binary frame codec.
//!
//! A frame is one binary WebSocket message:
//!
//! ```text
//! ┌──────────────┬───────────────┬──────────────────────────────┐
//! │ header (map) │ content (any) │ attachment* (map per upload) │
//! └──────────────┴───────────────┴──────────────────────────────┘
//! ```
//!
//! Every segment is a complete msgpack value, so segment boundaries come
//! from msgpack's own length prefixes. Attachments carry upload bytes as
//! `{filename: str, blob: bin}`.

// ============================================================================
// Imports
// ============================================================================

use std::io::Cursor;

use bytes::Bytes;
use rmpv::Value;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::header::WireHeader;

// ============================================================================
// Attachment
// ============================================================================

/// Binary segment appended after the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Original file name.
    pub filename: String,
    /// File contents.
    pub blob: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment.
    #[inline]
    #[must_use]
    pub fn new(filename: impl Into<String>, blob: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            blob,
        }
    }

    fn to_value(&self) -> Value {
        Value::Map(vec![
            (Value::from("filename"), Value::from(self.filename.as_str())),
            (Value::from("blob"), Value::Binary(self.blob.clone())),
        ])
    }

    fn from_value(value: Value) -> Result<Self> {
        let Value::Map(entries) = value else {
            return Err(Error::protocol("attachment is not a map"));
        };

        let mut filename = None;
        let mut blob = None;
        for (key, value) in entries {
            match (key.as_str(), value) {
                (Some("filename"), Value::String(s)) => filename = s.into_str(),
                (Some("blob"), Value::Binary(b)) => blob = Some(b),
                _ => {}
            }
        }

        match (filename, blob) {
            (Some(filename), Some(blob)) => Ok(Self { filename, blob }),
            _ => Err(Error::protocol("attachment requires filename and blob")),
        }
    }
}

// ============================================================================
// Frame
// ============================================================================

/// One decoded wire frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Header record.
    pub header: WireHeader,
    /// Content segment.
    pub content: Value,
    /// Trailing upload segments.
    pub attachments: Vec<Attachment>,
}

impl Frame {
    /// Creates a frame with no attachments.
    #[inline]
    #[must_use]
    pub fn new(header: WireHeader, content: Value) -> Self {
        Self {
            header,
            content,
            attachments: Vec::new(),
        }
    }

    /// Appends an attachment.
    #[inline]
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Encodes header, content and attachments into one buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if msgpack serialization fails.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = rmp_serde::to_vec_named(&self.header)?;
        write_value(&mut buf, &self.content)?;
        for attachment in &self.attachments {
            write_value(&mut buf, &attachment.to_value())?;
        }
        Ok(Bytes::from(buf))
    }

    /// Decodes a frame from a raw buffer.
    ///
    /// # Errors
    ///
    /// - [`Error::Decode`] if the header or content is not valid msgpack
    /// - [`Error::Protocol`] if a trailing attachment is malformed
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);

        let header = WireHeader::deserialize(&mut rmp_serde::Deserializer::new(&mut cursor))?;
        let content = read_value(&mut cursor)?;

        let mut attachments = Vec::new();
        while (cursor.position() as usize) < bytes.len() {
            attachments.push(Attachment::from_value(read_value(&mut cursor)?)?);
        }

        Ok(Self {
            header,
            content,
            attachments,
        })
    }
}

// ============================================================================
// InboundFrame
// ============================================================================

/// Header and content of a server-to-client frame.
///
/// Content is decoded separately from the header so that a frame with a
/// readable header and unreadable content can still be matched to its
/// request.
#[derive(Debug)]
pub struct InboundFrame {
    /// Header record.
    pub header: WireHeader,
    /// Content segment, or why it could not be read.
    pub content: Result<Value>,
    /// Bytes left after the content; servers never send attachments.
    pub trailing: usize,
}

impl InboundFrame {
    /// Decodes header and content, ignoring anything after the content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] only if the header itself is unreadable.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);

        let header = WireHeader::deserialize(&mut rmp_serde::Deserializer::new(&mut cursor))?;
        let content = read_value(&mut cursor);
        let trailing = match content {
            Ok(_) => bytes.len().saturating_sub(cursor.position() as usize),
            Err(_) => 0,
        };

        Ok(Self {
            header,
            content,
            trailing,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn write_value(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    value.serialize(&mut rmp_serde::Serializer::new(buf))?;
    Ok(())
}

fn read_value(cursor: &mut Cursor<&[u8]>) -> Result<Value> {
    Ok(Value::deserialize(&mut rmp_serde::Deserializer::new(cursor))?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::identifiers::ReqSeq;
    use crate::protocol::header::{Header, Kind, PROTOCOL_VERSION};

    fn arb_header() -> impl Strategy<Value = WireHeader> {
        (
            any::<u32>(),
            any::<u8>(),
            proptest::option::of(any::<u64>().prop_map(ReqSeq::new)),
            proptest::option::of("[ -~]{0,24}"),
            proptest::option::of("[a-zA-Z]{1,16}"),
        )
            .prop_map(|(version, kind, req_seq, uri, method)| WireHeader {
                version,
                kind,
                req_seq,
                uri,
                method,
            })
    }

    fn arb_content() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Nil),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            any::<u64>().prop_map(Value::from),
            (-1.0e9f64..1.0e9).prop_map(Value::from),
            "\\PC{0,16}".prop_map(Value::from),
            proptest::collection::vec(any::<u8>(), 0..32).prop_map(Value::Binary),
        ];
        leaf.prop_recursive(3, 24, 6, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                proptest::collection::vec(("[a-z]{1,8}".prop_map(Value::from), inner), 0..6)
                    .prop_map(Value::Map),
            ]
        })
    }

    fn arb_attachment() -> impl Strategy<Value = Attachment> {
        ("[a-z]{1,12}\\.dat", proptest::collection::vec(any::<u8>(), 0..256))
            .prop_map(|(filename, blob)| Attachment::new(filename, blob))
    }

    fn reply_header(req_seq: u64) -> WireHeader {
        Header::HttpReply {
            req_seq: ReqSeq::new(req_seq),
        }
        .to_wire(PROTOCOL_VERSION)
    }

    #[test]
    fn test_decode_header_then_content() {
        let content = Value::Map(vec![(Value::from("items"), Value::Array(vec![]))]);
        let bytes = Frame::new(reply_header(1), content.clone())
            .encode()
            .expect("encode");

        let frame = Frame::decode(&bytes).expect("decode");
        assert_eq!(frame.header.kind, Kind::HttpReply.code());
        assert_eq!(frame.header.req_seq, Some(ReqSeq::new(1)));
        assert_eq!(frame.content, content);
        assert!(frame.attachments.is_empty());
    }

    #[test]
    fn test_binary_content_survives() {
        let bytes = Frame::new(reply_header(2), Value::Binary(vec![0, 159, 146, 150]))
            .encode()
            .expect("encode");

        let frame = Frame::decode(&bytes).expect("decode");
        assert_eq!(frame.content, Value::Binary(vec![0, 159, 146, 150]));
    }

    #[test]
    fn test_attachments_follow_content() {
        let header = Header::HttpRequest {
            req_seq: ReqSeq::new(3),
            uri: "/upload-lib-file".to_string(),
        }
        .to_wire(PROTOCOL_VERSION);
        let meta = Value::Map(vec![(Value::from("simulationType"), Value::from("srw"))]);

        let bytes = Frame::new(header, meta.clone())
            .with_attachment(Attachment::new("beam.dat", b"1 2 3\n".to_vec()))
            .encode()
            .expect("encode");

        let frame = Frame::decode(&bytes).expect("decode");
        assert_eq!(frame.content, meta);
        assert_eq!(
            frame.attachments,
            vec![Attachment::new("beam.dat", b"1 2 3\n".to_vec())]
        );
    }

    #[test]
    fn test_truncated_frame_is_error() {
        let bytes = Frame::new(reply_header(4), Value::from("hello"))
            .encode()
            .expect("encode");

        assert!(Frame::decode(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn test_inbound_ignores_trailer() {
        let mut bytes = Frame::new(reply_header(6), Value::from("ok"))
            .encode()
            .expect("encode")
            .to_vec();
        bytes.push(0x01);

        let inbound = InboundFrame::decode(&bytes).expect("header decodes");
        assert_eq!(inbound.header.req_seq, Some(ReqSeq::new(6)));
        assert_eq!(inbound.content.expect("content"), Value::from("ok"));
        assert_eq!(inbound.trailing, 1);
    }

    #[test]
    fn test_inbound_bad_content_keeps_header() {
        let mut bytes = rmp_serde::to_vec_named(&reply_header(7)).expect("encode");
        // str8 announcing 32 bytes, only 1 present
        bytes.extend_from_slice(&[0xd9, 0x20, b'x']);

        let inbound = InboundFrame::decode(&bytes).expect("header decodes");
        assert_eq!(inbound.header.req_seq, Some(ReqSeq::new(7)));
        assert!(inbound.content.is_err());
    }

    #[test]
    fn test_inbound_bad_header_is_error() {
        assert!(InboundFrame::decode(&[0xc1]).is_err());
    }

    #[test]
    fn test_garbage_trailer_is_error() {
        let mut bytes = Frame::new(reply_header(5), Value::Nil)
            .encode()
            .expect("encode")
            .to_vec();
        bytes.push(0x01);

        assert!(Frame::decode(&bytes).is_err());
    }

    proptest! {
        #[test]
        fn prop_frame_survives_encoding(
            header in arb_header(),
            content in arb_content(),
            attachment in proptest::option::of(arb_attachment()),
        ) {
            let mut frame = Frame::new(header, content);
            if let Some(attachment) = attachment {
                frame = frame.with_attachment(attachment);
            }

            let bytes = frame.encode().expect("encode");
            prop_assert_eq!(Frame::decode(&bytes).expect("decode"), frame);
        }
    }
}
