//! Wire protocol message types.
//!
//! This module defines the binary frame format exchanged with the backend
//! over the single WebSocket connection.
//!
//! # Protocol Overview
//!
//! | Kind | Direction | Purpose |
//! |------|-----------|---------|
//! | `httpRequest` | Client → Server | Request for `uri` |
//! | `httpReply` | Server → Client | Successful reply |
//! | `srException` | Server → Client | Application-level error |
//! | `asyncMsg` | Server → Client | Push message for a registered handler |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `body` | Request bodies and multipart splitting |
//! | `frame` | Frame encode/decode |
//! | `header` | Header record and typed header |
//! | `reply` | Reply types and content coercion |

// ============================================================================
// Submodules
// ============================================================================

/// Request bodies and multipart form splitting.
pub mod body;

/// Binary frame codec.
pub mod frame;

/// Frame header types.
pub mod header;

/// Reply types and content coercion.
pub mod reply;

// ============================================================================
// Re-exports
// ============================================================================

pub use body::{Body, FileSource, FileUpload, FormData, FormValue, SplitForm};
pub use frame::{Attachment, Frame, InboundFrame};
pub use header::{Header, Kind, PROTOCOL_VERSION, WireHeader};
pub use reply::{Blob, Reply, ReplyData, RequestConfig, ResponseType};
