//! Simulation GUI message router - request/reply over one WebSocket.
//!
//! This library is the client-side transport for a simulation web GUI
//! backend. Requests are multiplexed over a single WebSocket as binary
//! msgpack frames and matched to replies by a sequence number.
//!
//! # Architecture
//!
//! - **Handle (any task)**: [`MsgRouter::send`] encodes a frame and queues it
//! - **Event loop (one task)**: owns the socket, the outbound queue and the
//!   awaiting-reply table
//!
//! Key design principles:
//!
//! - One connection, opened lazily by the first request
//! - Exponential reconnect backoff (1, 2, 4 ... 60 seconds)
//! - Unanswered requests are replayed with their original `reqSeq` after an
//!   unclean disconnect, ahead of newer traffic
//! - A session cookie changed by someone else is fatal; the application
//!   reloads instead of running on a foreign session
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use sim_msgrouter::{MsgRouter, RequestConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let router = MsgRouter::builder()
//!         .url("ws://localhost:8000/ws")
//!         .build()?;
//!
//!     router.register_async_msg("simulationStatus", |content| {
//!         println!("status: {content}");
//!     })?;
//!
//!     let reply = router
//!         .send("/simulation-list", json!({"simulationType": "srw"}), RequestConfig::json())?
//!         .await?;
//!     println!("{:?}", reply.data);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Router settings |
//! | [`cookie`] | Cookie store and session rotation detection |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Request sequence numbers |
//! | [`protocol`] | Wire frame format |
//! | [`transport`] | Connection, event loop and public router handle |

// ============================================================================
// Modules
// ============================================================================

/// Router settings.
pub mod config;

/// Cookie store and session rotation detection.
pub mod cookie;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Request sequence numbers.
pub mod identifiers;

/// Wire frame format.
///
/// Header, content and attachment encoding, request bodies and reply
/// coercion.
pub mod protocol;

/// WebSocket transport layer.
///
/// The [`MsgRouter`] handle, its event loop and the connection state
/// machine.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::RouterConfig;

// Cookie types
pub use cookie::{CookieJar, CookieManager, CookieStatus, CookieStore};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::ReqSeq;

// Protocol types
pub use protocol::{
    Blob, Body, FileUpload, FormData, PROTOCOL_VERSION, Reply, ReplyData, RequestConfig,
    ResponseType,
};

// Transport types
pub use transport::{
    AsyncMsgHandler, Connector, LinkState, MsgRouter, PendingReply, RouterBuilder, RouterStats,
    Socket, SocketEvent, WsConnector,
};
