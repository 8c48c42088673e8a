//! WebSocket transport layer.
//!
//! This module owns the single connection to the backend and everything
//! that keeps requests flowing over it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  MsgRouter      │   Enqueue / ClearModels      │  RouterTask     │
//! │  (any task)     │─────────────────────────────►│  (event loop)   │
//! │                 │                              │                 │
//! │  PendingReply   │◄──── oneshot per request ────│  RequestTable   │
//! └─────────────────┘                              │  Link ──────────┼──► WebSocket
//!                                                  └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `RouterBuilder::build` - Spawn the event loop (no connection yet)
//! 2. First `send` - Connect, presenting the current cookies
//! 3. Open - Reset backoff, drain the outbound queue
//! 4. Close or error - Requeue unanswered requests (unclean only), retry
//!    after 1, 2, 4 ... seconds up to the configured ceiling
//! 5. `MsgRouter::shutdown` - Close the socket and fail what is left
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Router configuration and startup |
//! | `pending` | Request lifecycle and correlation tables |
//! | `router` | Public handle and event loop |
//! | `socket` | Socket abstraction and tungstenite connector |
//! | `state` | Connection state machine and backoff |

// ============================================================================
// Submodules
// ============================================================================

/// Router builder.
pub mod builder;

/// Request lifecycle and correlation tables.
pub mod pending;

/// Public router handle and event loop.
pub mod router;

/// Socket abstraction and WebSocket connector.
pub mod socket;

/// Connection state machine and backoff.
pub mod state;


// ============================================================================
// Re-exports
// ============================================================================

pub use builder::RouterBuilder;
pub use pending::PendingReply;
pub use router::{AsyncMsgHandler, MsgRouter, RouterStats, SET_COOKIES_METHOD};
pub use socket::{Connector, EventStream, FrameSink, Socket, SocketEvent, WsConnector};
pub use state::{Backoff, LinkState};
