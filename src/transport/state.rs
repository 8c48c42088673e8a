//! Connection state machine and reconnect backoff.
//!
//! # States
//!
//! ```text
//!                 flush                 handshake ok
//! Disconnected ──────────► Connecting ───────────────► Open
//!      ▲                       │                        │
//!      │ clear/shutdown        │ handshake failed       │ close / error
//!      │                       ▼                        ▼
//!      └──────────────── ReconnectScheduled ◄───────────┘
//!                              │
//!                              │ timer fired
//!                              ▼
//!                          Connecting
//! ```
//!
//! The reconnect timer lives inside [`Link::ReconnectScheduled`], so at
//! most one retry can be pending at a time.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Sleep;

use crate::error::Result;

use super::socket::Socket;

// ============================================================================
// Types
// ============================================================================

/// A handshake in progress.
pub(crate) type ConnectFuture = Pin<Box<dyn Future<Output = Result<Socket>> + Send>>;

// ============================================================================
// Backoff
// ============================================================================

/// Reconnect delay counter.
///
/// Zero means "no failure since the last successful open". The first
/// failure sets it to one second, each further failure doubles it up to
/// the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    secs: u64,
    max_secs: u64,
}

impl Backoff {
    /// Creates an idle backoff capped at `max` (at least one second).
    #[must_use]
    pub fn new(max: Duration) -> Self {
        Self {
            secs: 0,
            max_secs: max.as_secs().max(1),
        }
    }

    /// Returns `true` if no failure happened since the last open.
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.secs == 0
    }

    /// Returns the current delay.
    #[inline]
    #[must_use]
    pub fn current(&self) -> Duration {
        Duration::from_secs(self.secs)
    }

    /// Returns to idle after a successful open.
    #[inline]
    pub fn reset(&mut self) {
        self.secs = 0;
    }

    /// Records a failure and returns the delay before the next attempt.
    pub fn escalate(&mut self) -> Duration {
        self.secs = if self.secs == 0 {
            1
        } else {
            self.secs.saturating_mul(2).min(self.max_secs)
        };
        self.current()
    }
}

// ============================================================================
// LinkState
// ============================================================================

/// Observable connection state, as reported by router stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// No socket and no retry pending.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket open; the outbound queue drains immediately.
    Open,
    /// Waiting for the backoff timer.
    ReconnectScheduled,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::ReconnectScheduled => "reconnect-scheduled",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Link
// ============================================================================

/// The router's single connection, with whatever it is waiting on.
#[derive(Default)]
pub(crate) enum Link {
    #[default]
    Disconnected,
    Connecting(ConnectFuture),
    Open(Socket),
    ReconnectScheduled(Pin<Box<Sleep>>),
}

impl Link {
    /// Schedules a retry after `delay`.
    pub(crate) fn schedule(delay: Duration) -> Self {
        Self::ReconnectScheduled(Box::pin(tokio::time::sleep(delay)))
    }

    pub(crate) fn state(&self) -> LinkState {
        match self {
            Self::Disconnected => LinkState::Disconnected,
            Self::Connecting(_) => LinkState::Connecting,
            Self::Open(_) => LinkState::Open,
            Self::ReconnectScheduled(_) => LinkState::ReconnectScheduled,
        }
    }

    #[inline]
    pub(crate) fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Link").field(&self.state()).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
