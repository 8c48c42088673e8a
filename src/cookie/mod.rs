//! Session cookie tracking.
//!
//! The backend identifies the session by one cookie. If that cookie is
//! changed by someone other than this client (another tab logging in, the
//! session being invalidated), continuing would run requests against the
//! wrong session, so the change is treated as fatal and the application
//! must reload.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `jar` | [`CookieStore`] trait and in-memory [`CookieJar`] |
//! | `manager` | [`CookieManager`] rotation detection and gated updates |

// ============================================================================
// Submodules
// ============================================================================

/// Cookie storage.
pub mod jar;

/// Rotation detection.
pub mod manager;

// ============================================================================
// Re-exports
// ============================================================================

pub use jar::{CookieJar, CookieStore};
pub use manager::{CookieManager, CookieStatus};
