//! Router configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use sim_msgrouter::RouterConfig;
//!
//! let config = RouterConfig::new()
//!     .with_session_cookie_name("sirepo_prod")
//!     .with_max_backoff(Duration::from_secs(30));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::PROTOCOL_VERSION;

// ============================================================================
// Constants
// ============================================================================

/// Default name of the session cookie.
pub const DEFAULT_SESSION_COOKIE: &str = "sirepo_dev";

/// Default ceiling for the reconnect delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

// ============================================================================
// RouterConfig
// ============================================================================

/// Settings shared by the router handle and its event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Protocol version sent in, and required of, every frame.
    pub protocol_version: u32,

    /// Name of the cookie identifying the session.
    pub session_cookie_name: String,

    /// Longest delay between reconnect attempts.
    pub max_backoff: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RouterConfig {
    /// Creates a config with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            session_cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RouterConfig {
    /// Sets the protocol version.
    #[inline]
    #[must_use]
    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    /// Sets the session cookie name.
    #[inline]
    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.session_cookie_name = name.into();
        self
    }

    /// Sets the reconnect delay ceiling.
    #[inline]
    #[must_use]
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl RouterConfig {
    /// Checks the settings for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the backoff ceiling is under one second.
    pub fn validate(&self) -> Result<()> {
        if self.max_backoff < Duration::from_secs(1) {
            return Err(Error::config(format!(
                "max_backoff must be at least 1s, got {:?}",
                self.max_backoff
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.protocol_version, PROTOCOL_VERSION);
        assert_eq!(config.session_cookie_name, "sirepo_dev");
        assert_eq!(config.max_backoff, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = RouterConfig::new()
            .with_protocol_version(2)
            .with_session_cookie_name("sirepo_prod")
            .with_max_backoff(Duration::from_secs(10));

        assert_eq!(config.protocol_version, 2);
        assert_eq!(config.session_cookie_name, "sirepo_prod");
        assert_eq!(config.max_backoff, Duration::from_secs(10));
    }

    #[test]
    fn test_validate_rejects_sub_second_backoff() {
        let config = RouterConfig::new().with_max_backoff(Duration::from_millis(500));
        assert!(config.validate().is_err());
    }
}
