//! Builder pattern for router configuration.
//!
//! Provides a fluent API for configuring and starting a [`MsgRouter`].
//!
//! # Example
//!
//! ```no_run
//! use sim_msgrouter::MsgRouter;
//!
//! # async fn example() -> sim_msgrouter::Result<()> {
//! let router = MsgRouter::builder()
//!     .url("wss://sirepo.example.org/ws")
//!     .session_cookie_name("sirepo_prod")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::config::RouterConfig;
use crate::cookie::{CookieJar, CookieManager, CookieStore};
use crate::error::{Error, Result};

use super::router::MsgRouter;
use super::socket::{Connector, WsConnector};

// ============================================================================
// RouterBuilder
// ============================================================================

/// Builder for configuring a [`MsgRouter`].
///
/// Use [`MsgRouter::builder()`] to create a new builder.
#[derive(Default)]
pub struct RouterBuilder {
    /// WebSocket endpoint.
    url: Option<String>,
    /// Protocol and backoff settings.
    config: RouterConfig,
    /// Cookie source; an empty jar if unset.
    cookie_store: Option<Box<dyn CookieStore>>,
    /// Connection factory; a [`WsConnector`] for `url` if unset.
    connector: Option<Arc<dyn Connector>>,
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("url", &self.url)
            .field("config", &self.config)
            .field("cookie_store", &self.cookie_store.is_some())
            .field("connector", &self.connector.is_some())
            .finish()
    }
}

// ============================================================================
// RouterBuilder Implementation
// ============================================================================

impl RouterBuilder {
    /// Creates a new builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WebSocket endpoint (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Replaces the whole configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the name of the session cookie to watch.
    #[inline]
    #[must_use]
    pub fn session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.config.session_cookie_name = name.into();
        self
    }

    /// Sets the protocol version.
    #[inline]
    #[must_use]
    pub fn protocol_version(mut self, version: u32) -> Self {
        self.config.protocol_version = version;
        self
    }

    /// Sets the reconnect delay ceiling.
    #[inline]
    #[must_use]
    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.config.max_backoff = max_backoff;
        self
    }

    /// Sets the cookie store.
    #[inline]
    #[must_use]
    pub fn cookie_store(mut self, store: impl CookieStore + 'static) -> Self {
        self.cookie_store = Some(Box::new(store));
        self
    }

    /// Sets a custom connector.
    ///
    /// When set, [`url`](Self::url) is not needed.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Validates the settings and starts the router.
    ///
    /// Must be called inside a tokio runtime. No connection is made until
    /// the first request.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if neither a URL nor a connector is set
    /// - [`Error::Config`] if the URL is not `ws`/`wss`
    /// - [`Error::Config`] if the backoff ceiling or cookie name is invalid
    /// - [`Error::Config`] if called outside a tokio runtime
    pub fn build(self) -> Result<MsgRouter> {
        self.config.validate()?;
        let connector = self.validate_connector()?;

        let store: Box<dyn CookieStore> = match self.cookie_store {
            Some(store) => store,
            None => Box::new(CookieJar::new()),
        };
        let cookies = CookieManager::new(store, self.config.session_cookie_name.as_str())?;

        let runtime = Handle::try_current()
            .map_err(|e| Error::config(format!("router must be built inside a tokio runtime: {e}")))?;

        Ok(MsgRouter::start(self.config, cookies, connector, runtime))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl RouterBuilder {
    /// Resolves the connector, building a [`WsConnector`] from the URL if needed.
    fn validate_connector(&self) -> Result<Arc<dyn Connector>> {
        if let Some(connector) = &self.connector {
            return Ok(Arc::clone(connector));
        }

        let url = self.url.as_deref().ok_or_else(|| {
            Error::config(
                "WebSocket url is required. Use .url() to set it.\n\
                 Example: MsgRouter::builder().url(\"ws://localhost:8000/ws\")",
            )
        })?;

        Ok(Arc::new(WsConnector::new(url)?))
    }
}

// ============================================================================
// Tests
// ============================================================================
