//! Session cookie rotation detection.
//!
//! [`CookieManager`] snapshots the raw cookie string and the session cookie
//! value extracted from it. A later check that finds a different session
//! value, without this client having written it, marks the session as
//! rotated. The rotation is sticky and published on a watch channel so the
//! application can reload.

// ============================================================================
// Imports
// ============================================================================

use regex::Regex;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::error::{Error, Result};

use super::jar::CookieStore;

// ============================================================================
// CookieStatus
// ============================================================================

/// Result of [`CookieManager::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieStatus {
    /// Session cookie unchanged (or first observed).
    Unchanged,
    /// Session cookie changed by someone else; reload required.
    Rotated,
}

// ============================================================================
// CookieManager
// ============================================================================

/// Tracks the session cookie and gates local cookie writes.
pub struct CookieManager {
    store: Box<dyn CookieStore>,
    cookie_name: String,
    pattern: Regex,
    last_raw: Option<String>,
    last_session: Option<String>,
    rotated: watch::Sender<bool>,
}

impl CookieManager {
    /// Creates a manager watching `cookie_name` in `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the cookie name is empty or contains
    /// characters not allowed in a cookie name.
    pub fn new(store: Box<dyn CookieStore>, cookie_name: impl Into<String>) -> Result<Self> {
        let cookie_name = cookie_name.into();
        if cookie_name.is_empty()
            || cookie_name
                .chars()
                .any(|c| c.is_whitespace() || c == '=' || c == ';')
        {
            return Err(Error::config(format!(
                "invalid session cookie name: {cookie_name:?}"
            )));
        }

        let pattern = Regex::new(&format!(
            r"(?:^|;\s*){}=([^;]*)",
            regex::escape(&cookie_name)
        ))
        .map_err(|e| Error::config(format!("session cookie pattern: {e}")))?;

        let (rotated, _) = watch::channel(false);

        Ok(Self {
            store,
            cookie_name,
            pattern,
            last_raw: None,
            last_session: None,
            rotated,
        })
    }

    /// Returns the watched cookie name.
    #[inline]
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Returns `true` once a rotation has been detected.
    #[inline]
    #[must_use]
    pub fn is_rotated(&self) -> bool {
        *self.rotated.borrow()
    }

    /// Subscribes to rotation notifications.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rotated.subscribe()
    }

    /// Returns the current cookie string for a `Cookie` request header.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        let raw = self.store.cookie_string();
        (!raw.is_empty()).then_some(raw)
    }

    /// Compares the store against the last snapshot.
    ///
    /// An unrelated cookie changing, or the session cookie appearing for
    /// the first time, only refreshes the snapshot.
    pub fn check(&mut self) -> CookieStatus {
        if self.is_rotated() {
            return CookieStatus::Rotated;
        }

        let raw = self.store.cookie_string();
        if self.last_raw.as_deref() == Some(raw.as_str()) {
            return CookieStatus::Unchanged;
        }

        let session = self.extract(&raw);
        self.last_raw = Some(raw);
        let previous = std::mem::replace(&mut self.last_session, session);

        match previous {
            None => CookieStatus::Unchanged,
            Some(ref prev) if Some(prev) == self.last_session.as_ref() => CookieStatus::Unchanged,
            Some(prev) => {
                error!(
                    cookie = %self.cookie_name,
                    previous = %prev,
                    current = ?self.last_session,
                    "Session cookie changed externally; application must reload"
                );
                self.rotated.send_replace(true);
                CookieStatus::Rotated
            }
        }
    }

    /// Applies a local cookie mutation and re-snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionRotated`] without touching the store if a
    /// rotation is pending.
    pub fn update<F>(&mut self, op: F) -> Result<()>
    where
        F: FnOnce(&mut dyn CookieStore),
    {
        if self.check() == CookieStatus::Rotated {
            return Err(Error::session_rotated(&self.cookie_name));
        }

        op(self.store.as_mut());

        let raw = self.store.cookie_string();
        self.last_session = self.extract(&raw);
        self.last_raw = Some(raw);

        debug!(cookie = %self.cookie_name, present = self.last_session.is_some(), "Cookies updated");
        Ok(())
    }

    /// Applies server-supplied `Set-Cookie` lines through [`update`](Self::update).
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionRotated`] if a rotation is pending.
    pub fn apply_set_cookies(&mut self, lines: &[String]) -> Result<()> {
        self.update(|store| {
            for line in lines {
                store.apply_set_cookie(line);
            }
        })
    }

    fn extract(&self, raw: &str) -> Option<String> {
        self.pattern
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

impl std::fmt::Debug for CookieManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieManager")
            .field("cookie_name", &self.cookie_name)
            .field("last_session", &self.last_session)
            .field("rotated", &self.is_rotated())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::cookie::CookieJar;

    /// Store whose contents the test can change behind the manager's back.
    #[derive(Clone, Default)]
    struct SharedJar(Arc<Mutex<CookieJar>>);

    impl SharedJar {
        fn set(&self, name: &str, value: &str) {
            self.0.lock().set(name, value);
        }
    }

    impl CookieStore for SharedJar {
        fn cookie_string(&self) -> String {
            self.0.lock().cookie_string()
        }

        fn apply_set_cookie(&mut self, raw: &str) {
            self.0.lock().apply_set_cookie(raw);
        }
    }

    fn manager(jar: &SharedJar) -> CookieManager {
        CookieManager::new(Box::new(jar.clone()), "sirepo_dev").expect("manager")
    }

    #[test]
    fn test_first_observation_is_unchanged() {
        let jar = SharedJar::default();
        jar.set("sirepo_dev", "s1");
        let mut cookies = manager(&jar);

        assert_eq!(cookies.check(), CookieStatus::Unchanged);
        assert_eq!(cookies.check(), CookieStatus::Unchanged);
    }

    #[test]
    fn test_session_appearing_is_unchanged() {
        let jar = SharedJar::default();
        let mut cookies = manager(&jar);
        assert_eq!(cookies.check(), CookieStatus::Unchanged);

        jar.set("sirepo_dev", "s1");
        assert_eq!(cookies.check(), CookieStatus::Unchanged);
    }

    #[test]
    fn test_unrelated_cookie_change_is_unchanged() {
        let jar = SharedJar::default();
        jar.set("sirepo_dev", "s1");
        let mut cookies = manager(&jar);
        cookies.check();

        jar.set("theme", "dark");
        assert_eq!(cookies.check(), CookieStatus::Unchanged);
        assert!(!cookies.is_rotated());
    }

    #[test]
    fn test_foreign_rotation_is_detected_and_sticky() {
        let jar = SharedJar::default();
        jar.set("sirepo_dev", "s1");
        let mut cookies = manager(&jar);
        let rx = cookies.subscribe();
        cookies.check();

        jar.set("sirepo_dev", "s2");
        assert_eq!(cookies.check(), CookieStatus::Rotated);
        assert!(*rx.borrow());

        // Even if it flips back, the session is gone.
        jar.set("sirepo_dev", "s1");
        assert_eq!(cookies.check(), CookieStatus::Rotated);
    }

    #[test]
    fn test_name_is_matched_exactly() {
        let jar = SharedJar::default();
        jar.set("xsirepo_dev", "other");
        jar.set("sirepo_dev", "s1");
        let mut cookies = manager(&jar);
        cookies.check();

        jar.set("xsirepo_dev", "changed");
        assert_eq!(cookies.check(), CookieStatus::Unchanged);
    }

    #[test]
    fn test_local_update_is_not_rotation() {
        let jar = SharedJar::default();
        jar.set("sirepo_dev", "s1");
        let mut cookies = manager(&jar);
        cookies.check();

        cookies
            .apply_set_cookies(&["sirepo_dev=s2; Path=/".to_string()])
            .expect("update");
        assert_eq!(cookies.check(), CookieStatus::Unchanged);
        assert_eq!(cookies.cookie_header().as_deref(), Some("sirepo_dev=s2"));
    }

    #[test]
    fn test_update_refused_after_rotation() {
        let jar = SharedJar::default();
        jar.set("sirepo_dev", "s1");
        let mut cookies = manager(&jar);
        cookies.check();
        jar.set("sirepo_dev", "s2");

        let result = cookies.update(|store| store.apply_set_cookie("theme=light"));
        assert!(matches!(result, Err(Error::SessionRotated { .. })));
        assert_eq!(jar.0.lock().get("theme"), None);
    }

    #[test]
    fn test_invalid_cookie_name() {
        assert!(CookieManager::new(Box::new(CookieJar::new()), "").is_err());
        assert!(CookieManager::new(Box::new(CookieJar::new()), "a;b").is_err());
    }

    #[test]
    fn test_cookie_header_empty() {
        let cookies = CookieManager::new(Box::new(CookieJar::new()), "sirepo_dev").expect("manager");
        assert_eq!(cookies.cookie_header(), None);
    }
}
