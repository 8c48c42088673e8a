//! Cookie storage.
//!
//! [`CookieStore`] is the seam the router reads and writes cookies
//! through. [`CookieJar`] keeps them in memory and renders them the way a
//! browser renders `document.cookie`: `name=value; name2=value2`.

// ============================================================================
// Imports
// ============================================================================

use tracing::{trace, warn};

// ============================================================================
// CookieStore
// ============================================================================

/// Source of truth for the client's cookies.
pub trait CookieStore: Send + Sync {
    /// Returns all cookies as `name=value` pairs joined by `"; "`.
    fn cookie_string(&self) -> String;

    /// Applies one `Set-Cookie` line.
    fn apply_set_cookie(&mut self, raw: &str);
}

// ============================================================================
// CookieJar
// ============================================================================

/// In-memory [`CookieStore`].
///
/// Only `name=value` and `Max-Age` are honoured; a non-positive `Max-Age`
/// removes the cookie. Other attributes are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    /// Creates an empty jar.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a jar from `(name, value)` pairs.
    #[must_use]
    pub fn with_cookies<I, K, V>(cookies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut jar = Self::new();
        for (name, value) in cookies {
            jar.set(name, value);
        }
        jar
    }

    /// Sets a cookie, replacing any cookie with the same name in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.cookies.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.cookies.push((name, value)),
        }
    }

    /// Removes a cookie.
    pub fn remove(&mut self, name: &str) {
        self.cookies.retain(|(n, _)| n != name);
    }

    /// Returns a cookie value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the number of cookies.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Returns `true` if the jar is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

impl CookieStore for CookieJar {
    fn cookie_string(&self) -> String {
        self.cookies
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn apply_set_cookie(&mut self, raw: &str) {
        let mut parts = raw.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            warn!(raw, "Ignoring malformed Set-Cookie");
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            warn!(raw, "Ignoring Set-Cookie without name");
            return;
        }

        let expired = parts.any(|attr| {
            attr.split_once('=').is_some_and(|(key, val)| {
                key.trim().eq_ignore_ascii_case("max-age")
                    && val.trim().parse::<i64>().is_ok_and(|age| age <= 0)
            })
        });

        if expired {
            trace!(name, "Removing expired cookie");
            self.remove(name);
        } else {
            trace!(name, "Setting cookie");
            self.set(name, value.trim());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_string_order() {
        let jar = CookieJar::with_cookies([("a", "1"), ("sirepo_dev", "xyz")]);
        assert_eq!(jar.cookie_string(), "a=1; sirepo_dev=xyz");
    }

    #[test]
    fn test_empty_cookie_string() {
        assert_eq!(CookieJar::new().cookie_string(), "");
    }

    #[test]
    fn test_apply_set_cookie_with_attributes() {
        let mut jar = CookieJar::new();
        jar.apply_set_cookie("sirepo_dev=abc123; Path=/; HttpOnly; SameSite=Lax");
        assert_eq!(jar.get("sirepo_dev"), Some("abc123"));
        assert_eq!(jar.len(), 1);
    }

    #[test]
    fn test_apply_set_cookie_replaces_in_place() {
        let mut jar = CookieJar::with_cookies([("a", "1"), ("b", "2")]);
        jar.apply_set_cookie("a=3");
        assert_eq!(jar.cookie_string(), "a=3; b=2");
    }

    #[test]
    fn test_apply_set_cookie_max_age_zero_removes() {
        let mut jar = CookieJar::with_cookies([("a", "1"), ("b", "2")]);
        jar.apply_set_cookie("a=; Max-Age=0; Path=/");
        assert_eq!(jar.cookie_string(), "b=2");
    }

    #[test]
    fn test_apply_set_cookie_value_with_equals() {
        let mut jar = CookieJar::new();
        jar.apply_set_cookie("token=a=b==");
        assert_eq!(jar.get("token"), Some("a=b=="));
    }

    #[test]
    fn test_apply_malformed_is_ignored() {
        let mut jar = CookieJar::new();
        jar.apply_set_cookie("no-equals-sign");
        jar.apply_set_cookie("=value");
        assert!(jar.is_empty());
    }
}
