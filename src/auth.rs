//! Shared-secret handshake authentication.
//!
//! Both roles hold the same [`ApiKey`]. The client sends it in the
//! [`API_KEY_HEADER`] of the upgrade request; the server compares it and
//! echoes its own key in the upgrade response so the client can detect an
//! imposter endpoint.

use std::fmt;

use axum::http::{HeaderMap, HeaderValue};

use crate::config::ListenAddress;
use crate::error::RelayError;

/// Header carrying the shared secret on every handshake.
pub const API_KEY_HEADER: &str = "relay-api-key";

/// A non-empty secret that can travel in an HTTP header.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Validates and wraps `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidApiKey`] if `key` is empty or contains
    /// bytes that are not allowed in a header value.
    pub fn new(key: impl Into<String>) -> Result<Self, RelayError> {
        let key = key.into();
        if key.is_empty() {
            return Err(RelayError::InvalidApiKey("empty".to_string()));
        }
        HeaderValue::from_str(&key).map_err(|e| RelayError::InvalidApiKey(e.to_string()))?;
        Ok(Self(key))
    }

    /// Reads an optional key: unset or empty means "no key".
    ///
    /// # Errors
    ///
    /// Same as [`ApiKey::new`] for non-empty input.
    pub fn from_optional(key: Option<String>) -> Result<Option<Self>, RelayError> {
        key.filter(|k| !k.is_empty()).map(Self::new).transpose()
    }

    /// Returns the secret.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if `presented` is exactly this key.
    #[must_use]
    pub fn matches(&self, presented: Option<&[u8]>) -> bool {
        presented == Some(self.0.as_bytes())
    }

    /// Returns the key as a header value.
    ///
    /// # Errors
    ///
    /// Never fails for a key built through [`ApiKey::new`].
    pub fn header_value(&self) -> Result<HeaderValue, RelayError> {
        HeaderValue::from_str(&self.0).map_err(|e| RelayError::InvalidApiKey(e.to_string()))
    }
}

// Keep the secret out of logs.
impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Checks an upgrade request against the configured key.
///
/// With no key configured the server is in open loopback mode and every
/// request passes.
///
/// # Errors
///
/// Returns [`RelayError::Unauthorized`] if a key is configured and the
/// request's header is missing or different.
pub fn authorize(expected: Option<&ApiKey>, headers: &HeaderMap) -> Result<(), RelayError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let presented = headers.get(API_KEY_HEADER).map(HeaderValue::as_bytes);
    if expected.matches(presented) {
        Ok(())
    } else {
        Err(RelayError::Unauthorized)
    }
}

/// Enforces that a server reachable from other hosts has a key.
///
/// # Errors
///
/// Returns [`RelayError::MissingApiKey`] if `listen` is not a loopback
/// address and `key` is `None`.
pub fn require_key_for(listen: &ListenAddress, key: Option<&ApiKey>) -> Result<(), RelayError> {
    if key.is_none() && !listen.is_local() {
        return Err(RelayError::MissingApiKey("to allow remote access"));
    }
    Ok(())
}
