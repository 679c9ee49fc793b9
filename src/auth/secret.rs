// Authorization key handling
//
// The GigaChat authorization key is a pre-encoded Basic credential. It is
// never formatted into logs and is wiped from memory when dropped.

use anyhow::{Context, Result};
use reqwest::header::HeaderValue;
use std::fmt;
use zeroize::Zeroize;

const REDACTED: &str = "[REDACTED]";

/// Sensitive value, redacted wherever it is formatted
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the raw value
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// True for an empty or whitespace-only key
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// `Authorization: Basic <key>` value, flagged sensitive for the HTTP stack
    pub fn basic_auth_header(&self) -> Result<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Basic {}", self.0.trim()))
            .context("Authorization key contains characters not allowed in a header")?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}
