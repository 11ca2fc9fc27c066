//! Opaque container for sensitive strings and byte sequences.
//!
//! A [`Secret`] never prints, logs or serializes its content: `Debug`,
//! `Display` and `Serialize` all produce [`REDACTED`]. The content is zeroed
//! when the value is dropped. Reading the plaintext requires an explicit
//! `expose_*` call, so every place that touches secret material is visible
//! at the call site.
//!
//! The length (characters for text, bytes for binary) is available without
//! exposure. [`Secret::equals`] uses it to reject most mismatches before the
//! content is ever read, and compares the remaining candidates in constant
//! time.
//!
//! ```
//! use keyward_vault::Secret;
//!
//! let password = Secret::text("correct horse");
//! assert_eq!(format!("{password:?}"), "Secret(\"[REDACTED]\")");
//! assert_eq!(password.to_string(), "[REDACTED]");
//! assert_eq!(password.len(), 13);
//! assert_eq!(password.expose_str(), Some("correct horse"));
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// The redaction placeholder used in all output.
pub const REDACTED: &str = "[REDACTED]";

/// What a secret holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    Text,
    Binary,
}

impl SecretKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Inner {
    Text(String),
    Binary(Vec<u8>),
}

/// Sensitive value wrapper. See the [module documentation](self).
pub struct Secret {
    inner: Inner,
    len: usize,
}

impl Secret {
    /// Wrap a text secret.
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        let len = value.chars().count();
        Self {
            inner: Inner::Text(value),
            len,
        }
    }

    /// Wrap a binary secret (e.g. an attachment or keyfile).
    pub fn binary(value: impl Into<Vec<u8>>) -> Self {
        let value = value.into();
        let len = value.len();
        Self {
            inner: Inner::Binary(value),
            len,
        }
    }

    /// An empty text secret.
    pub fn empty() -> Self {
        Self::text(String::new())
    }

    pub fn kind(&self) -> SecretKind {
        match self.inner {
            Inner::Text(_) => SecretKind::Text,
            Inner::Binary(_) => SecretKind::Binary,
        }
    }

    /// Characters for text, bytes for binary.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Plaintext of a text secret; `None` for binary secrets.
    pub fn expose_str(&self) -> Option<&str> {
        record_exposure();
        match &self.inner {
            Inner::Text(s) => Some(s),
            Inner::Binary(_) => None,
        }
    }

    /// Raw bytes of the secret (UTF-8 for text).
    pub fn expose_bytes(&self) -> &[u8] {
        record_exposure();
        self.raw()
    }

    /// Equality of kind and content.
    ///
    /// Secrets of different kind or length compare unequal without either
    /// value being exposed. Equal-length candidates are compared in
    /// constant time.
    pub fn equals(&self, other: &Secret) -> bool {
        if self.kind() != other.kind() || self.len != other.len {
            return false;
        }
        self.expose_bytes().ct_eq(other.expose_bytes()).into()
    }

    fn raw(&self) -> &[u8] {
        match &self.inner {
            Inner::Text(s) => s.as_bytes(),
            Inner::Binary(b) => b,
        }
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        match &mut self.inner {
            Inner::Text(s) => s.zeroize(),
            Inner::Binary(b) => b.zeroize(),
        }
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        let inner = match &self.inner {
            Inner::Text(s) => Inner::Text(s.clone()),
            Inner::Binary(b) => Inner::Binary(b.clone()),
        };
        Self {
            inner,
            len: self.len,
        }
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for Secret {}

impl Default for Secret {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Secret").field(&REDACTED).finish()
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

/// Deserializes from a plain string into a text secret.
impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret::text)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

// ---------------------------------------------------------------------------
// Exposure accounting (tests only)
// ---------------------------------------------------------------------------

#[cfg(test)]
thread_local! {
    static EXPOSURES: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

#[cfg(test)]
fn record_exposure() {
    EXPOSURES.with(|c| c.set(c.get() + 1));
}

#[cfg(not(test))]
#[inline(always)]
fn record_exposure() {}

#[cfg(test)]
pub(crate) fn exposures() -> usize {
    EXPOSURES.with(|c| c.get())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
