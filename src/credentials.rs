//! Credential value and lifetime types.

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// Provider name recorded on credentials that were built by hand.
pub const STATIC_PROVIDER: &str = "static";

/// An immutable snapshot of an access key, secret, optional session token
/// and optional expiry.
///
/// The secret and session token never appear in `Debug` output.
///
/// # Example
///
/// ```
/// use credwatch::Credentials;
/// use chrono::{Duration, Utc};
///
/// let creds = Credentials::new("AKIA1", "s1", None, Some(Utc::now() + Duration::minutes(10)));
/// assert_eq!(creds.access_key_id(), "AKIA1");
/// assert!(!creds.has_session_token());
/// assert!(!creds.is_permanent());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    provider_name: String,
}

impl Credentials {
    /// Creates credentials. An empty session token is treated as absent.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.filter(|t| !t.is_empty()),
            expires_at,
            provider_name: STATIC_PROVIDER.to_string(),
        }
    }

    /// Creates non-expiring credentials without a session token.
    pub fn permanent(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self::new(access_key_id, secret_access_key, None, None)
    }

    /// Records which source produced these credentials.
    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = name.into();
        self
    }

    /// Returns a copy with a different expiry and the same key material.
    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn has_session_token(&self) -> bool {
        self.session_token.is_some()
    }

    /// True when no expiry is set.
    pub fn is_permanent(&self) -> bool {
        self.expires_at.is_none()
    }

    /// Compares key material only: access key id, secret and session token.
    pub fn same_identity(&self, other: &Credentials) -> bool {
        self.access_key_id == other.access_key_id
            && self.secret_access_key == other.secret_access_key
            && self.session_token == other.session_token
    }

    /// Compares key material and expiry.
    pub fn same_lease(&self, other: &Credentials) -> bool {
        self.same_identity(other) && self.expires_at == other.expires_at
    }

    /// Remaining lifetime relative to `now`. Negative once expired.
    pub fn lifetime_at(&self, now: DateTime<Utc>) -> Lifetime {
        match self.expires_at {
            Some(expires_at) => Lifetime::Remaining(expires_at - now),
            None => Lifetime::Permanent,
        }
    }

    /// Remaining lifetime relative to the current time.
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .field("expires_at", &self.expires_at)
            .field("provider_name", &self.provider_name)
            .finish()
    }
}

/// Remaining lifetime of a credential.
///
/// Serialized as the string `"permanent"` or as signed milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// The credential has no expiry.
    Permanent,
    /// Time left until expiry. Negative when already expired.
    Remaining(Duration),
}

impl Lifetime {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }

    /// Remaining duration, `None` for permanent credentials.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Permanent => None,
            Self::Remaining(d) => Some(*d),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|d| d <= Duration::zero())
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permanent => write!(f, "non-expiring"),
            Self::Remaining(d) => write!(f, "{}", format_duration(*d)),
        }
    }
}

impl Serialize for Lifetime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Permanent => serializer.serialize_str("permanent"),
            Self::Remaining(d) => serializer.serialize_i64(d.num_milliseconds()),
        }
    }
}

/// Formats a signed duration compactly: `1h2m3s`, `-1m30s`, `250ms`, `0s`.
///
/// Whole-second durations drop the millisecond part; sub-second durations
/// are shown in milliseconds.
pub fn format_duration(d: Duration) -> String {
    let total_ms = d.num_milliseconds();
    if total_ms == 0 {
        return "0s".to_string();
    }

    let sign = if total_ms < 0 { "-" } else { "" };
    let abs_ms = total_ms.unsigned_abs();
    if abs_ms < 1000 {
        return format!("{}{}ms", sign, abs_ms);
    }

    let secs = abs_ms / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    let mut out = String::from(sign);
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if h > 0 || m > 0 {
        out.push_str(&format!("{}m", m));
    }
    out.push_str(&format!("{}s", s));
    out
}
