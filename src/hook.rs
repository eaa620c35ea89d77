//! Request-pipeline hook for correlating signed calls with observations.
//!
//! The observer never sees individual requests. A pipeline that signs
//! requests can expose the credentials it used through
//! [`SigningCredentialsLookup`]; [`correlate`] then tells whether that call
//! was signed with the identity the observer saw last.

use crate::{Context, Credentials, RefreshObservingProvider};

/// Looks up the credentials used to sign one in-flight call.
///
/// Implementations must not block and must not trigger a retrieval.
pub trait SigningCredentialsLookup {
    /// Returns the signing credentials, or `None` if the call was not signed.
    fn signing_credentials(&self) -> Option<Credentials>;
}

impl SigningCredentialsLookup for Context {
    fn signing_credentials(&self) -> Option<Credentials> {
        Context::signing_credentials(self).cloned()
    }
}

impl SigningCredentialsLookup for Option<Credentials> {
    fn signing_credentials(&self) -> Option<Credentials> {
        self.clone()
    }
}

/// Outcome of [`correlate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// No signing credentials were found for the call.
    NotSigned,
    /// The call was signed but the observer has not retrieved anything.
    NothingObserved,
    /// The call was signed with the observer's last-seen key material.
    Current,
    /// The call was signed with other key material.
    Stale {
        signed_with: String,
        last_seen: String,
    },
}

/// Compares the credentials a call was signed with against the provider's
/// last-seen value, by key material only.
pub fn correlate<L>(lookup: &L, provider: &RefreshObservingProvider) -> Correlation
where
    L: SigningCredentialsLookup + ?Sized,
{
    let Some(signed) = lookup.signing_credentials() else {
        return Correlation::NotSigned;
    };
    let Some(last_seen) = provider.last_seen() else {
        return Correlation::NothingObserved;
    };

    if signed.same_identity(&last_seen) {
        Correlation::Current
    } else {
        Correlation::Stale {
            signed_with: signed.access_key_id().to_string(),
            last_seen: last_seen.access_key_id().to_string(),
        }
    }
}
