//! Credential source trait definition.
//!
//! This module defines the [`ProvideCredentials`] trait that every credential
//! source satisfies. The refresh-observing decorator satisfies it too, so
//! providers can be layered in any order.

use crate::{Context, Credentials, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// A source of credentials, queried on demand.
///
/// All implementations must be `Send + Sync`: retrievals may run
/// concurrently from many tasks. Implementations are expected to be
/// internally thread-safe.
///
/// # Implementations
///
/// - **Static**: [`Credentials`] itself returns a clone of the value
/// - **Decorator**: [`RefreshObservingProvider`](crate::RefreshObservingProvider)
/// - **Testing**: [`MockSource`](crate::sources::mock::MockSource) with error injection
/// - **AWS SDK**: [`AwsCredentialSource`](crate::sources::aws::AwsCredentialSource) (feature `aws`)
///
/// # Example
///
/// ```
/// use credwatch::{Context, Credentials, ProvideCredentials};
///
/// #[tokio::main]
/// async fn main() -> credwatch::Result<()> {
///     let source = Credentials::permanent("AKIA1", "s1");
///     let creds = source.retrieve(&Context::background()).await?;
///     assert_eq!(creds.access_key_id(), "AKIA1");
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ProvideCredentials: Send + Sync {
    /// Returns the source name (e.g., "static", "mock", "aws").
    fn name(&self) -> &str {
        "unnamed"
    }

    /// Produces credentials.
    ///
    /// Implementations should honor the cancellation and deadline carried
    /// by `ctx`.
    ///
    /// # Errors
    ///
    /// - [`CredwatchError::Source`](crate::CredwatchError::Source):
    ///   the source could not produce credentials
    /// - [`CredwatchError::Cancelled`](crate::CredwatchError::Cancelled) /
    ///   [`CredwatchError::DeadlineExceeded`](crate::CredwatchError::DeadlineExceeded):
    ///   `ctx` finished first
    async fn retrieve(&self, ctx: &Context) -> Result<Credentials>;
}

#[async_trait]
impl ProvideCredentials for Credentials {
    fn name(&self) -> &str {
        self.provider_name()
    }

    async fn retrieve(&self, ctx: &Context) -> Result<Credentials> {
        ctx.check()?;
        Ok(self.clone())
    }
}

#[async_trait]
impl<T: ProvideCredentials + ?Sized> ProvideCredentials for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn retrieve(&self, ctx: &Context) -> Result<Credentials> {
        (**self).retrieve(ctx).await
    }
}

#[async_trait]
impl<T: ProvideCredentials + ?Sized> ProvideCredentials for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn retrieve(&self, ctx: &Context) -> Result<Credentials> {
        (**self).retrieve(ctx).await
    }
}
