//! AWS SDK bridge.
//!
//! Two adapters connect credwatch to the AWS SDK for Rust:
//!
//! - [`AwsCredentialSource`] turns any SDK credentials provider (static,
//!   environment, profile, STS, IMDS) into a [`ProvideCredentials`] source.
//! - [`SdkCredentialsProvider`] hands a [`RefreshObservingProvider`] back to
//!   the SDK. The SDK's identity cache then sits outside the observer and
//!   decides when a retrieval actually reaches it.
//!
//! ```no_run
//! use credwatch::sources::aws::{AwsCredentialSource, SdkCredentialsProvider};
//! use credwatch::RefreshObservingProvider;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = AwsCredentialSource::default_chain().await;
//!     let observer = Arc::new(RefreshObservingProvider::new(source));
//!
//!     let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
//!         .credentials_provider(SdkCredentialsProvider::new(observer.clone()))
//!         .load()
//!         .await;
//!     let _client = aws_sdk_secretsmanager::Client::new(&config);
//! }
//! ```

use crate::{Context, Credentials, CredwatchError, ProvideCredentials, RefreshObservingProvider, Result};
use async_trait::async_trait;
use aws_credential_types::provider::{self as sdk_provider, error::CredentialsError, future, SharedCredentialsProvider};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::SystemTime;

/// Provider name stamped on SDK credentials produced by [`SdkCredentialsProvider`].
pub const SDK_PROVIDER_NAME: &str = "credwatch";

impl From<aws_credential_types::Credentials> for Credentials {
    fn from(creds: aws_credential_types::Credentials) -> Self {
        Self::from(&creds)
    }
}

impl From<&aws_credential_types::Credentials> for Credentials {
    fn from(creds: &aws_credential_types::Credentials) -> Self {
        Credentials::new(
            creds.access_key_id(),
            creds.secret_access_key(),
            creds.session_token().map(str::to_string),
            creds.expiry().map(DateTime::<Utc>::from),
        )
        .with_provider_name("aws")
    }
}

impl From<&Credentials> for aws_credential_types::Credentials {
    fn from(creds: &Credentials) -> Self {
        aws_credential_types::Credentials::new(
            creds.access_key_id(),
            creds.secret_access_key(),
            creds.session_token().map(str::to_string),
            creds.expires_at().map(SystemTime::from),
            SDK_PROVIDER_NAME,
        )
    }
}

/// Adapts an AWS SDK credentials provider into a credwatch source.
#[derive(Debug, Clone)]
pub struct AwsCredentialSource {
    inner: SharedCredentialsProvider,
}

impl AwsCredentialSource {
    pub fn new(provider: impl sdk_provider::ProvideCredentials + 'static) -> Self {
        Self {
            inner: SharedCredentialsProvider::new(provider),
        }
    }

    /// Uses the SDK default chain (environment, profile, web identity, ECS, IMDS).
    pub async fn default_chain() -> Self {
        let chain = aws_config::default_provider::credentials::DefaultCredentialsChain::builder()
            .build()
            .await;
        Self::new(chain)
    }
}

#[async_trait]
impl ProvideCredentials for AwsCredentialSource {
    fn name(&self) -> &str {
        "aws"
    }

    async fn retrieve(&self, ctx: &Context) -> Result<Credentials> {
        use sdk_provider::ProvideCredentials as _;

        ctx.run(async {
            self.inner
                .provide_credentials()
                .await
                .map(Credentials::from)
                .map_err(convert_error)
        })
        .await
    }
}

/// Maps an SDK provider error. A provider with nothing to offer becomes
/// [`CredwatchError::NotLoaded`]; every other failure is a source error.
fn convert_error(err: CredentialsError) -> CredwatchError {
    match err {
        CredentialsError::CredentialsNotLoaded(_) => {
            let detail = std::error::Error::source(&err)
                .map(ToString::to_string)
                .unwrap_or_else(|| err.to_string());
            CredwatchError::NotLoaded(detail)
        }
        other => CredwatchError::source("aws", other),
    }
}

/// Exposes a [`RefreshObservingProvider`] to the AWS SDK.
///
/// The SDK does not pass a cancellation context, so each retrieval runs
/// under [`Context::background`]; SDK-side timeouts still apply.
#[derive(Debug, Clone)]
pub struct SdkCredentialsProvider {
    observer: Arc<RefreshObservingProvider>,
}

impl SdkCredentialsProvider {
    pub fn new(observer: Arc<RefreshObservingProvider>) -> Self {
        Self { observer }
    }

    pub fn observer(&self) -> &Arc<RefreshObservingProvider> {
        &self.observer
    }
}

impl sdk_provider::ProvideCredentials for SdkCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(async move {
            self.observer
                .retrieve(&Context::background())
                .await
                .map(|creds| aws_credential_types::Credentials::from(&creds))
                .map_err(CredentialsError::provider_error)
        })
    }
}
