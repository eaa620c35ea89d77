//! Mock credential source for testing.
//!
//! This source serves credentials from memory with scripted responses,
//! artificial latency and error injection, for testing code that wraps
//! credential providers.

use crate::*;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Mock credential source for testing.
///
/// Each retrieval is answered, in order of precedence, by:
///
/// 1. the next queued response from [`push_response`](Self::push_response)
/// 2. the injected failure from [`fail_with`](Self::fail_with)
/// 3. the current credentials from [`set_credentials`](Self::set_credentials)
///
/// # Example
///
/// ```
/// use credwatch::sources::mock::MockSource;
/// use credwatch::{Context, Credentials, ProvideCredentials};
///
/// #[tokio::main]
/// async fn main() -> credwatch::Result<()> {
///     let source = MockSource::new(Credentials::permanent("AKIA1", "s1"));
///     let ctx = Context::background();
///
///     assert_eq!(source.retrieve(&ctx).await?.access_key_id(), "AKIA1");
///
///     // Rotate
///     source.set_credentials(Credentials::permanent("AKIA2", "s2")).await;
///     assert_eq!(source.retrieve(&ctx).await?.access_key_id(), "AKIA2");
///
///     // Test error conditions
///     source.fail_with("access denied").await;
///     assert!(source.retrieve(&ctx).await.is_err());
///
///     assert_eq!(source.call_count(), 3);
///     Ok(())
/// }
/// ```
pub struct MockSource {
    current: RwLock<Credentials>,
    queued: RwLock<VecDeque<Result<Credentials>>>,
    failure: RwLock<Option<String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockSource {
    /// Creates a source that returns `credentials` until told otherwise.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            current: RwLock::new(credentials.with_provider_name("mock")),
            queued: RwLock::new(VecDeque::new()),
            failure: RwLock::new(None),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes every retrieval wait `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replaces the credentials returned from now on (a rotation).
    pub async fn set_credentials(&self, credentials: Credentials) {
        *self.current.write().await = credentials.with_provider_name("mock");
    }

    /// Queues a one-shot response, served before anything else.
    pub async fn push_response(&self, response: Result<Credentials>) {
        self.queued.write().await.push_back(response);
    }

    /// Makes every retrieval fail with `message` until [`clear_failure`](Self::clear_failure).
    pub async fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write().await = Some(message.into());
    }

    pub async fn clear_failure(&self) {
        *self.failure.write().await = None;
    }

    /// Number of retrievals so far, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProvideCredentials for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn retrieve(&self, ctx: &Context) -> Result<Credentials> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            ctx.run(async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
        }
        ctx.check()?;

        if let Some(response) = self.queued.write().await.pop_front() {
            return response;
        }

        if let Some(ref message) = *self.failure.read().await {
            return Err(CredwatchError::source("mock", message.clone()));
        }

        Ok(self.current.read().await.clone())
    }
}
