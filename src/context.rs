//! Retrieval context carrying cancellation, deadline and signing state.
//!
//! A [`Context`] is passed to every [`retrieve`](crate::ProvideCredentials::retrieve)
//! call and to the TTL sampler. Cloning a context shares its cancellation
//! token; [`child`](Context::child) derives a context that is cancelled with
//! its parent but can also be cancelled on its own.

use crate::{Credentials, CredwatchError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline scope for credential operations.
#[derive(Debug, Clone)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    signing: Option<Arc<Credentials>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// Creates a root context that is never cancelled unless asked to.
    pub fn background() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Creates a context bound to an existing cancellation token.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
            signing: None,
        }
    }

    /// Derives a context cancelled together with `self`, or independently.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            signing: self.signing.clone(),
        }
    }

    /// Sets a deadline `timeout` from now. An earlier existing deadline wins.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Sets an absolute deadline. An earlier existing deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Attaches the credentials a request pipeline used to sign a call.
    pub fn with_signing_credentials(mut self, credentials: Credentials) -> Self {
        self.signing = Some(Arc::new(credentials));
        self
    }

    /// Credentials attached by [`with_signing_credentials`](Self::with_signing_credentials).
    pub fn signing_credentials(&self) -> Option<&Credentials> {
        self.signing.as_deref()
    }

    /// Returns the deadline, if one is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the underlying cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancels this context and every child derived from it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once cancelled or past the deadline.
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Returns `Err` if the context is already cancelled or past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(CredwatchError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(CredwatchError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn done(&self) -> CredwatchError {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => CredwatchError::Cancelled,
            _ = sleep_until_deadline(self.deadline) => CredwatchError::DeadlineExceeded,
        }
    }

    /// Runs `fut` to completion unless the context finishes first.
    ///
    /// Cancellation is checked before the future is polled, and is preferred
    /// over a result that becomes ready at the same time.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = fut => result,
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
