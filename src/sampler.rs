//! Periodic TTL sampling.
//!
//! Outer caches only call through when credentials are about to expire, so
//! when API calls are infrequent the refresh log goes quiet. The
//! [`TtlSampler`] fills that gap: on a fixed interval it reads the
//! last-seen credential straight from the [`RefreshObservingProvider`] and
//! reports how long it has left. It never calls the wrapped source.

use crate::context::Context;
use crate::observation::Observation;
use crate::validation::validate_interval;
use crate::{RefreshObservingProvider, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Reports the remaining lifetime of a provider's last-seen credential.
///
/// # Example
///
/// ```
/// use credwatch::{Context, Credentials, ProvideCredentials, RefreshObservingProvider, TtlSampler};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> credwatch::Result<()> {
///     let provider = Arc::new(RefreshObservingProvider::new(Credentials::permanent("AKIA1", "s1")));
///     let sampler = TtlSampler::new(provider.clone(), Duration::from_secs(30))?;
///
///     // Nothing retrieved yet: the tick is skipped.
///     assert!(sampler.sample().is_none());
///
///     provider.retrieve(&Context::background()).await?;
///     assert!(sampler.sample().is_some());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TtlSampler {
    provider: Arc<RefreshObservingProvider>,
    interval: Duration,
}

impl TtlSampler {
    /// Creates a sampler for `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`CredwatchError::InvalidConfig`](crate::CredwatchError::InvalidConfig)
    /// if `interval` is zero.
    pub fn new(provider: Arc<RefreshObservingProvider>, interval: Duration) -> Result<Self> {
        validate_interval(interval)?;
        Ok(Self { provider, interval })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one tick: emits and returns a TTL observation, or `None` when
    /// nothing has been retrieved yet.
    pub fn sample(&self) -> Option<Observation> {
        self.provider.emit_ttl_check()
    }

    /// Spawns the sampling loop and returns immediately.
    ///
    /// The first tick fires one interval after the call. The loop ends when
    /// `ctx` is cancelled or reaches its deadline, or when
    /// [`SamplerHandle::stop`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`CredwatchError::SamplerRunning`](crate::CredwatchError::SamplerRunning)
    /// if another sampler is still running for the same provider.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(self, ctx: &Context) -> Result<SamplerHandle> {
        self.provider.claim_sampler()?;
        let claim = SamplerClaim(Arc::clone(&self.provider));

        let ctx = ctx.child();
        let cancel = ctx.cancellation_token().clone();
        let handle = tokio::spawn(self.run(ctx, claim));
        Ok(SamplerHandle { cancel, handle })
    }

    async fn run(self, ctx: Context, _claim: SamplerClaim) {
        let instance = self.provider.instance_id();
        tracing::debug!(
            %instance,
            interval_ms = self.interval.as_millis() as u64,
            "ttl sampler started"
        );

        // The ticker lives in this frame and is dropped on every exit path.
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                reason = ctx.done() => {
                    tracing::debug!(%instance, reason = %reason, "ttl sampler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if self.sample().is_none() {
                        tracing::trace!(%instance, "ttl sampler tick skipped, nothing retrieved yet");
                    }
                }
            }
        }
    }
}

/// Releases the provider's sampler slot when the task ends or is dropped.
struct SamplerClaim(Arc<RefreshObservingProvider>);

impl Drop for SamplerClaim {
    fn drop(&mut self) {
        self.0.release_sampler();
    }
}

/// Handle to a running sampler task.
///
/// Dropping the handle does not stop the task; cancel the context it was
/// started with or call [`stop`](Self::stop).
#[derive(Debug)]
pub struct SamplerHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SamplerHandle {
    /// Stops this sampler without cancelling the parent context.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the task to exit.
    pub async fn join(self) {
        if let Err(err) = self.handle.await {
            if err.is_panic() {
                tracing::warn!(error = %err, "ttl sampler task panicked");
            }
        }
    }
}
