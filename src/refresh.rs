//! Refresh-observing credential provider.
//!
//! [`RefreshObservingProvider`] forwards every retrieval to the source it
//! wraps and reports an [`Observation::Refreshed`] only when the key material
//! it gets back differs from what it saw last. Place it *inside* an outer
//! credential cache: the cache decides when to call through, and this
//! provider reports what came back.
//!
//! ```text
//! client -> outer cache -> RefreshObservingProvider -> real source
//! ```

use crate::context::Context;
use crate::observation::{Observation, ObservationSink, TracingSink};
use crate::sampler::{SamplerHandle, TtlSampler};
use crate::{Config, Credentials, ProvideCredentials, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Decides whether a newly retrieved credential counts as a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// Only a change of access key id, secret or session token is a refresh.
    #[default]
    KeyMaterial,
    /// A new expiry on unchanged key material is a refresh as well.
    KeyMaterialOrExpiry,
}

impl RefreshPolicy {
    pub fn is_refresh(&self, previous: &Credentials, next: &Credentials) -> bool {
        match self {
            Self::KeyMaterial => !previous.same_identity(next),
            Self::KeyMaterialOrExpiry => !previous.same_lease(next),
        }
    }
}

impl std::fmt::Display for RefreshPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyMaterial => write!(f, "key-material"),
            Self::KeyMaterialOrExpiry => write!(f, "key-material-or-expiry"),
        }
    }
}

impl FromStr for RefreshPolicy {
    type Err = crate::CredwatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "key-material" | "key_material" | "keys" => Ok(Self::KeyMaterial),
            "key-material-or-expiry" | "key_material_or_expiry" | "expiry" => {
                Ok(Self::KeyMaterialOrExpiry)
            }
            other => Err(crate::CredwatchError::InvalidConfig(format!(
                "unknown refresh policy: {} (expected key-material or key-material-or-expiry)",
                other
            ))),
        }
    }
}

/// Last-seen credential. `None` until the first successful retrieval.
#[derive(Debug, Default)]
struct ObservationState {
    last_seen: Option<Credentials>,
}

impl ObservationState {
    /// Stores `next` and returns the observation to emit when it is a
    /// refresh. Anything else leaves the state as it was.
    fn record(
        &mut self,
        next: &Credentials,
        policy: RefreshPolicy,
        now: DateTime<Utc>,
    ) -> Option<Observation> {
        let refreshed = match &self.last_seen {
            None => true,
            Some(previous) => policy.is_refresh(previous, next),
        };
        if !refreshed {
            return None;
        }

        self.last_seen = Some(next.clone());
        Some(Observation::Refreshed {
            access_key_id: next.access_key_id().to_string(),
            ttl: next.lifetime_at(now),
            has_session_token: next.has_session_token(),
            observed_at: now,
        })
    }

    fn ttl_check(&self, now: DateTime<Utc>) -> Option<Observation> {
        let creds = self.last_seen.as_ref()?;
        Some(Observation::TtlCheck {
            access_key_id: creds.access_key_id().to_string(),
            remaining: creds.lifetime_at(now),
            observed_at: now,
        })
    }
}

/// Credential provider decorator that reports refreshes and tracks TTL.
///
/// Retrieval results and errors pass through unchanged. The only side
/// effect is an observation sent to the configured sink:
///
/// - [`Observation::Refreshed`] on the first success and whenever the key
///   material changes (see [`RefreshPolicy`])
/// - [`Observation::RetrievalFailed`] whenever the wrapped source fails
///
/// # Thread Safety
///
/// The last-seen credential sits behind a mutex, and the compare, update
/// and emit steps happen under that one lock. Concurrent retrievals are
/// therefore serialized at that point, and one transition never produces
/// two observations. The wrapped source must itself be thread-safe.
///
/// # Example
///
/// ```
/// use credwatch::{Context, Credentials, ProvideCredentials, RefreshObservingProvider};
/// use credwatch::observation::MemorySink;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> credwatch::Result<()> {
///     let sink = Arc::new(MemorySink::new());
///     let provider = RefreshObservingProvider::new(Credentials::permanent("AKIA1", "s1"))
///         .with_sink(sink.clone());
///
///     let ctx = Context::background();
///     provider.retrieve(&ctx).await?;
///     provider.retrieve(&ctx).await?;
///
///     assert_eq!(sink.count("refreshed"), 1);
///     Ok(())
/// }
/// ```
pub struct RefreshObservingProvider {
    inner: Arc<dyn ProvideCredentials>,
    policy: RefreshPolicy,
    sink: Arc<dyn ObservationSink>,
    state: Mutex<ObservationState>,
    sampling: AtomicBool,
    instance_id: Uuid,
}

impl RefreshObservingProvider {
    /// Wraps `inner`, logging observations through [`TracingSink`].
    pub fn new(inner: impl ProvideCredentials + 'static) -> Self {
        Self::from_shared(Arc::new(inner))
    }

    /// Wraps an already shared source.
    pub fn from_shared(inner: Arc<dyn ProvideCredentials>) -> Self {
        let instance_id = Uuid::new_v4();
        Self {
            inner,
            policy: RefreshPolicy::default(),
            sink: Arc::new(TracingSink::with_instance(instance_id.to_string())),
            state: Mutex::new(ObservationState::default()),
            sampling: AtomicBool::new(false),
            instance_id,
        }
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the observation sink.
    pub fn with_sink(mut self, sink: Arc<dyn ObservationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Applies the settings from `config` that concern the provider.
    pub fn with_config(self, config: &Config) -> Self {
        self.with_policy(config.refresh_policy)
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Random id distinguishing this provider from others in the process.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Name of the wrapped source.
    pub fn inner_name(&self) -> &str {
        self.inner.name()
    }

    /// The most recently retrieved credential, without calling the source.
    pub fn last_seen(&self) -> Option<Credentials> {
        self.state.lock().last_seen.clone()
    }

    pub fn has_seen_any(&self) -> bool {
        self.state.lock().last_seen.is_some()
    }

    /// Samples the last-seen credential's remaining lifetime.
    ///
    /// Returns `None` before the first successful retrieval. Does not emit;
    /// see [`TtlSampler::sample`] for the emitting variant.
    pub fn ttl_check(&self) -> Option<Observation> {
        self.state.lock().ttl_check(Utc::now())
    }

    /// Starts a background TTL sampler bound to `ctx`.
    ///
    /// Only one sampler runs per provider at a time. Once the running one
    /// has stopped, a new one may be started.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CredwatchError::InvalidConfig`](crate::CredwatchError::InvalidConfig)
    /// if `interval` is zero, and
    /// [`CredwatchError::SamplerRunning`](crate::CredwatchError::SamplerRunning)
    /// if a sampler is already running for this provider.
    pub fn start_ttl_sampler(self: &Arc<Self>, ctx: &Context, interval: Duration) -> Result<SamplerHandle> {
        TtlSampler::new(Arc::clone(self), interval)?.start(ctx)
    }

    /// Starts the sampler described by `config`.
    ///
    /// Returns `Ok(None)` when `config.sampler_enabled` is false.
    pub fn start_configured_sampler(self: &Arc<Self>, ctx: &Context, config: &Config) -> Result<Option<SamplerHandle>> {
        if !config.sampler_enabled {
            tracing::debug!(instance = %self.instance_id, "ttl sampler disabled by configuration");
            return Ok(None);
        }
        self.start_ttl_sampler(ctx, config.ttl_interval).map(Some)
    }

    /// True while a sampler task is running for this provider.
    pub fn is_sampling(&self) -> bool {
        self.sampling.load(Ordering::Acquire)
    }

    /// Marks a sampler as running. Fails if one already is.
    pub(crate) fn claim_sampler(&self) -> Result<()> {
        self.sampling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| crate::CredwatchError::SamplerRunning)
    }

    pub(crate) fn release_sampler(&self) {
        self.sampling.store(false, Ordering::Release);
    }

    /// Emits a TTL sample under the state lock, as the sampler tick does.
    pub(crate) fn emit_ttl_check(&self) -> Option<Observation> {
        let state = self.state.lock();
        let observation = state.ttl_check(Utc::now())?;
        self.emit(&observation);
        Some(observation)
    }

    /// Sends `observation` to the sink. A panicking sink is logged and ignored.
    fn emit(&self, observation: &Observation) {
        let delivered = catch_unwind(AssertUnwindSafe(|| self.sink.emit(observation)));
        if delivered.is_err() {
            tracing::warn!(
                instance = %self.instance_id,
                event = observation.kind(),
                "observation sink panicked; observation dropped"
            );
        }
    }
}

impl std::fmt::Debug for RefreshObservingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshObservingProvider")
            .field("inner", &self.inner.name())
            .field("policy", &self.policy)
            .field("instance_id", &self.instance_id)
            .field("sampling", &self.is_sampling())
            .field("last_seen", &*self.state.lock())
            .finish()
    }
}

#[async_trait]
impl ProvideCredentials for RefreshObservingProvider {
    fn name(&self) -> &str {
        "refresh-observer"
    }

    async fn retrieve(&self, ctx: &Context) -> Result<Credentials> {
        let creds = match ctx.run(self.inner.retrieve(ctx)).await {
            Ok(creds) => creds,
            Err(err) => {
                self.emit(&Observation::RetrievalFailed {
                    provider: self.inner.name().to_string(),
                    error: err.to_string(),
                    observed_at: Utc::now(),
                });
                return Err(err);
            }
        };

        let mut state = self.state.lock();
        if let Some(observation) = state.record(&creds, self.policy, Utc::now()) {
            self.emit(&observation);
        }
        drop(state);

        Ok(creds)
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::observation::MemorySink;
    use crate::sources::mock::MockSource;
    use crate::{CredwatchError, Lifetime};
    use chrono::Duration as ChronoDuration;
    use std::collections::HashSet;

    fn observed(source: MockSource) -> (Arc<MockSource>, RefreshObservingProvider, Arc<MemorySink>) {
        let source = Arc::new(source);
        let sink = Arc::new(MemorySink::new());
        let provider = RefreshObservingProvider::from_shared(source.clone()).with_sink(sink.clone());
        (source, provider, sink)
    }

    fn creds(akid: &str, expires_in: ChronoDuration) -> Credentials {
        Credentials::new(akid, "s1", None, Some(Utc::now() + expires_in))
    }

    #[tokio::test]
    async fn test_same_key_material_logs_once() {
        let (source, provider, sink) = observed(MockSource::new(creds("AKIA1", ChronoDuration::minutes(10))));
        let ctx = Context::background();

        provider.retrieve(&ctx).await.unwrap();
        source
            .set_credentials(creds("AKIA1", ChronoDuration::minutes(9)))
            .await;
        provider.retrieve(&ctx).await.unwrap();
        provider.retrieve(&ctx).await.unwrap();

        let observations = sink.observations();
        assert_eq!(observations.len(), 1);
        match &observations[0] {
            Observation::Refreshed {
                access_key_id,
                has_session_token,
                ttl,
                ..
            } => {
                assert_eq!(access_key_id, "AKIA1");
                assert!(!has_session_token);
                assert!(!ttl.is_permanent());
            }
            other => panic!("unexpected observation: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_renewed_expiry_keeps_last_seen_by_default() {
        let first = creds("AKIA1", ChronoDuration::minutes(10));
        let (source, provider, sink) = observed(MockSource::new(first.clone()));
        let ctx = Context::background();

        provider.retrieve(&ctx).await.unwrap();
        source
            .set_credentials(creds("AKIA1", ChronoDuration::minutes(9)))
            .await;
        let returned = provider.retrieve(&ctx).await.unwrap();

        assert_ne!(returned.expires_at(), first.expires_at());
        assert_eq!(provider.last_seen().unwrap().expires_at(), first.expires_at());
        assert_eq!(sink.count("refreshed"), 1);
    }

    #[tokio::test]
    async fn test_expiry_policy_tracks_renewed_lease() {
        let (source, provider, _sink) = observed(MockSource::new(creds("AKIA1", ChronoDuration::minutes(10))));
        let provider = provider.with_policy(RefreshPolicy::KeyMaterialOrExpiry);
        let ctx = Context::background();

        provider.retrieve(&ctx).await.unwrap();
        let renewed = creds("AKIA1", ChronoDuration::hours(1));
        source.set_credentials(renewed.clone()).await;
        provider.retrieve(&ctx).await.unwrap();

        assert_eq!(provider.last_seen().unwrap().expires_at(), renewed.expires_at());
    }

    #[tokio::test]
    async fn test_changed_key_logs_each_time() {
        let (source, provider, sink) = observed(MockSource::new(creds("AKIA1", ChronoDuration::minutes(10))));
        let ctx = Context::background();

        provider.retrieve(&ctx).await.unwrap();
        source
            .set_credentials(creds("AKIA2", ChronoDuration::minutes(10)))
            .await;
        provider.retrieve(&ctx).await.unwrap();

        let keys: Vec<_> = sink
            .observations()
            .iter()
            .filter_map(|o| o.access_key_id().map(str::to_string))
            .collect();
        assert_eq!(keys, vec!["AKIA1", "AKIA2"]);
    }

    #[tokio::test]
    async fn test_session_token_change_is_refresh() {
        let first = Credentials::new("AKIA1", "s1", Some("t1".into()), None);
        let (source, provider, sink) = observed(MockSource::new(first));
        let ctx = Context::background();

        provider.retrieve(&ctx).await.unwrap();
        source
            .set_credentials(Credentials::new("AKIA1", "s1", Some("t2".into()), None))
            .await;
        provider.retrieve(&ctx).await.unwrap();

        assert_eq!(sink.count("refreshed"), 2);
        assert!(matches!(
            sink.observations()[0],
            Observation::Refreshed { has_session_token: true, ttl: Lifetime::Permanent, .. }
        ));
    }

    #[tokio::test]
    async fn test_failure_leaves_state_untouched() {
        let (source, provider, sink) = observed(MockSource::new(creds("AKIA1", ChronoDuration::minutes(10))));
        let ctx = Context::background();

        provider.retrieve(&ctx).await.unwrap();
        let before = provider.last_seen().unwrap();

        source.fail_with("sts: access denied").await;
        source
            .set_credentials(creds("AKIA2", ChronoDuration::minutes(10)))
            .await;
        let result = provider.retrieve(&ctx).await;

        assert!(matches!(result, Err(CredwatchError::Source { .. })));
        assert!(provider.last_seen().unwrap().same_lease(&before));
        assert_eq!(sink.count("refreshed"), 1);
        assert_eq!(sink.count("retrieval_failed"), 1);

        match sink.observations().last().unwrap() {
            Observation::RetrievalFailed { provider, error, .. } => {
                assert_eq!(provider, "mock");
                assert!(error.contains("access denied"));
            }
            other => panic!("unexpected observation: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_before_first_success() {
        let (source, provider, sink) = observed(MockSource::new(creds("AKIA1", ChronoDuration::minutes(10))));
        source.fail_with("imds unreachable").await;

        assert!(provider.retrieve(&Context::background()).await.is_err());
        assert!(!provider.has_seen_any());
        assert!(provider.ttl_check().is_none());
        assert_eq!(sink.count("refreshed"), 0);
    }

    #[tokio::test]
    async fn test_cancelled_retrieval_does_not_update_state() {
        let (_source, provider, sink) = observed(MockSource::new(creds("AKIA1", ChronoDuration::minutes(10))));
        let ctx = Context::background();
        ctx.cancel();

        let result = provider.retrieve(&ctx).await;

        assert!(matches!(result, Err(CredwatchError::Cancelled)));
        assert!(!provider.has_seen_any());
        assert_eq!(sink.count("refreshed"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_slow_source() {
        let source = MockSource::new(creds("AKIA1", ChronoDuration::minutes(10)))
            .with_delay(std::time::Duration::from_secs(10));
        let (_source, provider, _sink) = observed(source);

        let ctx = Context::background().with_timeout(std::time::Duration::from_secs(1));
        let result = provider.retrieve(&ctx).await;

        assert!(matches!(result, Err(CredwatchError::DeadlineExceeded)));
        assert!(!provider.has_seen_any());
    }

    #[tokio::test]
    async fn test_expiry_policy_logs_renewal() {
        let (source, provider, sink) = observed(MockSource::new(creds("AKIA1", ChronoDuration::minutes(10))));
        let provider = provider.with_policy(RefreshPolicy::KeyMaterialOrExpiry);
        let ctx = Context::background();

        provider.retrieve(&ctx).await.unwrap();
        provider.retrieve(&ctx).await.unwrap();
        source
            .set_credentials(creds("AKIA1", ChronoDuration::minutes(9)))
            .await;
        provider.retrieve(&ctx).await.unwrap();

        assert_eq!(sink.count("refreshed"), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_distinct_identities() {
        const M: usize = 16;
        let source = MockSource::new(Credentials::permanent("unused", "unused"));
        for i in 0..M {
            source
                .push_response(Ok(Credentials::permanent(format!("AKIA{}", i), "s")))
                .await;
        }
        let (_source, provider, sink) = observed(source);
        let provider = Arc::new(provider);

        let tasks = (0..M).map(|_| {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { provider.retrieve(&Context::background()).await })
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let keys: HashSet<_> = sink
            .observations()
            .iter()
            .filter_map(|o| o.access_key_id().map(str::to_string))
            .collect();
        assert_eq!(sink.count("refreshed"), M);
        assert_eq!(keys.len(), M);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_identity_logs_once() {
        let (_source, provider, sink) = observed(MockSource::new(creds("AKIA1", ChronoDuration::minutes(10))));
        let provider = Arc::new(provider);

        let tasks = (0..32).map(|_| {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { provider.retrieve(&Context::background()).await })
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        assert_eq!(sink.count("refreshed"), 1);
    }

    struct PanickingSink;

    impl ObservationSink for PanickingSink {
        fn emit(&self, _observation: &Observation) {
            panic!("sink down");
        }
    }

    #[tokio::test]
    async fn test_panicking_sink_does_not_fail_retrieval() {
        let provider = RefreshObservingProvider::new(Credentials::permanent("AKIA1", "s1"))
            .with_sink(Arc::new(PanickingSink));

        let creds = provider.retrieve(&Context::background()).await.unwrap();
        assert_eq!(creds.access_key_id(), "AKIA1");
        assert!(provider.has_seen_any());
    }

    #[tokio::test]
    async fn test_decorators_stack() {
        let inner_sink = Arc::new(MemorySink::new());
        let outer_sink = Arc::new(MemorySink::new());
        let inner = RefreshObservingProvider::new(Credentials::permanent("AKIA1", "s1"))
            .with_sink(inner_sink.clone());
        let outer = RefreshObservingProvider::new(inner).with_sink(outer_sink.clone());

        outer.retrieve(&Context::background()).await.unwrap();

        assert_eq!(outer.inner_name(), "refresh-observer");
        assert_eq!(inner_sink.count("refreshed"), 1);
        assert_eq!(outer_sink.count("refreshed"), 1);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("key-material".parse::<RefreshPolicy>().unwrap(), RefreshPolicy::KeyMaterial);
        assert_eq!(
            "Key-Material-Or-Expiry".parse::<RefreshPolicy>().unwrap(),
            RefreshPolicy::KeyMaterialOrExpiry
        );
        assert!("sometimes".parse::<RefreshPolicy>().is_err());
        assert_eq!(RefreshPolicy::KeyMaterialOrExpiry.to_string(), "key-material-or-expiry");
    }
}
