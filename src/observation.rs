//! Structured observations and the sinks that receive them.
//!
//! Every event the core reports is an [`Observation`]. Where it ends up is up
//! to the [`ObservationSink`]: [`TracingSink`] writes `tracing` events,
//! [`MemorySink`] keeps them for inspection, [`ChannelSink`] forwards them to
//! a consumer task.

use crate::Lifetime;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// `tracing` target used by [`TracingSink`].
pub const LOG_TARGET: &str = "credwatch::credentials";

/// A single event emitted by the refresh observer or the TTL sampler.
///
/// Secrets and session token values are never part of an observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Observation {
    /// The wrapped source returned new key material (or the first value ever).
    Refreshed {
        access_key_id: String,
        ttl: Lifetime,
        has_session_token: bool,
        observed_at: DateTime<Utc>,
    },
    /// The wrapped source failed or the retrieval was cancelled.
    RetrievalFailed {
        provider: String,
        error: String,
        observed_at: DateTime<Utc>,
    },
    /// Periodic sample of the last-seen credential's remaining lifetime.
    TtlCheck {
        access_key_id: String,
        remaining: Lifetime,
        observed_at: DateTime<Utc>,
    },
}

impl Observation {
    /// Short event name, matching the serialized `event` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Refreshed { .. } => "refreshed",
            Self::RetrievalFailed { .. } => "retrieval_failed",
            Self::TtlCheck { .. } => "ttl_check",
        }
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        match self {
            Self::Refreshed { observed_at, .. }
            | Self::RetrievalFailed { observed_at, .. }
            | Self::TtlCheck { observed_at, .. } => *observed_at,
        }
    }

    /// Access key id the observation refers to, if any.
    pub fn access_key_id(&self) -> Option<&str> {
        match self {
            Self::Refreshed { access_key_id, .. } | Self::TtlCheck { access_key_id, .. } => {
                Some(access_key_id)
            }
            Self::RetrievalFailed { .. } => None,
        }
    }
}

/// Receives observations.
///
/// `emit` is infallible by signature: a sink that cannot deliver an
/// observation drops it. It is called while the observer holds its state
/// lock, so it should not block.
pub trait ObservationSink: Send + Sync {
    fn emit(&self, observation: &Observation);
}

impl<T: ObservationSink + ?Sized> ObservationSink for Arc<T> {
    fn emit(&self, observation: &Observation) {
        (**self).emit(observation)
    }
}

/// Writes observations as structured `tracing` events.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    instance: Option<String>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags every event with an `instance` field.
    pub fn with_instance(instance: impl Into<String>) -> Self {
        Self {
            instance: Some(instance.into()),
        }
    }
}

impl ObservationSink for TracingSink {
    fn emit(&self, observation: &Observation) {
        let instance = self.instance.as_deref().unwrap_or("-");
        match observation {
            Observation::Refreshed {
                access_key_id,
                ttl,
                has_session_token,
                ..
            } => {
                tracing::info!(
                    target: LOG_TARGET,
                    instance,
                    access_key_id = %access_key_id,
                    expires_in = %ttl,
                    session_token_present = has_session_token,
                    "credentials refreshed"
                );
            }
            Observation::RetrievalFailed {
                provider, error, ..
            } => {
                tracing::warn!(
                    target: LOG_TARGET,
                    instance,
                    provider = %provider,
                    error = %error,
                    "failed to retrieve credentials"
                );
            }
            Observation::TtlCheck {
                access_key_id,
                remaining: Lifetime::Permanent,
                ..
            } => {
                tracing::info!(
                    target: LOG_TARGET,
                    instance,
                    access_key_id = %access_key_id,
                    "ttl check: permanent credentials, no expiration"
                );
            }
            Observation::TtlCheck {
                access_key_id,
                remaining,
                ..
            } => {
                tracing::info!(
                    target: LOG_TARGET,
                    instance,
                    access_key_id = %access_key_id,
                    remaining = %remaining,
                    expired = remaining.is_expired(),
                    "ttl check: remaining until expiration"
                );
            }
        }
    }
}

/// Keeps every observation in memory.
///
/// Meant for tests and for dashboards that poll the recent history.
#[derive(Debug, Default)]
pub struct MemorySink {
    observations: Mutex<Vec<Observation>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.observations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.lock().is_empty()
    }

    /// Number of recorded observations of the given [`kind`](Observation::kind).
    pub fn count(&self, kind: &str) -> usize {
        self.observations
            .lock()
            .iter()
            .filter(|o| o.kind() == kind)
            .count()
    }

    pub fn clear(&self) {
        self.observations.lock().clear();
    }
}

impl ObservationSink for MemorySink {
    fn emit(&self, observation: &Observation) {
        self.observations.lock().push(observation.clone());
    }
}

/// Forwards observations over an unbounded tokio channel.
///
/// A closed receiver is not an error; observations are dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Observation>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that consumes from it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Observation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ObservationSink for ChannelSink {
    fn emit(&self, observation: &Observation) {
        if self.tx.send(observation.clone()).is_err() {
            tracing::trace!(target: LOG_TARGET, "observation receiver closed, dropping");
        }
    }
}

/// Sends each observation to several sinks in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ObservationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ObservationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ObservationSink for FanoutSink {
    fn emit(&self, observation: &Observation) {
        for sink in &self.sinks {
            sink.emit(observation);
        }
    }
}
