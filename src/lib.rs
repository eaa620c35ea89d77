//! Credwatch - refresh-observing decorator for cloud credential providers.
//!
//! Credwatch wraps a credential provider and reports what happens to the
//! credentials flowing through it, without touching request signing. It
//! answers two operational questions for long-running API clients: *when did
//! my credentials actually rotate?* and *how long do the current ones have
//! left?*
//!
//! # Features
//!
//! - **Refresh detection**: one observation per actual key change, not per request
//! - **TTL sampling**: a background task reports remaining lifetime on an interval
//! - **Drop-in decorator**: the observer is itself a [`ProvideCredentials`],
//!   so it layers under an outer cache (such as the AWS SDK identity cache)
//! - **Pluggable sinks**: `tracing` events by default, in-memory or channel sinks
//! - **Transparent errors**: source failures pass through unchanged
//!
//! # Quick Start
//!
//! ```no_run
//! use credwatch::{Context, Credentials, ProvideCredentials, RefreshObservingProvider};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> credwatch::Result<()> {
//!     // Wrap a credential source
//!     let source = Credentials::permanent("AKIAEXAMPLE", "secret");
//!     let provider = Arc::new(RefreshObservingProvider::new(source));
//!
//!     // Report remaining lifetime every 30 seconds until cancelled
//!     let ctx = Context::background();
//!     let sampler = provider.start_ttl_sampler(&ctx, Duration::from_secs(30))?;
//!
//!     // Every retrieval is forwarded; only the first one here logs a refresh
//!     let creds = provider.retrieve(&ctx).await?;
//!     provider.retrieve(&ctx).await?;
//!     println!("using {}", creds.access_key_id());
//!
//!     ctx.cancel();
//!     sampler.join().await;
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! | Feature | Default | Provides |
//! |---------|---------|----------|
//! | `mock` | yes | [`sources::mock::MockSource`] with error injection |
//! | `aws` | no | Bridge to the AWS SDK credential traits |
//!
//! ```toml
//! [dependencies]
//! credwatch = { version = "0.1", features = ["aws"] }
//! ```

pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod hook;
pub mod observation;
pub mod provider;
pub mod refresh;
pub mod sampler;
pub mod sources;
pub mod validation;

pub use config::Config;
pub use context::Context;
pub use credentials::{Credentials, Lifetime};
pub use error::{Result, CredwatchError};
pub use hook::{correlate, Correlation, SigningCredentialsLookup};
pub use observation::{Observation, ObservationSink};
pub use provider::ProvideCredentials;
pub use refresh::{RefreshObservingProvider, RefreshPolicy};
pub use sampler::{SamplerHandle, TtlSampler};

// Compile-time check: the decorator must be shareable across tasks.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<RefreshObservingProvider>;
    let _ = assert_send_sync::<Credentials>;
    let _ = assert_send_sync::<Context>;
};
