//! Basic usage example.
//!
//! Wraps a rotating mock source with the refresh observer, starts the TTL
//! sampler, and retrieves credentials in a loop. Only rotations are logged
//! as refreshes; the sampler reports remaining lifetime in between.
//!
//! Run with: RUST_LOG=info cargo run --example basic

use chrono::{Duration as ChronoDuration, Utc};
use credwatch::sources::mock::MockSource;
use credwatch::{Config, Context, Credentials, ProvideCredentials, RefreshObservingProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn lease(generation: u32, ttl: ChronoDuration) -> Credentials {
    Credentials::new(
        format!("ASIADEMO{:04}", generation),
        format!("secret-{}", generation),
        Some(format!("token-{}", generation)),
        Some(Utc::now() + ttl),
    )
}

#[tokio::main]
async fn main() -> credwatch::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?.with_ttl_interval(Duration::from_secs(2));
    config.validate()?;

    let source = Arc::new(MockSource::new(lease(1, ChronoDuration::seconds(8))));
    let provider = Arc::new(RefreshObservingProvider::from_shared(source.clone()).with_config(&config));

    let ctx = Context::background();
    let sampler = provider.start_configured_sampler(&ctx, &config)?;

    for round in 1..=12u32 {
        // Rotate every fourth round; the other rounds return the same keys.
        if round % 4 == 0 {
            source
                .set_credentials(lease(round / 4 + 1, ChronoDuration::seconds(8)))
                .await;
        }

        let creds = provider.retrieve(&ctx).await?;
        println!("round {:>2}: signed with {}", round, creds.access_key_id());
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    // A failing retrieval is logged and passed through untouched.
    source.fail_with("simulated STS outage").await;
    if let Err(e) = provider.retrieve(&ctx).await {
        println!("retrieval failed as expected: {}", e);
    }

    ctx.cancel();
    if let Some(sampler) = sampler {
        sampler.join().await;
    }

    println!("source called {} times", source.call_count());
    Ok(())
}
