//! Observing SDK credentials against LocalStack.
//!
//! Static test keys are wrapped by the refresh observer, and the observer is
//! handed to the AWS SDK, whose identity cache decides when to call it.
//! Secrets Manager calls then run in a loop while the TTL sampler reports
//! the remaining lifetime.
//!
//! Run with:
//!   docker run -d -p 4566:4566 localstack/localstack
//!   RUST_LOG=info cargo run --example localstack --features aws

use aws_config::{BehaviorVersion, Region};
use credwatch::sources::aws::{AwsCredentialSource, SdkCredentialsProvider};
use credwatch::{Config, Context, RefreshObservingProvider};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let endpoint = std::env::var("LOCALSTACK_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4566".to_string());
    let config = Config::from_env()?;

    let static_keys = aws_credential_types::Credentials::new("test", "test", None, None, "static");
    let observer = Arc::new(
        RefreshObservingProvider::new(AwsCredentialSource::new(static_keys)).with_config(&config),
    );

    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new("us-west-2"))
        .endpoint_url(&endpoint)
        .credentials_provider(SdkCredentialsProvider::new(observer.clone()))
        .load()
        .await;
    let client = aws_sdk_secretsmanager::Client::new(&sdk_config);

    let ctx = Context::background();
    let _sampler = observer.start_configured_sampler(&ctx, &config)?;

    loop {
        let name = format!("credwatch-demo-{}", chrono::Utc::now().format("%H%M%S"));
        client
            .create_secret()
            .name(&name)
            .secret_string("LocalUser")
            .send()
            .await?;
        println!("Secret created: {}", name);

        let value = client.get_secret_value().secret_id(&name).send().await?;
        println!("Fetched secret: {}={}", name, value.secret_string().unwrap_or(""));

        // Keep running to see TTL samples between calls
        tokio::time::sleep(std::time::Duration::from_secs(120)).await;
    }
}
