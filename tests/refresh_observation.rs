//! End-to-end behavior of the refresh observer and TTL sampler, driven
//! through the public API with the mock source.

#![cfg(feature = "mock")]

use chrono::{Duration as ChronoDuration, Utc};
use credwatch::observation::MemorySink;
use credwatch::sources::mock::MockSource;
use credwatch::{
    correlate, Context, Correlation, Credentials, Lifetime, Observation, ProvideCredentials,
    RefreshObservingProvider,
};
use std::sync::Arc;
use std::time::Duration;

fn setup(initial: Credentials) -> (Arc<MockSource>, Arc<RefreshObservingProvider>, Arc<MemorySink>) {
    let source = Arc::new(MockSource::new(initial));
    let sink = Arc::new(MemorySink::new());
    let provider = Arc::new(RefreshObservingProvider::from_shared(source.clone()).with_sink(sink.clone()));
    (source, provider, sink)
}

#[tokio::test]
async fn test_identical_tuple_with_shorter_expiry_is_silent() {
    let now = Utc::now();
    let (source, provider, sink) = setup(Credentials::new(
        "AKIA1",
        "s1",
        Some(String::new()),
        Some(now + ChronoDuration::minutes(10)),
    ));
    let ctx = Context::background();

    provider.retrieve(&ctx).await.unwrap();
    assert!(matches!(
        sink.observations().as_slice(),
        [Observation::Refreshed { has_session_token: false, .. }]
    ));

    source
        .set_credentials(Credentials::new(
            "AKIA1",
            "s1",
            None,
            Some(now + ChronoDuration::minutes(9)),
        ))
        .await;
    provider.retrieve(&ctx).await.unwrap();

    assert_eq!(sink.len(), 1);
    assert_eq!(
        provider.last_seen().unwrap().expires_at(),
        Some(now + ChronoDuration::minutes(10))
    );
}

#[tokio::test]
async fn test_sequence_of_rotations_and_failures() {
    let (source, provider, sink) = setup(Credentials::permanent("AKIA1", "s1"));
    let ctx = Context::background();

    //           key     fails
    let script = [
        ("AKIA1", false),
        ("AKIA1", false),
        ("AKIA2", false),
        ("AKIA3", true),
        ("AKIA2", false),
        ("AKIA4", false),
        ("AKIA4", false),
    ];

    let mut expected_keys = Vec::new();
    let mut previous: Option<String> = None;
    for (key, fails) in script {
        source.set_credentials(Credentials::permanent(key, "s")).await;
        if fails {
            source.fail_with("expired refresh token").await;
        } else {
            source.clear_failure().await;
        }

        let before = provider.last_seen();
        let result = provider.retrieve(&ctx).await;

        if fails {
            assert!(result.is_err());
            assert_eq!(
                provider.last_seen().map(|c| c.access_key_id().to_string()),
                before.map(|c| c.access_key_id().to_string())
            );
            continue;
        }

        let got = result.unwrap();
        if previous.as_deref() != Some(got.access_key_id()) {
            expected_keys.push(got.access_key_id().to_string());
        }
        previous = Some(got.access_key_id().to_string());
    }

    let logged: Vec<String> = sink
        .observations()
        .iter()
        .filter(|o| o.kind() == "refreshed")
        .filter_map(|o| o.access_key_id().map(str::to_string))
        .collect();
    assert_eq!(logged, expected_keys);
    assert_eq!(logged, vec!["AKIA1", "AKIA2", "AKIA4"]);
    assert_eq!(sink.count("retrieval_failed"), 1);
    assert_eq!(source.call_count(), script.len());
}

#[tokio::test(start_paused = true)]
async fn test_sampler_sees_expiry_pass() {
    let expires_at = Utc::now() + ChronoDuration::milliseconds(50);
    let (_source, provider, sink) = setup(Credentials::new("AKIA1", "s1", None, Some(expires_at)));
    let ctx = Context::background();

    provider.retrieve(&ctx).await.unwrap();
    // Wall-clock expiry, so wait for real time to pass before sampling.
    std::thread::sleep(Duration::from_millis(60));

    let handle = provider.start_ttl_sampler(&ctx, Duration::from_secs(30)).unwrap();
    tokio::time::sleep(Duration::from_secs(31)).await;
    ctx.cancel();
    handle.join().await;

    let remaining = sink
        .observations()
        .into_iter()
        .find_map(|o| match o {
            Observation::TtlCheck { remaining, .. } => Some(remaining),
            _ => None,
        })
        .expect("a ttl check was emitted");
    assert!(remaining.is_expired());
    assert!(matches!(remaining, Lifetime::Remaining(d) if d < ChronoDuration::zero()));
}

#[tokio::test]
async fn test_pipeline_correlation_after_rotation() {
    let (source, provider, _sink) = setup(Credentials::permanent("AKIA1", "s1"));
    let ctx = Context::background();

    let signed_with = provider.retrieve(&ctx).await.unwrap();
    let request_ctx = ctx.child().with_signing_credentials(signed_with);
    assert_eq!(correlate(&request_ctx, &provider), Correlation::Current);

    source.set_credentials(Credentials::permanent("AKIA2", "s2")).await;
    provider.retrieve(&ctx).await.unwrap();

    assert_eq!(
        correlate(&request_ctx, &provider),
        Correlation::Stale {
            signed_with: "AKIA1".into(),
            last_seen: "AKIA2".into(),
        }
    );
}
