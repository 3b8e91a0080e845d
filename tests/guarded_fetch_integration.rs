//! End-to-end tests of the control loop: a cache miss triggers a guarded
//! fetch, the fetch outcome feeds the circuit breaker, and the breaker's
//! state gates whether later fetches run at all.

use herald_core::cache::{FetchOptions, InMemorySharedTier, TierTopology, TieredCache};
use herald_core::config::{
    BreakerSettings, CacheSettings, CircuitBreakerSettings, RetrySettings,
};
use herald_core::resilience::{
    is_circuit_open, BreakerRegistry, CircuitState, ProtectedUpstream, RetryExecutor,
    UpstreamError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_test::assert_ok;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Summary {
    v: u32,
}

fn stack(
    failure_threshold: u32,
    max_retries: u32,
) -> (TieredCache<Summary>, Arc<BreakerRegistry>, ProtectedUpstream) {
    let registry = Arc::new(BreakerRegistry::new(CircuitBreakerSettings {
        default: BreakerSettings {
            failure_threshold,
            success_threshold: 1,
            reset_timeout_seconds: 1,
            window_size: 10,
            min_samples: 100,
        },
        components: HashMap::new(),
    }));

    let retry = RetryExecutor::new(RetrySettings {
        max_retries,
        initial_delay_ms: 5,
        backoff_multiplier: 2.0,
        max_delay_ms: 50,
        attempt_timeout_ms: 500,
        jitter_enabled: false,
        jitter_max_percentage: 0.1,
    });

    let cache = TieredCache::new(
        "doc",
        CacheSettings::for_test(),
        TierTopology::LocalOnly,
    );
    let upstream = ProtectedUpstream::new("document_store", registry.clone(), retry);

    (cache, registry, upstream)
}

fn options_with_ttl(ttl: Duration) -> FetchOptions {
    FetchOptions::default().with_ttls(ttl, ttl)
}

#[tokio::test]
async fn cold_miss_fetches_once_then_serves_from_cache() {
    let (cache, registry, upstream) = stack(5, 2);
    let calls = Arc::new(AtomicU32::new(0));

    let counted = calls.clone();
    let first = cache
        .get_or_fetch(
            "acme",
            "release-notes",
            upstream.fetcher(move || {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, UpstreamError>(Summary { v: 1 }) }
            }),
            options_with_ttl(Duration::from_secs(60)),
        )
        .await
        .unwrap();
    assert_eq!(first, Summary { v: 1 });

    // Immediate re-read within the TTL: the value comes from the cache and
    // the upstream is not consulted again
    let counted = calls.clone();
    let second = cache
        .get_or_fetch(
            "acme",
            "release-notes",
            upstream.fetcher(move || {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, UpstreamError>(Summary { v: 9 }) }
            }),
            options_with_ttl(Duration::from_secs(60)),
        )
        .await
        .unwrap();

    assert_eq!(second, Summary { v: 1 });
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = registry.component_stats("document_store").await.unwrap();
    assert_eq!(stats.success_count, 1);
    assert_eq!(stats.state, CircuitState::Closed);
}

#[tokio::test]
async fn failing_upstream_opens_the_breaker_and_later_calls_fail_fast() {
    let (cache, registry, upstream) = stack(2, 1);
    let calls = Arc::new(AtomicU32::new(0));

    // Each miss runs one retry sequence (2 attempts) and records one
    // breaker failure; two misses open the circuit
    for _ in 0..2 {
        let counted = calls.clone();
        let result = cache
            .get_or_fetch(
                "acme",
                "release-notes",
                upstream.fetcher(move || {
                    counted.fetch_add(1, Ordering::SeqCst);
                    async {
                        Err::<Summary, _>(UpstreamError::from_status(
                            "document_store",
                            503,
                            "unavailable",
                        ))
                    }
                }),
                options_with_ttl(Duration::from_secs(60)),
            )
            .await;
        assert!(result.is_err());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(
        registry.breaker("document_store").state(),
        CircuitState::Open
    );

    // The next miss is rejected before the upstream sees a single attempt,
    // with an error boundaries can map to "temporarily unavailable"
    let counted = calls.clone();
    let result = cache
        .get_or_fetch(
            "acme",
            "release-notes",
            upstream.fetcher(move || {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, UpstreamError>(Summary { v: 1 }) }
            }),
            options_with_ttl(Duration::from_secs(60)),
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    match result {
        Err(err) => assert!(is_circuit_open(&err)),
        Ok(_) => panic!("expected a breaker-open failure"),
    }
}

#[tokio::test]
async fn breaker_recovers_and_the_loop_heals() {
    let (cache, registry, upstream) = stack(1, 0);

    let result = cache
        .get_or_fetch(
            "acme",
            "k",
            upstream.fetcher(|| async {
                Err::<Summary, _>(UpstreamError::from_status("document_store", 500, "boom"))
            }),
            options_with_ttl(Duration::from_secs(60)),
        )
        .await;
    assert!(result.is_err());
    assert_eq!(
        registry.breaker("document_store").state(),
        CircuitState::Open
    );

    // After the reset timeout a trial call is admitted, succeeds, and the
    // value lands in the cache
    sleep(Duration::from_millis(1100)).await;

    let value = tokio_test::assert_ok!(
        cache
            .get_or_fetch(
                "acme",
                "k",
                upstream.fetcher(|| async { Ok::<_, UpstreamError>(Summary { v: 2 }) }),
                options_with_ttl(Duration::from_secs(60)),
            )
            .await
    );

    assert_eq!(value, Summary { v: 2 });
    assert_eq!(
        registry.breaker("document_store").state(),
        CircuitState::Closed
    );
    assert_eq!(cache.get("acme", "k").await, Some(Summary { v: 2 }));
}

#[tokio::test]
async fn stale_entry_is_served_while_the_guarded_refresh_runs() {
    let registry = Arc::new(BreakerRegistry::new(CircuitBreakerSettings::default()));
    let upstream = ProtectedUpstream::new(
        "document_store",
        registry.clone(),
        RetryExecutor::new(RetrySettings {
            max_retries: 0,
            initial_delay_ms: 5,
            backoff_multiplier: 2.0,
            max_delay_ms: 50,
            attempt_timeout_ms: 500,
            jitter_enabled: false,
            jitter_max_percentage: 0.1,
        }),
    );

    let settings = CacheSettings {
        stale_fraction: 0.5,
        ..CacheSettings::for_test()
    };
    let cache: TieredCache<Summary> = TieredCache::new("doc", settings, TierTopology::LocalOnly);

    cache
        .set("acme", "k", Summary { v: 1 }, Duration::from_millis(400))
        .await;
    sleep(Duration::from_millis(250)).await;

    let stale = cache
        .get_or_fetch(
            "acme",
            "k",
            upstream.fetcher(|| async {
                sleep(Duration::from_millis(50)).await;
                Ok::<_, UpstreamError>(Summary { v: 2 })
            }),
            options_with_ttl(Duration::from_millis(400)),
        )
        .await
        .unwrap();

    // The caller got the stale value without waiting for the refresh
    assert_eq!(stale, Summary { v: 1 });

    sleep(Duration::from_millis(100)).await;
    assert_eq!(cache.get("acme", "k").await, Some(Summary { v: 2 }));

    let stats = registry.component_stats("document_store").await.unwrap();
    assert_eq!(stats.success_count, 1);
}

#[tokio::test]
async fn a_second_instance_reads_through_the_shared_tier() {
    let shared = Arc::new(InMemorySharedTier::new());

    let writer: TieredCache<Summary> = TieredCache::new(
        "doc",
        CacheSettings::for_test(),
        TierTopology::LocalPlusShared(shared.clone()),
    );
    writer
        .set("acme", "k", Summary { v: 7 }, Duration::from_secs(60))
        .await;

    // A fresh instance with an empty local tier, sharing only the external
    // store, still answers without fetching
    let reader: TieredCache<Summary> = TieredCache::new(
        "doc",
        CacheSettings::for_test(),
        TierTopology::LocalPlusShared(shared),
    );
    assert_eq!(reader.get("acme", "k").await, Some(Summary { v: 7 }));
    assert_eq!(reader.stats().shared_hits, 1);
}
