//! Property-based tests for key composition, entry lifetimes, and backoff.

use herald_core::cache::entry::CacheEntry;
use herald_core::cache::key::{compose, tenant_prefix};
use herald_core::config::RetrySettings;
use herald_core::resilience::RetryExecutor;
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    /// Property: every composed key carries its tenant prefix, so
    /// prefix-scoped bulk operations always see it
    #[test]
    fn composed_keys_always_carry_the_tenant_prefix(
        tenant in "[a-z0-9_-]{1,16}",
        logical in "[ -~]{1,64}",
    ) {
        let composed = compose(&tenant, "doc", &logical);
        prop_assert!(composed.starts_with(&tenant_prefix(&tenant, "doc")));
    }

    /// Property: distinct tenants never share a prefix, even when one
    /// tenant id is a prefix of the other or contains the separator
    #[test]
    fn distinct_tenants_never_share_a_prefix(
        a in "[a-z:]{1,12}",
        b in "[a-z:]{1,12}",
    ) {
        let prefix_a = tenant_prefix(&a, "doc");
        let prefix_b = tenant_prefix(&b, "doc");
        prop_assume!(prefix_a != prefix_b);

        let composed = compose(&a, "doc", "some-key");
        prop_assert!(!composed.starts_with(&prefix_b));
    }

    /// Property: entry lifetime boundaries are ordered for any TTL and
    /// staleness fraction
    #[test]
    fn entry_boundaries_are_ordered(
        ttl_ms in 0u64..1_000_000_000,
        fraction in 0.0f64..=1.0,
    ) {
        let entry = CacheEntry::new((), Duration::from_millis(ttl_ms), fraction);
        prop_assert!(entry.created_at <= entry.stale_at);
        prop_assert!(entry.stale_at <= entry.expires_at);
    }

    /// Property: backoff delays never shrink between attempts and never
    /// exceed the configured cap
    #[test]
    fn backoff_is_monotonic_and_capped(
        initial in 1u64..5000,
        multiplier in 1.0f64..4.0,
        attempts in 1u32..12,
    ) {
        let executor = RetryExecutor::new(RetrySettings {
            max_retries: 3,
            initial_delay_ms: initial,
            backoff_multiplier: multiplier,
            max_delay_ms: 60_000,
            attempt_timeout_ms: 1000,
            jitter_enabled: false,
            jitter_max_percentage: 0.1,
        });

        let mut previous = Duration::ZERO;
        for attempt in 1..=attempts {
            let delay = executor.backoff_delay(attempt);
            prop_assert!(delay >= previous);
            prop_assert!(delay <= Duration::from_millis(60_000));
            previous = delay;
        }
    }
}
