//! Per-host DNS resolution cache (C3): memoizes the first resolution cost
//! for each host across one simulation run.

use std::collections::HashMap;

/// DNS resolution cost, expressed as a multiple of RTT, when a host has
/// never been resolved before.
pub const DNS_RTT_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Default)]
pub struct DnsCache {
    resolved_at_ms: HashMap<String, f64>,
}

impl DnsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `host` as already resolved at `at_ms`, bypassing the normal
    /// first-lookup cost. Used to model a host whose resolution completed
    /// before the simulated clock started (the navigation's own host is
    /// resolved by the OS prior to `navigationStart`; see the simulator's
    /// treatment of the root node).
    pub fn mark_resolved(&mut self, host: &str, at_ms: f64) {
        self.resolved_at_ms
            .entry(host.to_string())
            .and_modify(|existing| *existing = existing.min(at_ms))
            .or_insert(at_ms);
    }

    /// Milliseconds until `host` resolves, as observed from `requested_at_ms`.
    /// Updates the cache with the earlier of the existing and new resolution
    /// time when `should_update_cache` is set.
    pub fn time_until_resolution(
        &mut self,
        host: &str,
        rtt_ms: f64,
        requested_at_ms: f64,
        should_update_cache: bool,
    ) -> f64 {
        let mut cost = rtt_ms * DNS_RTT_MULTIPLIER;
        if let Some(&resolved_at) = self.resolved_at_ms.get(host) {
            let cached_cost = (resolved_at - requested_at_ms).max(0.0);
            cost = cost.min(cached_cost);
        }

        if should_update_cache {
            let candidate_resolved_at = requested_at_ms + cost;
            self.resolved_at_ms
                .entry(host.to_string())
                .and_modify(|existing| *existing = existing.min(candidate_resolved_at))
                .or_insert(candidate_resolved_at);
        }

        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_lookup_pays_full_cost() {
        let mut cache = DnsCache::new();
        let cost = cache.time_until_resolution("example.com", 150.0, 0.0, true);
        assert_eq!(cost, 300.0);
    }

    #[test]
    fn second_lookup_reuses_cached_resolution() {
        let mut cache = DnsCache::new();
        cache.time_until_resolution("example.com", 150.0, 0.0, true);
        // requested later than the cached resolution time -> cost is 0.
        let cost = cache.time_until_resolution("example.com", 150.0, 1_000.0, true);
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn concurrent_lookup_before_resolution_waits_the_remainder() {
        let mut cache = DnsCache::new();
        cache.time_until_resolution("example.com", 150.0, 0.0, true);
        // requested at 100ms, resolution completes at 300ms -> 200ms left.
        let cost = cache.time_until_resolution("example.com", 150.0, 100.0, true);
        assert_eq!(cost, 200.0);
    }

    #[test]
    fn mark_resolved_preempts_the_first_lookup_cost() {
        let mut cache = DnsCache::new();
        cache.mark_resolved("example.com", 0.0);
        let cost = cache.time_until_resolution("example.com", 150.0, 0.0, true);
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn distinct_hosts_are_independent() {
        let mut cache = DnsCache::new();
        cache.time_until_resolution("a.com", 150.0, 0.0, true);
        let cost = cache.time_until_resolution("b.com", 150.0, 0.0, true);
        assert_eq!(cost, 300.0);
    }
}
