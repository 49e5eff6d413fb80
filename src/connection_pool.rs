//! Connection pool (C4): allocates TCP connections per origin, enforces the
//! per-origin concurrency cap, and matches warm/cold connections to requests.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::analyzer::{infer_connection_reuse, OriginSummary, SUMMARY_ORIGIN};
use crate::model::NetworkRequest;
use crate::tcp::TcpConnection;

/// Minimum number of connections kept idle per origin.
pub const CONNECTIONS_PER_ORIGIN: usize = 6;

/// A stable handle to one connection inside the pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    origin: String,
    index: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireOptions {
    pub ignore_connection_reused: bool,
}

#[derive(Debug)]
pub struct ConnectionPool {
    connections: HashMap<String, Vec<TcpConnection>>,
    idle: HashMap<String, HashSet<usize>>,
    bound: HashMap<String, ConnectionHandle>,
    /// Always the coarse/force-inferred classification (§4.3 `force_coarse`).
    observed_reused: HashMap<String, bool>,
}

impl ConnectionPool {
    /// Builds a pool sized per origin from the records that will be
    /// simulated. `default_rtt_ms`/`default_throughput_bps` back-fill
    /// origins the analyzer had no samples for.
    pub fn new(
        records: &[NetworkRequest],
        rtt_by_origin: &HashMap<String, OriginSummary>,
        server_response_time_by_origin: &HashMap<String, OriginSummary>,
        default_rtt_ms: f64,
        default_throughput_bps: f64,
    ) -> Self {
        let observed_reused = infer_connection_reuse(records);

        let mut grouped: HashMap<String, Vec<&NetworkRequest>> = HashMap::new();
        for r in records {
            grouped.entry(r.origin().0).or_default().push(r);
        }

        let fallback_rtt = rtt_by_origin.get(SUMMARY_ORIGIN).map(|s| s.min).unwrap_or(default_rtt_ms);

        let mut connections: HashMap<String, Vec<TcpConnection>> = HashMap::new();
        let mut idle: HashMap<String, HashSet<usize>> = HashMap::new();

        for (origin, group) in grouped {
            let fresh_count = group
                .iter()
                .filter(|r| !observed_reused.get(&r.request_id).copied().unwrap_or(false))
                .count();
            let size = fresh_count.max(CONNECTIONS_PER_ORIGIN);

            let rtt = rtt_by_origin.get(&origin).map(|s| s.min).unwrap_or(fallback_rtt);
            let server_latency = server_response_time_by_origin
                .get(&origin)
                .map(|s| s.median)
                .unwrap_or(0.0);
            let sample = group[0];
            let template = TcpConnection::new(rtt, default_throughput_bps, server_latency, sample.is_secure(), sample.is_h2());

            trace!(origin = %origin, size, "allocating connection pool slots");
            let conns: Vec<TcpConnection> = (0..size).map(|_| template.clone()).collect();
            idle.insert(origin.clone(), (0..size).collect());
            connections.insert(origin, conns);
        }

        Self {
            connections,
            idle,
            bound: HashMap::new(),
            observed_reused,
        }
    }

    /// Acquires a connection for `record`, per §4.3: reuse any existing
    /// binding, else prefer warmest idle connections, optionally ignoring
    /// the warm/cold match when `ignore_connection_reused` is set.
    pub fn acquire(&mut self, record: &NetworkRequest, options: AcquireOptions) -> Option<ConnectionHandle> {
        if let Some(handle) = self.bound.get(&record.request_id) {
            return Some(handle.clone());
        }

        let origin = record.origin().0;
        let conns = self.connections.get(&origin)?;
        let idle_set = self.idle.get(&origin)?;
        if idle_set.is_empty() {
            return None;
        }

        let mut candidates: Vec<usize> = idle_set.iter().copied().collect();
        candidates.sort_by(|&a, &b| conns[b].congestion_window.cmp(&conns[a].congestion_window));

        let chosen = if options.ignore_connection_reused {
            candidates.first().copied()
        } else {
            let want_warmed = self
                .observed_reused
                .get(&record.request_id)
                .copied()
                .unwrap_or(record.connection_reused);
            candidates.into_iter().find(|&idx| conns[idx].warmed == want_warmed)
        }?;

        self.idle.get_mut(&origin).unwrap().remove(&chosen);
        let handle = ConnectionHandle { origin: origin.clone(), index: chosen };
        self.bound.insert(record.request_id.clone(), handle.clone());
        Some(handle)
    }

    /// Releases the connection bound to `record` back to the idle set.
    pub fn release(&mut self, record: &NetworkRequest) {
        if let Some(handle) = self.bound.remove(&record.request_id) {
            self.idle.entry(handle.origin.clone()).or_default().insert(handle.index);
        }
    }

    pub fn get(&self, handle: &ConnectionHandle) -> &TcpConnection {
        &self.connections[&handle.origin][handle.index]
    }

    pub fn get_mut(&mut self, handle: &ConnectionHandle) -> &mut TcpConnection {
        self.connections.get_mut(&handle.origin).unwrap().get_mut(handle.index).unwrap()
    }

    /// All handles currently bound to a request (i.e. in use), in
    /// unspecified order — callers that need determinism should sort.
    pub fn bound_handles(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.bound.values()
    }
}
