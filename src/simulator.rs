//! Discrete-event scheduler (C8): walks the dependency graph, driving the
//! TCP connection model and connection pool to produce per-node start/end
//! times and total elapsed time, per §4.7.

use std::collections::{HashMap, HashSet};

use tracing::{instrument, trace, warn};

use crate::analyzer::{OriginSummary, SUMMARY_ORIGIN};
use crate::connection_pool::{AcquireOptions, ConnectionHandle, ConnectionPool};
use crate::dns::DnsCache;
use crate::error::{LanternError, Phase};
use crate::graph::{Graph, NodeIndex};
use crate::model::parse_url;

/// Upper bound on scheduler iterations before the simulation is considered
/// non-terminating (§4.7 constants, §7 `GRAPH_DEPTH_EXCEEDED`).
pub const MAX_SCHEDULER_ITERATIONS: u32 = 100_000;

/// CPU task durations are clamped to this many milliseconds (§4.7 constants).
pub const MAX_CPU_TASK_DURATION_MS: f64 = 10_000.0;

/// Default cap on simultaneously in-flight network requests, itself capped
/// by [`crate::tcp::TcpConnection::maximum_saturated_connections`].
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: u32 = 10;

/// Disk-cache-hit cost model: `8 + 20 * size_mb` ms, independent of RTT and
/// throughput (§4.7, boundary behaviors in §8).
const DISK_CACHE_BASE_MS: f64 = 8.0;
const DISK_CACHE_PER_MB_MS: f64 = 20.0;

/// Throttling + topology knobs driving one simulation run (§4.7).
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub rtt_ms: f64,
    pub throughput_bps: f64,
    pub max_concurrent_requests: u32,
    pub cpu_slowdown_multiplier: f64,
    pub additional_rtt_by_origin: HashMap<String, f64>,
    pub server_response_time_by_origin: HashMap<String, f64>,
}

impl SimulatorConfig {
    /// Builds a config from throttling settings, capping
    /// `max_concurrent_requests` at the bandwidth-delay product and at a
    /// minimum of 1 connection (§4.7).
    pub fn new(rtt_ms: f64, throughput_bps: f64, cpu_slowdown_multiplier: f64) -> Self {
        let saturated = crate::tcp::TcpConnection::maximum_saturated_connections(rtt_ms, throughput_bps);
        let max_concurrent_requests = DEFAULT_MAX_CONCURRENT_REQUESTS.min(saturated.max(1)).max(1);
        Self {
            rtt_ms,
            throughput_bps,
            max_concurrent_requests,
            cpu_slowdown_multiplier,
            additional_rtt_by_origin: HashMap::new(),
            server_response_time_by_origin: HashMap::new(),
        }
    }

    /// Effective CPU multiplier for tasks that performed a layout: half the
    /// ordinary slowdown (§4.7 configuration).
    pub fn layout_task_multiplier(&self) -> f64 {
        self.cpu_slowdown_multiplier * 0.5
    }

    fn rtt_for_origin(&self, origin: &str) -> f64 {
        self.rtt_ms + self.additional_rtt_by_origin.get(origin).copied().unwrap_or(0.0)
    }

    fn server_latency_for_origin(&self, origin: &str) -> f64 {
        self.server_response_time_by_origin.get(origin).copied().unwrap_or(0.0)
    }
}

/// Per-node scheduling state, mutable across the simulation loop.
#[derive(Debug, Clone, Default)]
struct NodeTiming {
    queued_time_ms: Option<f64>,
    start_time_ms: Option<f64>,
    time_elapsed_ms: f64,
    time_elapsed_overshoot_ms: f64,
    bytes_downloaded: u64,
    end_time_ms: Option<f64>,
}

/// Final per-node timing reported to callers (§6 Outputs).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTimingResult {
    pub start_time_ms: f64,
    pub end_time_ms: f64,
    pub duration_ms: f64,
}

/// Result of one `Simulator::simulate` run.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub time_in_ms: f64,
    pub node_timings: HashMap<NodeIndex, NodeTimingResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    NotReady,
    Ready,
    InProgress,
    Complete,
}

/// An insertion-ordered set of ready nodes: iteration order must match
/// insertion order (§5 ordering guarantees, §9 "deterministic iteration").
#[derive(Debug, Default)]
struct ReadyQueue {
    order: Vec<NodeIndex>,
    members: HashSet<NodeIndex>,
}

impl ReadyQueue {
    fn push(&mut self, idx: NodeIndex) {
        if self.members.insert(idx) {
            self.order.push(idx);
        }
    }

    fn remove(&mut self, idx: NodeIndex) {
        if self.members.remove(&idx) {
            self.order.retain(|&n| n != idx);
        }
    }

    fn iter(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.order.iter().copied()
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub struct Simulator<'g> {
    graph: &'g Graph,
    config: SimulatorConfig,
}

impl<'g> Simulator<'g> {
    pub fn new(graph: &'g Graph, config: SimulatorConfig) -> Self {
        Self { graph, config }
    }

    /// Runs the discrete-event scheduler to completion (§4.7 algorithm).
    #[instrument(skip_all, fields(nodes = self.graph.len()))]
    pub fn simulate(&self, flexible_ordering: bool) -> Result<SimulationResult, LanternError> {
        self.graph.assert_acyclic(Phase::Simulator)?;

        let reachable = self.graph.reachable_from_root();
        let records: Vec<_> = reachable
            .iter()
            .filter_map(|&idx| self.graph.node(idx).as_network().map(|d| d.request.clone()))
            .collect();

        let rtt_by_origin = self.origin_summaries(&records, |origin| self.config.rtt_for_origin(origin));
        let server_by_origin = self.origin_summaries(&records, |origin| self.config.server_latency_for_origin(origin));

        let mut pool = ConnectionPool::new(&records, &rtt_by_origin, &server_by_origin, self.config.rtt_ms, self.config.throughput_bps);
        let mut dns = DnsCache::new();
        // The navigation's own host resolves before the simulated clock
        // starts (§8 S1/S2: an isolated first request pays no DNS cost).
        if let Some(root_data) = self.graph.node(self.graph.root()).as_network() {
            if let Some(host) = parse_url(&root_data.request.url).map(|p| p.host) {
                dns.mark_resolved(&host, 0.0);
            }
        }

        let mut state: HashMap<NodeIndex, NodeState> = HashMap::new();
        let mut timings: HashMap<NodeIndex, NodeTiming> = HashMap::new();
        let mut handles: HashMap<NodeIndex, ConnectionHandle> = HashMap::new();
        for &idx in &reachable {
            state.insert(idx, NodeState::NotReady);
            timings.insert(idx, NodeTiming::default());
        }

        let mut ready = ReadyQueue::default();
        let mut in_progress: Vec<NodeIndex> = Vec::new();

        let root = self.graph.root();
        state.insert(root, NodeState::Ready);
        timings.get_mut(&root).unwrap().queued_time_ms = Some(0.0);
        ready.push(root);

        let mut total_elapsed_time = 0.0_f64;
        let mut flexible = flexible_ordering;
        let mut iterations: u32 = 0;

        while !ready.is_empty() || !in_progress.is_empty() {
            iterations += 1;
            if iterations > MAX_SCHEDULER_ITERATIONS {
                return Err(LanternError::GraphDepthExceeded { phase: Phase::Simulator });
            }

            let ready_now: Vec<NodeIndex> = ready.iter().collect();
            for idx in ready_now {
                if self.start_if_possible(idx, total_elapsed_time, flexible, &mut pool, &mut handles, &mut in_progress, &mut state, &mut timings) {
                    ready.remove(idx);
                }
            }

            if in_progress.is_empty() {
                if !ready.is_empty() {
                    if flexible {
                        return Err(LanternError::GraphStarved { phase: Phase::Simulator });
                    }
                    warn!("no node could be started under warm/cold matching; falling back to flexible ordering");
                    flexible = true;
                    continue;
                }
                break;
            }

            self.rebalance_throughput(&in_progress, &state, &handles, &mut pool);

            let min_time = in_progress
                .iter()
                .map(|&idx| self.estimate_time_remaining(idx, &mut dns, &handles, &pool, &timings))
                .fold(f64::INFINITY, f64::min);

            if !min_time.is_finite() {
                return Err(LanternError::GraphStarved { phase: Phase::Simulator });
            }

            total_elapsed_time += min_time;
            trace!(total_elapsed_time, min_time, in_progress = in_progress.len(), "advanced scheduler clock");

            let mut newly_complete = Vec::new();
            for &idx in &in_progress {
                let estimated_remaining = self.estimate_time_remaining(idx, &mut dns, &handles, &pool, &timings);
                let completed = self.update_progress(idx, min_time, estimated_remaining, total_elapsed_time, &mut dns, &handles, &mut pool, &mut timings);
                if completed {
                    newly_complete.push(idx);
                }
            }

            for idx in &newly_complete {
                state.insert(*idx, NodeState::Complete);
                if let Some(handle) = handles.remove(idx) {
                    let _ = handle;
                }
                if let Some(data) = self.graph.node(*idx).as_network() {
                    pool.release(&data.request);
                }
            }
            in_progress.retain(|idx| !newly_complete.contains(idx));

            for idx in &newly_complete {
                for &dependent in &self.graph.node(*idx).dependents {
                    if state.get(&dependent).copied() != Some(NodeState::NotReady) {
                        continue;
                    }
                    let all_deps_complete = self
                        .graph
                        .node(dependent)
                        .dependencies
                        .iter()
                        .all(|d| state.get(d).copied() == Some(NodeState::Complete));
                    if all_deps_complete {
                        state.insert(dependent, NodeState::Ready);
                        timings.get_mut(&dependent).unwrap().queued_time_ms = Some(total_elapsed_time);
                        ready.push(dependent);
                    }
                }
            }
        }

        let node_timings = timings
            .into_iter()
            .filter_map(|(idx, t)| {
                let start = t.start_time_ms?;
                let end = t.end_time_ms?;
                Some((idx, NodeTimingResult { start_time_ms: start, end_time_ms: end, duration_ms: end - start }))
            })
            .collect();

        Ok(SimulationResult { time_in_ms: total_elapsed_time, node_timings })
    }

    fn origin_summaries(&self, records: &[crate::model::NetworkRequest], f: impl Fn(&str) -> f64) -> HashMap<String, OriginSummary> {
        let mut origins: HashSet<String> = records.iter().map(|r| r.origin().0).collect();
        origins.insert(SUMMARY_ORIGIN.to_string());
        origins
            .into_iter()
            .map(|origin| {
                let value = f(&origin);
                (origin, OriginSummary { min: value, max: value, avg: value, median: value })
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn start_if_possible(
        &self,
        idx: NodeIndex,
        total_elapsed_time: f64,
        flexible: bool,
        pool: &mut ConnectionPool,
        handles: &mut HashMap<NodeIndex, ConnectionHandle>,
        in_progress: &mut Vec<NodeIndex>,
        state: &mut HashMap<NodeIndex, NodeState>,
        timings: &mut HashMap<NodeIndex, NodeTiming>,
    ) -> bool {
        let node = self.graph.node(idx);
        let started = if let Some(cpu) = node.as_cpu() {
            let _ = cpu;
            let cpu_in_progress = in_progress.iter().any(|&i| self.graph.node(i).is_cpu());
            !cpu_in_progress
        } else if let Some(data) = node.as_network() {
            if data.request.from_disk_cache {
                true
            } else {
                let in_progress_network_count = in_progress
                    .iter()
                    .filter(|&&i| matches!(self.graph.node(i).as_network(), Some(d) if !d.request.from_disk_cache))
                    .count() as u32;
                if in_progress_network_count >= self.config.max_concurrent_requests {
                    false
                } else if let Some(handle) = pool.acquire(&data.request, AcquireOptions { ignore_connection_reused: flexible }) {
                    handles.insert(idx, handle);
                    true
                } else {
                    false
                }
            }
        } else {
            false
        };

        if started {
            state.insert(idx, NodeState::InProgress);
            timings.get_mut(&idx).unwrap().start_time_ms = Some(total_elapsed_time);
            in_progress.push(idx);
        }
        started
    }

    fn rebalance_throughput(&self, in_progress: &[NodeIndex], _state: &HashMap<NodeIndex, NodeState>, handles: &HashMap<NodeIndex, ConnectionHandle>, pool: &mut ConnectionPool) {
        let active_handles: Vec<&ConnectionHandle> = in_progress
            .iter()
            .filter(|&&idx| matches!(self.graph.node(idx).as_network(), Some(d) if !d.request.from_disk_cache))
            .filter_map(|idx| handles.get(idx))
            .collect();
        if active_handles.is_empty() {
            return;
        }
        let share = self.config.throughput_bps / active_handles.len() as f64;
        for handle in active_handles {
            pool.get_mut(handle).set_throughput(share);
        }
    }

    fn estimate_time_remaining(&self, idx: NodeIndex, dns: &mut DnsCache, handles: &HashMap<NodeIndex, ConnectionHandle>, pool: &ConnectionPool, timings: &HashMap<NodeIndex, NodeTiming>) -> f64 {
        let timing = &timings[&idx];
        let node = self.graph.node(idx);
        if let Some(cpu) = node.as_cpu() {
            let multiplier = if cpu.did_perform_layout() { self.config.layout_task_multiplier() } else { self.config.cpu_slowdown_multiplier };
            let total_duration = ((cpu.duration_us() as f64 / 1000.0) * multiplier).round().min(MAX_CPU_TASK_DURATION_MS);
            return total_duration - timing.time_elapsed_ms;
        }

        let data = node.as_network().expect("network or cpu node");
        if data.request.from_disk_cache {
            let size_mb = data.request.transfer_size as f64 / (1024.0 * 1024.0);
            let total = DISK_CACHE_BASE_MS + DISK_CACHE_PER_MB_MS * size_mb;
            return total - timing.time_elapsed_ms;
        }

        let Some(handle) = handles.get(&idx) else { return f64::INFINITY };
        let connection = pool.get(handle);
        let host = parse_url(&data.request.url).map(|p| p.host).unwrap_or_else(|| data.request.url.clone());
        // DNS memoization is keyed to the simulated timeline, not the
        // observed trace's start_time (§4.2/§4.7: "requested_at = start_time"
        // means this node's own scheduled start within the simulation).
        let requested_at_ms = timing.start_time_ms.unwrap_or(0.0);
        let dns_resolution_time = dns.time_until_resolution(&host, connection.rtt_ms, requested_at_ms, true);

        let remaining_bytes = data.request.transfer_size.saturating_sub(timing.bytes_downloaded);
        let calc = connection.simulate_download_until(
            remaining_bytes,
            crate::tcp::DownloadOptions {
                time_already_elapsed_ms: timing.time_elapsed_ms,
                dns_resolution_time_ms: dns_resolution_time,
                maximum_time_to_elapse_ms: f64::INFINITY,
            },
        );
        calc.time_elapsed_ms + timing.time_elapsed_overshoot_ms
    }

    #[allow(clippy::too_many_arguments)]
    fn update_progress(
        &self,
        idx: NodeIndex,
        dt: f64,
        estimated_time_remaining: f64,
        total_elapsed_time: f64,
        dns: &mut DnsCache,
        handles: &HashMap<NodeIndex, ConnectionHandle>,
        pool: &mut ConnectionPool,
        timings: &mut HashMap<NodeIndex, NodeTiming>,
    ) -> bool {
        let node = self.graph.node(idx);

        if node.is_cpu() || node.as_network().map(|d| d.request.from_disk_cache).unwrap_or(false) {
            let timing = timings.get_mut(&idx).unwrap();
            if (estimated_time_remaining - dt).abs() < 1e-6 {
                timing.end_time_ms = Some(total_elapsed_time);
                true
            } else {
                timing.time_elapsed_ms += dt;
                false
            }
        } else {
            let data = node.as_network().expect("network node");
            let handle = handles[&idx].clone();
            let host = parse_url(&data.request.url).map(|p| p.host).unwrap_or_else(|| data.request.url.clone());

            let timing = timings[&idx].clone();
            let connection = pool.get(&handle);
            let requested_at_ms = timing.start_time_ms.unwrap_or(0.0);
            let dns_resolution_time = dns.time_until_resolution(&host, connection.rtt_ms, requested_at_ms, false);
            let remaining_bytes = data.request.transfer_size.saturating_sub(timing.bytes_downloaded);
            let budget = dt - timing.time_elapsed_overshoot_ms;
            let calc = connection.simulate_download_until(
                remaining_bytes,
                crate::tcp::DownloadOptions {
                    time_already_elapsed_ms: timing.time_elapsed_ms,
                    dns_resolution_time_ms: dns_resolution_time,
                    maximum_time_to_elapse_ms: budget,
                },
            );

            let connection_mut = pool.get_mut(&handle);
            connection_mut.set_congestion_window(calc.congestion_window);
            if calc.extra_bytes_downloaded > 0 {
                connection_mut.set_h2_overflow_bytes_downloaded(calc.extra_bytes_downloaded);
            }

            let new_bytes_downloaded = (timing.bytes_downloaded + calc.bytes_downloaded).min(data.request.transfer_size);
            let is_complete = new_bytes_downloaded >= data.request.transfer_size;

            let entry = timings.get_mut(&idx).unwrap();
            entry.bytes_downloaded = new_bytes_downloaded;
            if is_complete {
                pool.get_mut(&handle).set_warmed(true);
                entry.end_time_ms = Some(total_elapsed_time);
                true
            } else {
                entry.time_elapsed_ms += calc.time_elapsed_ms;
                entry.time_elapsed_overshoot_ms = calc.time_elapsed_ms - dt;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, Graph as GraphAlias};
    use crate::model::{NetworkRequestBuilder, Priority, ResourceType};

    fn unbounded_config(rtt_ms: f64) -> SimulatorConfig {
        SimulatorConfig::new(rtt_ms, f64::INFINITY, 1.0)
    }

    fn https(id: &str, transfer_size: u64) -> crate::model::NetworkRequest {
        NetworkRequestBuilder::new(id, format!("https://a.com/{id}"))
            .resource_type(ResourceType::Document)
            .priority(Priority::VeryHigh)
            .transfer_size(transfer_size)
            .start_time(0.0)
            .end_time(0.001)
            .build()
    }

    fn graph_of(records: Vec<crate::model::NetworkRequest>) -> GraphAlias {
        build_graph(&records, &[]).unwrap()
    }

    /// S1 — one cold HTTPS request, rtt=150ms, unbounded throughput,
    /// server_response=500ms: total = handshake(450) + response/ttfb leg
    /// (500+75) = 950ms.
    #[test]
    fn s1_single_request_no_cpu() {
        let record = https("1", 7_300);
        let graph = graph_of(vec![record]);
        let mut config = unbounded_config(150.0);
        config.server_response_time_by_origin.insert("https://a.com".to_string(), 500.0);
        let sim = Simulator::new(&graph, config);
        let result = sim.simulate(false).unwrap();
        assert!((result.time_in_ms - 950.0).abs() < 1e-6, "got {}", result.time_in_ms);
        let timing = result.node_timings[&graph.root()];
        assert_eq!(timing.start_time_ms, 0.0);
        assert!((timing.end_time_ms - 950.0).abs() < 1e-6);
        assert!((timing.duration_ms - 950.0).abs() < 1e-6);
    }

    /// S3 — two disk-cached requests chained A -> B each complete in 8ms.
    #[test]
    fn s3_disk_cache_chain() {
        let a = NetworkRequestBuilder::new("1", "https://a.com/1")
            .resource_type(ResourceType::Document)
            .priority(Priority::VeryHigh)
            .from_disk_cache(true)
            .transfer_size(0)
            .start_time(0.0)
            .end_time(0.001)
            .build();
        let b = NetworkRequestBuilder::new("2", "https://a.com/2")
            .resource_type(ResourceType::Script)
            .priority(Priority::High)
            .from_disk_cache(true)
            .transfer_size(0)
            .start_time(0.01)
            .end_time(0.02)
            .initiator(crate::model::Initiator::Parser { url: "https://a.com/1".to_string() })
            .build();
        let graph = graph_of(vec![a, b]);
        let config = unbounded_config(150.0);
        let sim = Simulator::new(&graph, config);
        let result = sim.simulate(false).unwrap();
        assert!((result.time_in_ms - 16.0).abs() < 1e-6, "got {}", result.time_in_ms);
    }

    #[test]
    fn s6_cycle_is_rejected() {
        use crate::graph::{NetworkNodeData, Node, NodeKind};
        let a = NetworkRequestBuilder::new("a", "https://a.com/a").build();
        let b = NetworkRequestBuilder::new("b", "https://a.com/b").build();
        let mut graph = GraphAlias::from_parts(
            vec![
                Node { id: "a".into(), kind: NodeKind::Network(NetworkNodeData { request: a, is_main_document: false }), dependencies: vec![], dependents: vec![] },
                Node { id: "b".into(), kind: NodeKind::Network(NetworkNodeData { request: b, is_main_document: false }), dependencies: vec![], dependents: vec![] },
            ],
            0,
        );
        graph.add_dependency(1, 0);
        graph.add_dependency(0, 1);
        let config = unbounded_config(150.0);
        let sim = Simulator::new(&graph, config);
        let err = sim.simulate(false).unwrap_err();
        assert_eq!(err.code(), "GRAPH_CYCLE_DETECTED");
    }

    /// S5 — CPU nodes are strictly serial regardless of graph topology.
    #[test]
    fn cpu_nodes_run_strictly_serially() {
        use crate::graph::{CpuNodeData, NetworkNodeData, Node, NodeKind};
        use crate::model::{ArgsData, TraceEvent, TracePhase};

        // root completes in 950ms, exactly like S1 (cold HTTPS, rtt=150, unbounded throughput).
        let root_request = NetworkRequestBuilder::new("root", "https://a.com/")
            .resource_type(ResourceType::Document)
            .priority(Priority::VeryHigh)
            .transfer_size(7_300)
            .start_time(0.0)
            .end_time(0.001)
            .build();

        let mut nodes = vec![Node {
            id: "root".into(),
            kind: NodeKind::Network(NetworkNodeData { request: root_request, is_main_document: true }),
            dependencies: vec![],
            dependents: vec![],
        }];

        // Multiplier is 5x: raw task durations are the target post-multiplier
        // duration divided by 5, so simulated durations land on 100/600/300ms.
        for (i, target_ms) in [100u64, 600, 300].into_iter().enumerate() {
            let raw_us = (target_ms * 1000) / 5;
            nodes.push(Node {
                id: format!("cpu{i}"),
                kind: NodeKind::Cpu(CpuNodeData {
                    event: TraceEvent { name: "Task".into(), phase: TracePhase::X, ts: 0, dur: Some(raw_us), pid: 1, tid: 1, args_data: Some(ArgsData::default()) },
                    child_events: vec![],
                }),
                dependencies: vec![],
                dependents: vec![],
            });
        }
        let mut graph = GraphAlias::from_parts(nodes, 0);
        graph.add_dependency(1, 0);
        graph.add_dependency(2, 0);
        graph.add_dependency(3, 0);

        let mut config = unbounded_config(150.0);
        config.server_response_time_by_origin.insert("https://a.com".to_string(), 500.0);
        config.cpu_slowdown_multiplier = 5.0;
        let sim = Simulator::new(&graph, config);
        let result = sim.simulate(false).unwrap();
        assert!((result.time_in_ms - 1950.0).abs() < 1e-6, "got {}", result.time_in_ms);
    }
}
