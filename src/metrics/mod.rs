//! Metric engine (C9): derives the six page-load metrics from the
//! dependency graph (lantern/simulated mode) or directly from the observed
//! trace (devtools/provided mode), per §4.8.

mod quiet;
mod subgraphs;

use std::collections::HashMap;

use tracing::instrument;

use crate::analyzer::{self, OriginSummary};
use crate::error::{LanternError, Phase};
use crate::graph::Graph;
#[cfg(test)]
use crate::model::Priority;
use crate::model::{NetworkRequest, TraceEvent};
use crate::settings::{Settings, ThrottlingMethod};
use crate::simulator::{SimulationResult, Simulator, SimulatorConfig};

/// A CPU task counts as "long" for TTI/observed-quiet purposes above this
/// duration (§4.8).
const LONG_TASK_THRESHOLD_MS: f64 = 50.0;
const NETWORK_QUIET_ALLOWED: i32 = 2;
const QUIET_WINDOW_MS: f64 = quiet::TTI_QUIET_WINDOW_MS;

/// Linear-combination coefficients for one metric's lantern projection
/// (§4.8 step 4).
#[derive(Debug, Clone, Copy)]
struct Coefficients {
    intercept: f64,
    optimistic: f64,
    pessimistic: f64,
}

/// `intercept * multiplier + optimistic_coef * optimistic + pessimistic_coef
/// * pessimistic`; the intercept scaling applies only when `intercept > 0`.
fn combine(coef: Coefficients, optimistic_ms: f64, pessimistic_ms: f64) -> f64 {
    let multiplier = if coef.intercept > 0.0 { (optimistic_ms / 1000.0).min(1.0) } else { 1.0 };
    coef.intercept * multiplier + coef.optimistic * optimistic_ms + coef.pessimistic * pessimistic_ms
}

/// Observed speedline (C1-adjacent input, §6 Outputs mentions speedline
/// results indirectly via Speed Index); a pre-computed visual-progress curve
/// fed in by the out-of-scope screenshot gatherer.
#[derive(Debug, Clone)]
pub struct SpeedlineResult {
    /// Frame timestamps, ms since navigation start.
    pub frames_ms: Vec<f64>,
    pub speed_index_ms: f64,
}

/// The subset of the observed trace the metric engine needs, independent of
/// the dependency graph (§4.8 "Observed (non-lantern) metrics").
#[derive(Debug, Clone)]
pub struct TraceOfTab {
    pub navigation_start_us: u64,
    pub first_contentful_paint_us: Option<u64>,
    pub first_meaningful_paint_us: Option<u64>,
    pub speedline: Option<SpeedlineResult>,
    pub main_thread_events: Vec<TraceEvent>,
}

/// One metric's full result (§6 Outputs).
#[derive(Debug, Clone)]
pub struct MetricResult {
    pub timing_ms: f64,
    pub timestamp_us: Option<u64>,
    pub optimistic_estimate_ms: Option<f64>,
    pub pessimistic_estimate_ms: Option<f64>,
    #[cfg(feature = "diagnostics")]
    pub optimistic_graph: Option<Graph>,
    #[cfg(feature = "diagnostics")]
    pub pessimistic_graph: Option<Graph>,
}

impl MetricResult {
    fn observed(timing_ms: f64, nav_start_us: u64) -> Self {
        MetricResult {
            timing_ms,
            timestamp_us: Some(nav_start_us + (timing_ms * 1000.0).round() as u64),
            optimistic_estimate_ms: None,
            pessimistic_estimate_ms: None,
            #[cfg(feature = "diagnostics")]
            optimistic_graph: None,
            #[cfg(feature = "diagnostics")]
            pessimistic_graph: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn lantern(
        timing_ms: f64,
        nav_start_us: u64,
        optimistic_ms: f64,
        pessimistic_ms: f64,
        #[cfg_attr(not(feature = "diagnostics"), allow(unused_variables))] optimistic_graph: Graph,
        #[cfg_attr(not(feature = "diagnostics"), allow(unused_variables))] pessimistic_graph: Graph,
    ) -> Self {
        MetricResult {
            timing_ms,
            timestamp_us: Some(nav_start_us + (timing_ms * 1000.0).round() as u64),
            optimistic_estimate_ms: Some(optimistic_ms),
            pessimistic_estimate_ms: Some(pessimistic_ms),
            #[cfg(feature = "diagnostics")]
            optimistic_graph: Some(optimistic_graph),
            #[cfg(feature = "diagnostics")]
            pessimistic_graph: Some(pessimistic_graph),
        }
    }
}

/// All six metrics, computed together since several depend on FCP/FMP.
#[derive(Debug, Clone)]
pub struct AllMetrics {
    pub first_contentful_paint: MetricResult,
    pub first_meaningful_paint: MetricResult,
    pub interactive: MetricResult,
    pub first_cpu_idle: MetricResult,
    pub speed_index: MetricResult,
    pub estimated_input_latency: MetricResult,
}

fn scalar_by_origin(summaries: &HashMap<String, OriginSummary>) -> HashMap<String, f64> {
    summaries.iter().map(|(origin, summary)| (origin.clone(), summary.median)).collect()
}

/// Builds the simulator config used by every lantern metric: the throttled
/// base RTT/throughput from settings, with per-origin server response times
/// taken from the network analyzer (§4.7/§4.4).
fn simulator_config(records: &[NetworkRequest], settings: &Settings) -> Result<SimulatorConfig, LanternError> {
    let analysis = analyzer::analyze(records)?;
    let (rtt_ms, throughput_bps) = match settings.throttling_method {
        ThrottlingMethod::Devtools => (settings.throttling.devtools_rtt_ms(), settings.throttling.devtools_throughput_bps()),
        _ => (settings.throttling.rtt_ms, settings.throttling.throughput_bps()),
    };
    let mut config = SimulatorConfig::new(rtt_ms, throughput_bps, settings.throttling.cpu_slowdown_multiplier);
    config.server_response_time_by_origin = scalar_by_origin(&analysis.server_response_time_by_origin);
    Ok(config)
}

/// Simulates `graph` once, mapping scheduler failures into a metric-scoped
/// error (§7 propagation policy: invariant violations abort only the
/// current metric).
fn simulate_once(graph: &Graph, config: &SimulatorConfig, metric: &'static str) -> Result<SimulationResult, LanternError> {
    Simulator::new(graph, config.clone()).simulate(false).map_err(|e| e.into_metric(metric))
}

/// The optimistic-graph convention (§4.8 step 2): simulate once normally and
/// once with flexible ordering, keep the smaller `time_in_ms`.
fn simulate_optimistic(graph: &Graph, config: &SimulatorConfig, metric: &'static str) -> Result<SimulationResult, LanternError> {
    let normal = simulate_once(graph, config, metric)?;
    let flexible = Simulator::new(graph, config.clone()).simulate(true).map_err(|e| e.into_metric(metric))?;
    Ok(if flexible.time_in_ms < normal.time_in_ms { flexible } else { normal })
}

fn cpu_intervals_from_result(graph: &Graph, result: &SimulationResult, threshold_ms: f64) -> Vec<(f64, f64)> {
    result
        .node_timings
        .iter()
        .filter(|(idx, _)| graph.node(**idx).is_cpu())
        .filter(|(_, t)| t.duration_ms > threshold_ms)
        .map(|(_, t)| (t.start_time_ms, t.end_time_ms))
        .collect()
}

fn layout_samples_from_result(graph: &Graph, result: &SimulationResult) -> Vec<(f64, f64)> {
    result
        .node_timings
        .iter()
        .filter_map(|(idx, t)| graph.node(*idx).as_cpu().filter(|c| c.did_perform_layout()).map(|_| (t.end_time_ms, t.duration_ms)))
        .collect()
}

/// First Contentful Paint (§4.8). Coefficients `{0, 0.5, 0.5}`.
#[instrument(skip_all, name = "compute_fcp")]
pub fn compute_fcp(graph: &Graph, nav_start_us: u64, fcp_timestamp_us: u64, config: &SimulatorConfig) -> Result<MetricResult, LanternError> {
    let cutoff_us = fcp_timestamp_us.saturating_sub(nav_start_us);
    let optimistic_graph = subgraphs::build_fcp_subgraph(graph, cutoff_us, false)
        .ok_or(LanternError::NoFirstContentfulPaint { phase: Phase::Metric("fcp") })?;
    let pessimistic_graph = subgraphs::build_fcp_subgraph(graph, cutoff_us, true)
        .ok_or(LanternError::NoFirstContentfulPaint { phase: Phase::Metric("fcp") })?;

    let optimistic_result = simulate_optimistic(&optimistic_graph, config, "fcp")?;
    let pessimistic_result = simulate_once(&pessimistic_graph, config, "fcp")?;
    let timing_ms = combine(Coefficients { intercept: 0.0, optimistic: 0.5, pessimistic: 0.5 }, optimistic_result.time_in_ms, pessimistic_result.time_in_ms);

    Ok(MetricResult::lantern(timing_ms, nav_start_us, optimistic_result.time_in_ms, pessimistic_result.time_in_ms, optimistic_graph, pessimistic_graph))
}

/// First Meaningful Paint (§4.8). Coefficients `{0, 0.5, 0.5}`; final timing
/// is clamped to at least FCP.
#[instrument(skip_all, name = "compute_fmp")]
pub fn compute_fmp(graph: &Graph, nav_start_us: u64, fmp_timestamp_us: u64, config: &SimulatorConfig, fcp: &MetricResult) -> Result<MetricResult, LanternError> {
    let cutoff_us = fmp_timestamp_us.saturating_sub(nav_start_us);
    let optimistic_graph = subgraphs::build_fmp_subgraph(graph, cutoff_us, false)
        .ok_or(LanternError::NoFirstMeaningfulPaint { phase: Phase::Metric("fmp") })?;
    let pessimistic_graph = subgraphs::build_fmp_subgraph(graph, cutoff_us, true)
        .ok_or(LanternError::NoFirstMeaningfulPaint { phase: Phase::Metric("fmp") })?;

    let optimistic_result = simulate_optimistic(&optimistic_graph, config, "fmp")?;
    let pessimistic_result = simulate_once(&pessimistic_graph, config, "fmp")?;
    let estimate = combine(Coefficients { intercept: 0.0, optimistic: 0.5, pessimistic: 0.5 }, optimistic_result.time_in_ms, pessimistic_result.time_in_ms);
    let timing_ms = estimate.max(fcp.timing_ms);

    Ok(MetricResult::lantern(timing_ms, nav_start_us, optimistic_result.time_in_ms, pessimistic_result.time_in_ms, optimistic_graph, pessimistic_graph))
}

/// Interactive / TTI (§4.8). Coefficients `{0, 0.5, 0.5}`; final timing is
/// clamped to at least FMP.
#[instrument(skip_all, name = "compute_tti")]
pub fn compute_tti(graph: &Graph, nav_start_us: u64, config: &SimulatorConfig, fmp: &MetricResult) -> Result<MetricResult, LanternError> {
    let optimistic_graph = subgraphs::build_tti_optimistic_subgraph(graph).ok_or(LanternError::NoTtiCpuIdlePeriod { phase: Phase::Metric("tti") })?;
    let pessimistic_graph = subgraphs::build_full_subgraph(graph).ok_or(LanternError::NoTtiCpuIdlePeriod { phase: Phase::Metric("tti") })?;

    let optimistic_result = simulate_optimistic(&optimistic_graph, config, "tti")?;
    let pessimistic_result = simulate_once(&pessimistic_graph, config, "tti")?;

    let optimistic_estimate = optimistic_result.time_in_ms.max(last_long_task_end(graph, &optimistic_result));
    let pessimistic_estimate = pessimistic_result.time_in_ms.max(last_long_task_end(graph, &pessimistic_result));
    let estimate = combine(Coefficients { intercept: 0.0, optimistic: 0.5, pessimistic: 0.5 }, optimistic_estimate, pessimistic_estimate);
    let timing_ms = estimate.max(fmp.timing_ms);

    Ok(MetricResult::lantern(timing_ms, nav_start_us, optimistic_estimate, pessimistic_estimate, optimistic_graph, pessimistic_graph))
}

fn last_long_task_end(graph: &Graph, result: &SimulationResult) -> f64 {
    cpu_intervals_from_result(graph, result, LONG_TASK_THRESHOLD_MS)
        .into_iter()
        .map(|(_, end)| end)
        .fold(0.0, f64::max)
}

/// First CPU Idle (§4.8): same graphs as TTI, but the estimate is a
/// sliding-quiet-window search from FMP rather than last-long-task-end.
#[instrument(skip_all, name = "compute_first_cpu_idle")]
pub fn compute_first_cpu_idle(graph: &Graph, nav_start_us: u64, config: &SimulatorConfig, fmp: &MetricResult) -> Result<MetricResult, LanternError> {
    let optimistic_graph = subgraphs::build_tti_optimistic_subgraph(graph).ok_or(LanternError::NoTtiCpuIdlePeriod { phase: Phase::Metric("first-cpu-idle") })?;
    let pessimistic_graph = subgraphs::build_full_subgraph(graph).ok_or(LanternError::NoTtiCpuIdlePeriod { phase: Phase::Metric("first-cpu-idle") })?;

    let optimistic_result = simulate_optimistic(&optimistic_graph, config, "first-cpu-idle")?;
    let pessimistic_result = simulate_once(&pessimistic_graph, config, "first-cpu-idle")?;

    let optimistic_estimate = quiet::earliest_quiet_start(
        &cpu_intervals_from_result(graph, &optimistic_result, LONG_TASK_THRESHOLD_MS),
        fmp.timing_ms,
        QUIET_WINDOW_MS,
        optimistic_result.time_in_ms,
    );
    let pessimistic_estimate = quiet::earliest_quiet_start(
        &cpu_intervals_from_result(graph, &pessimistic_result, LONG_TASK_THRESHOLD_MS),
        fmp.timing_ms,
        QUIET_WINDOW_MS,
        pessimistic_result.time_in_ms,
    );
    let timing_ms = combine(Coefficients { intercept: 0.0, optimistic: 0.5, pessimistic: 0.5 }, optimistic_estimate, pessimistic_estimate);

    Ok(MetricResult::lantern(timing_ms, nav_start_us, optimistic_estimate, pessimistic_estimate, optimistic_graph, pessimistic_graph))
}

/// Speed Index (§4.8). Coefficients `{-250, 1.4, 0.65}`; final timing is
/// clamped to at least FCP.
#[instrument(skip_all, name = "compute_speed_index")]
pub fn compute_speed_index(graph: &Graph, nav_start_us: u64, config: &SimulatorConfig, fcp: &MetricResult, observed_speed_index_ms: Option<f64>) -> Result<MetricResult, LanternError> {
    let optimistic_ms = observed_speed_index_ms.ok_or(LanternError::NoSpeedlineFrames { phase: Phase::Metric("speed-index") })?;

    // Pessimistic subgraph is the full graph; layout-weighted estimate comes
    // from its simulated node timings.
    let pessimistic_graph = subgraphs::build_full_subgraph(graph).ok_or(LanternError::NoFirstContentfulPaint { phase: Phase::Metric("speed-index") })?;
    let pessimistic_result = simulate_once(&pessimistic_graph, config, "speed-index")?;
    let optimistic_graph = pessimistic_graph.clone();

    let samples = layout_samples_from_result(graph, &pessimistic_result);
    let pessimistic_ms = if samples.is_empty() {
        fcp.pessimistic_estimate_ms.unwrap_or(fcp.timing_ms)
    } else {
        let weighted_sum: f64 = samples.iter().map(|&(end, dur)| end.max(fcp.timing_ms) * dur.log2().max(0.0)).sum();
        let weight_sum: f64 = samples.iter().map(|&(_, dur)| dur.log2().max(0.0)).sum();
        if weight_sum > 0.0 { weighted_sum / weight_sum } else { fcp.pessimistic_estimate_ms.unwrap_or(fcp.timing_ms) }
    };

    let estimate = combine(Coefficients { intercept: -250.0, optimistic: 1.4, pessimistic: 0.65 }, optimistic_ms, pessimistic_ms);
    let timing_ms = estimate.max(fcp.timing_ms);

    Ok(MetricResult::lantern(timing_ms, nav_start_us, optimistic_ms, pessimistic_ms, optimistic_graph, pessimistic_graph))
}

/// Estimated Input Latency (§4.8). Coefficients `{0, 0.4, 0.4}`; the cutoff
/// used for each polarity's candidate window is the *opposite* polarity's
/// FMP estimate.
#[instrument(skip_all, name = "compute_eil")]
pub fn compute_eil(graph: &Graph, nav_start_us: u64, config: &SimulatorConfig, fmp: &MetricResult) -> Result<MetricResult, LanternError> {
    let optimistic_graph = subgraphs::build_full_subgraph(graph).ok_or(LanternError::NoFirstMeaningfulPaint { phase: Phase::Metric("eil") })?;
    let pessimistic_graph = optimistic_graph.clone();

    let optimistic_result = simulate_optimistic(&optimistic_graph, config, "eil")?;
    let pessimistic_result = simulate_once(&pessimistic_graph, config, "eil")?;

    let pessimistic_cutoff = fmp.optimistic_estimate_ms.unwrap_or(fmp.timing_ms);
    let optimistic_cutoff = fmp.pessimistic_estimate_ms.unwrap_or(fmp.timing_ms);

    let all_tasks_optimistic: Vec<(f64, f64)> = optimistic_result.node_timings.iter().filter(|(idx, _)| graph.node(**idx).is_cpu()).map(|(_, t)| (t.start_time_ms, t.end_time_ms)).collect();
    let all_tasks_pessimistic: Vec<(f64, f64)> = pessimistic_result.node_timings.iter().filter(|(idx, _)| graph.node(**idx).is_cpu()).map(|(_, t)| (t.start_time_ms, t.end_time_ms)).collect();

    let optimistic_estimate = quiet::estimated_input_latency(&all_tasks_optimistic, optimistic_cutoff, optimistic_result.time_in_ms);
    let pessimistic_estimate = quiet::estimated_input_latency(&all_tasks_pessimistic, pessimistic_cutoff, pessimistic_result.time_in_ms);
    let timing_ms = combine(Coefficients { intercept: 0.0, optimistic: 0.4, pessimistic: 0.4 }, optimistic_estimate, pessimistic_estimate);

    Ok(MetricResult::lantern(timing_ms, nav_start_us, optimistic_estimate, pessimistic_estimate, optimistic_graph, pessimistic_graph))
}

/// Builds network-quiet busy intervals (ms) from observed records, ignoring
/// non-network protocols, and treating an unfinished request as busy
/// through `horizon_ms` (§4.8 "Network quiet periods").
fn observed_network_intervals_ms(records: &[NetworkRequest], horizon_ms: f64) -> Vec<(f64, f64)> {
    records
        .iter()
        .filter(|r| !r.is_non_network_protocol())
        .map(|r| {
            let start = r.start_time * 1000.0;
            let end = if r.is_finished_for_quiet_period() { r.end_time * 1000.0 } else { horizon_ms };
            (start, end.max(start))
        })
        .collect()
}

fn observed_cpu_intervals_ms(events: &[TraceEvent]) -> Vec<(f64, f64)> {
    events
        .iter()
        .filter(|e| e.duration_ms() >= LONG_TASK_THRESHOLD_MS)
        .map(|e| (e.ts as f64 / 1000.0, e.end_ts() as f64 / 1000.0))
        .collect()
}

/// Observed (non-lantern) TTI via the quiet-window overlap search (§4.8).
fn compute_tti_observed(trace: &TraceOfTab, records: &[NetworkRequest], fcp_ms: f64) -> Result<MetricResult, LanternError> {
    let horizon_ms = records
        .iter()
        .map(|r| r.end_time * 1000.0)
        .chain(trace.main_thread_events.iter().map(|e| e.end_ts() as f64 / 1000.0))
        .fold(fcp_ms, f64::max)
        + QUIET_WINDOW_MS;

    let network_periods = quiet::quiet_periods(&observed_network_intervals_ms(records, horizon_ms), NETWORK_QUIET_ALLOWED, horizon_ms);
    let cpu_periods = quiet::quiet_periods(&observed_cpu_intervals_ms(&trace.main_thread_events), 0, horizon_ms);

    if quiet::tti_candidates(&network_periods, fcp_ms).is_empty() {
        return Err(LanternError::NoTtiNetworkIdlePeriod { phase: Phase::Metric("tti") });
    }
    if quiet::tti_candidates(&cpu_periods, fcp_ms).is_empty() {
        return Err(LanternError::NoTtiCpuIdlePeriod { phase: Phase::Metric("tti") });
    }

    let tti_ms = quiet::find_tti_quiet_overlap(&network_periods, &cpu_periods, fcp_ms)
        .ok_or(LanternError::NoTtiNetworkIdlePeriod { phase: Phase::Metric("tti") })?;
    Ok(MetricResult::observed(tti_ms, trace.navigation_start_us))
}

/// Runs every metric, dispatching between lantern (simulated) and observed
/// derivations per `settings.throttling_method` (§4.8).
#[instrument(skip_all)]
pub fn compute_all(graph: &Graph, records: &[NetworkRequest], trace: &TraceOfTab, settings: &Settings) -> Result<AllMetrics, LanternError> {
    match settings.throttling_method {
        ThrottlingMethod::Simulate => compute_all_lantern(graph, records, trace, settings),
        ThrottlingMethod::Devtools | ThrottlingMethod::Provided => compute_all_observed(records, trace),
    }
}

fn compute_all_lantern(graph: &Graph, records: &[NetworkRequest], trace: &TraceOfTab, settings: &Settings) -> Result<AllMetrics, LanternError> {
    let config = simulator_config(records, settings)?;
    let nav_start = trace.navigation_start_us;

    let fcp_ts = trace.first_contentful_paint_us.ok_or(LanternError::NoFirstContentfulPaint { phase: Phase::Metric("fcp") })?;
    let fmp_ts = trace.first_meaningful_paint_us.ok_or(LanternError::NoFirstMeaningfulPaint { phase: Phase::Metric("fmp") })?;

    let first_contentful_paint = compute_fcp(graph, nav_start, fcp_ts, &config)?;
    let first_meaningful_paint = compute_fmp(graph, nav_start, fmp_ts, &config, &first_contentful_paint)?;
    let interactive = compute_tti(graph, nav_start, &config, &first_meaningful_paint)?;
    let first_cpu_idle = compute_first_cpu_idle(graph, nav_start, &config, &first_meaningful_paint)?;
    let observed_speed_index_ms = trace.speedline.as_ref().map(|s| s.speed_index_ms);
    let speed_index = compute_speed_index(graph, nav_start, &config, &first_contentful_paint, observed_speed_index_ms)?;
    let estimated_input_latency = compute_eil(graph, nav_start, &config, &first_meaningful_paint)?;

    Ok(AllMetrics { first_contentful_paint, first_meaningful_paint, interactive, first_cpu_idle, speed_index, estimated_input_latency })
}

fn compute_all_observed(records: &[NetworkRequest], trace: &TraceOfTab) -> Result<AllMetrics, LanternError> {
    let nav_start = trace.navigation_start_us;
    let fcp_ts = trace.first_contentful_paint_us.ok_or(LanternError::NoFirstContentfulPaint { phase: Phase::Metric("fcp") })?;
    let fmp_ts = trace.first_meaningful_paint_us.ok_or(LanternError::NoFirstMeaningfulPaint { phase: Phase::Metric("fmp") })?;

    let fcp_ms = fcp_ts.saturating_sub(nav_start) as f64 / 1000.0;
    let fmp_ms = (fmp_ts.saturating_sub(nav_start) as f64 / 1000.0).max(fcp_ms);

    let first_contentful_paint = MetricResult::observed(fcp_ms, nav_start);
    let first_meaningful_paint = MetricResult::observed(fmp_ms, nav_start);
    let interactive = compute_tti_observed(trace, records, fcp_ms)?;
    let first_cpu_idle = MetricResult::observed(
        quiet::earliest_quiet_start(&observed_cpu_intervals_ms(&trace.main_thread_events), fmp_ms, QUIET_WINDOW_MS, interactive.timing_ms.max(fmp_ms)),
        nav_start,
    );
    let speed_index_ms = trace
        .speedline
        .as_ref()
        .map(|s| s.speed_index_ms)
        .ok_or(LanternError::NoSpeedlineFrames { phase: Phase::Metric("speed-index") })?;
    let speed_index = MetricResult::observed(speed_index_ms.max(fcp_ms), nav_start);

    let cutoff_ms = fmp_ms;
    let horizon_ms = trace.main_thread_events.iter().map(|e| e.end_ts() as f64 / 1000.0).fold(cutoff_ms, f64::max);
    let all_tasks: Vec<(f64, f64)> = trace.main_thread_events.iter().map(|e| (e.ts as f64 / 1000.0, e.end_ts() as f64 / 1000.0)).collect();
    let eil_ms = quiet::estimated_input_latency(&all_tasks, cutoff_ms, horizon_ms);
    let estimated_input_latency = MetricResult::observed(eil_ms, nav_start);

    Ok(AllMetrics { first_contentful_paint, first_meaningful_paint, interactive, first_cpu_idle, speed_index, estimated_input_latency })
}
