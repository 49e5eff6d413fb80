//! Subgraph predicate builders shared by the metric derivations (§4.8): each
//! metric simulates an *optimistic* and a *pessimistic* view of the same
//! graph rather than the graph itself.

use std::collections::HashSet;

use crate::graph::{Graph, Node};

/// TTI's optimistic CPU inclusion threshold (§4.8): `event.dur > 20 ms`.
const TTI_CPU_INCLUSION_THRESHOLD_MS: f64 = 20.0;

/// Collects the URLs of every script-initiated network node reachable in
/// `graph`, for `CpuNodeData::is_evaluate_script_for` matching.
fn script_initiated_urls(graph: &Graph) -> HashSet<String> {
    graph
        .iter()
        .filter_map(|(_, node)| node.as_network())
        .filter(|data| matches!(data.request.initiator, crate::model::Initiator::Script { .. }))
        .map(|data| data.request.url.clone())
        .collect()
}

/// True for a network node that is not script-initiated and ends at or
/// before `cutoff_us`, and has render-blocking priority.
fn is_render_blocking_before(node: &Node, cutoff_us: u64, include_script_initiated: bool) -> bool {
    let Some(data) = node.as_network() else { return false };
    if !data.request.has_render_blocking_priority() {
        return false;
    }
    if node.end_time_us() > cutoff_us {
        return false;
    }
    if !include_script_initiated && matches!(data.request.initiator, crate::model::Initiator::Script { .. }) {
        return false;
    }
    true
}

/// Builds the FCP subgraph (§4.8): render-blocking network requests ending
/// by `fcp_us` (script-initiated ones too, when `include_script_initiated`),
/// plus the CPU tasks that evaluated those requests' scripts, plus the main
/// document (preserved past FCP so later dependents still resolve).
pub fn build_fcp_subgraph(graph: &Graph, fcp_us: u64, include_script_initiated: bool) -> Option<Graph> {
    let owned_script_urls = script_initiated_urls(graph);
    let url_refs: HashSet<&str> = owned_script_urls.iter().map(|s| s.as_str()).collect();

    graph.clone_with_relationships(|node| {
        if let Some(data) = node.as_network() {
            if data.is_main_document {
                return true;
            }
            return is_render_blocking_before(node, fcp_us, include_script_initiated);
        }
        if let Some(cpu) = node.as_cpu() {
            return cpu.is_evaluate_script_for(&url_refs);
        }
        false
    })
}

/// Builds the FMP subgraph (§4.8): same as FCP, plus CPU tasks that
/// performed a Layout by `fmp_us`.
pub fn build_fmp_subgraph(graph: &Graph, fmp_us: u64, include_script_initiated: bool) -> Option<Graph> {
    let owned_script_urls = script_initiated_urls(graph);
    let url_refs: HashSet<&str> = owned_script_urls.iter().map(|s| s.as_str()).collect();

    graph.clone_with_relationships(|node| {
        if let Some(data) = node.as_network() {
            if data.is_main_document {
                return true;
            }
            return is_render_blocking_before(node, fmp_us, include_script_initiated);
        }
        if let Some(cpu) = node.as_cpu() {
            if node.end_time_us() > fmp_us {
                return false;
            }
            return cpu.is_evaluate_script_for(&url_refs) || cpu.did_perform_layout();
        }
        false
    })
}

/// TTI's optimistic subgraph (§4.8): CPU nodes whose task ran longer than
/// 20ms, and non-image network nodes that are scripts or High/VeryHigh
/// priority.
pub fn build_tti_optimistic_subgraph(graph: &Graph) -> Option<Graph> {
    graph.clone_with_relationships(|node| {
        if let Some(cpu) = node.as_cpu() {
            return (cpu.duration_us() as f64 / 1_000.0) > TTI_CPU_INCLUSION_THRESHOLD_MS;
        }
        if let Some(data) = node.as_network() {
            if data.request.resource_type == crate::model::ResourceType::Image {
                return false;
            }
            return data.request.resource_type == crate::model::ResourceType::Script
                || matches!(data.request.priority, crate::model::Priority::High | crate::model::Priority::VeryHigh);
        }
        false
    })
}

/// TTI's pessimistic subgraph (§4.8) is the full graph.
pub fn build_full_subgraph(graph: &Graph) -> Option<Graph> {
    graph.clone_with_relationships(|_| true)
}
