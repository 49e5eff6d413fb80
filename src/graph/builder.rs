//! Graph builder (C7): turns the flat observed records into the wired
//! dependency graph consumed by the simulator, per §4.6.

use std::collections::{HashMap, HashSet};

use tracing::instrument;

use crate::analyzer::find_main_document;
use crate::error::{LanternError, Phase};
use crate::model::{NetworkRequest, ResourceType, TraceEvent};

use super::node::{CpuNodeData, Graph, Node, NetworkNodeData, NodeKind};

/// CPU tasks shorter than this are not promoted to top-level CPU nodes
/// (§4.6 step 4).
const MIN_TASK_DURATION_US: u64 = 10_000;

/// Dependency-on-URL tolerance: a network node that finishes up to this many
/// microseconds *after* a CPU task starts can still be picked as its
/// predecessor (§4.6 step 5).
const DEPENDENCY_TOLERANCE_US: i64 = 100_000;

/// Builds the full dependency graph from observed records, per §4.6.
#[instrument(skip_all, fields(records = records.len(), events = main_thread_events.len()))]
pub fn build_graph(records: &[NetworkRequest], main_thread_events: &[TraceEvent]) -> Result<Graph, LanternError> {
    let records = assign_unique_ids(records);

    let mut nodes: Vec<Node> = Vec::new();
    let mut index_by_url: HashMap<String, Vec<usize>> = HashMap::new();
    let mut index_by_request_id: HashMap<String, usize> = HashMap::new();

    // Step 1: one Network node per non-video record.
    for record in &records {
        if record.resource_type == ResourceType::Media {
            continue;
        }
        let idx = nodes.len();
        index_by_url.entry(record.url.clone()).or_default().push(idx);
        index_by_request_id.insert(record.request_id.clone(), idx);
        nodes.push(Node {
            id: record.request_id.clone(),
            kind: NodeKind::Network(NetworkNodeData { request: record.clone(), is_main_document: false }),
            dependencies: Vec::new(),
            dependents: Vec::new(),
        });
    }

    if nodes.is_empty() {
        return Err(LanternError::NoDocumentRequest { phase: Phase::Builder });
    }

    // Step 2: root = earliest start_time; mark the main document.
    let root = nodes
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.start_time_us().cmp(&b.start_time_us()))
        .map(|(idx, _)| idx)
        .ok_or(LanternError::NoDocumentRequest { phase: Phase::Builder })?;

    if let Some(main_doc) = find_main_document(&records) {
        if let Some(&idx) = index_by_request_id.get(&main_doc.request_id) {
            if let Some(data) = nodes[idx].as_network_mut() {
                data.is_main_document = true;
            }
        }
    }

    let mut graph = Graph::from_parts(nodes, root);

    // Step 3: network initiator wiring.
    for idx in 0..graph.len() {
        if idx == root {
            continue;
        }
        let request = match graph.node(idx).as_network() {
            Some(data) => data.request.clone(),
            None => continue,
        };

        let candidates: Vec<usize> = if let Some(url) = request.initiator.url() {
            index_by_url.get(url).cloned().unwrap_or_default()
        } else if request.initiator_type() == "script" {
            let stack_urls = request.initiator.stack_urls();
            let mut found: HashSet<usize> = HashSet::new();
            for url in stack_urls {
                if let Some(indices) = index_by_url.get(url) {
                    found.extend(indices.iter().copied());
                }
            }
            found.into_iter().collect()
        } else {
            Vec::new()
        };

        match candidates.as_slice() {
            [] if request.initiator_type() == "other" => {
                graph.add_dependency(idx, root);
            }
            [single] => graph.add_dependency(idx, *single),
            _ => graph.add_dependency(idx, root),
        }

        // Redirect chains: every non-first redirect depends on its predecessor.
        if let Some(source_id) = &request.redirect_source {
            if let Some(&source_idx) = index_by_request_id.get(source_id) {
                graph.add_dependency(idx, source_idx);
            }
        }
    }

    // Step 4: extract CPU nodes from the main-thread event stream.
    let cpu_groups = extract_cpu_task_groups(main_thread_events);
    let mut timer_installs: HashMap<String, usize> = HashMap::new();
    let mut cpu_indices: Vec<usize> = Vec::with_capacity(cpu_groups.len());

    for (event, child_events) in cpu_groups {
        let idx = graph_push_cpu_node(&mut graph, event, child_events);
        cpu_indices.push(idx);
    }

    // Step 5: CPU wiring.
    for &cpu_idx in &cpu_indices {
        let children = graph.node(cpu_idx).as_cpu().expect("just inserted as CPU node").child_events.clone();
        let cpu_start = graph.node(cpu_idx).start_time_us();

        for child in &children {
            match child.name.as_str() {
                "TimerInstall" => {
                    if let Some(timer_id) = child.data().and_then(|d| d.timer_id.clone()) {
                        timer_installs.insert(timer_id, cpu_idx);
                    }
                    depend_on_stack_urls(&mut graph, cpu_idx, cpu_start, child, &index_by_url);
                }
                "TimerFire" => {
                    if let Some(timer_id) = child.data().and_then(|d| d.timer_id.as_deref()) {
                        if let Some(&installer) = timer_installs.get(timer_id) {
                            graph.add_dependency(cpu_idx, installer);
                        }
                    }
                }
                "InvalidateLayout" | "ScheduleStyleRecalculation" => {
                    depend_on_stack_urls(&mut graph, cpu_idx, cpu_start, child, &index_by_url);
                }
                "EvaluateScript" | "FunctionCall" | "v8.compile" => {
                    depend_on_event_url(&mut graph, cpu_idx, cpu_start, child, &index_by_url);
                    depend_on_stack_urls(&mut graph, cpu_idx, cpu_start, child, &index_by_url);
                }
                "XHRReadyStateChange" => {
                    if child.data().and_then(|d| d.ready_state) == Some(4) {
                        depend_on_event_url(&mut graph, cpu_idx, cpu_start, child, &index_by_url);
                        depend_on_stack_urls(&mut graph, cpu_idx, cpu_start, child, &index_by_url);
                    }
                }
                "ParseAuthorStyleSheet" => {
                    if let Some(url) = child.data().and_then(|d| d.style_sheet_url.as_deref()) {
                        depend_on_url(&mut graph, cpu_idx, cpu_start, url, &index_by_url);
                    }
                }
                "ResourceSendRequest" => {
                    if let Some(request_id) = child.data().and_then(|d| d.request_id.as_deref()) {
                        if let Some(&network_idx) = index_by_request_id.get(request_id) {
                            let is_xhr_after_start = graph
                                .node(network_idx)
                                .as_network()
                                .map(|n| n.request.resource_type == ResourceType::Xhr && n.request.start_time * 1_000_000.0 > cpu_start as f64)
                                .unwrap_or(false);
                            if is_xhr_after_start {
                                graph.add_dependency(network_idx, cpu_idx);
                            }
                        }
                    }
                    depend_on_stack_urls(&mut graph, cpu_idx, cpu_start, child, &index_by_url);
                }
                _ => {}
            }
        }
    }

    // Step 6: orphan CPU nodes attach to root.
    for &cpu_idx in &cpu_indices {
        if graph.node(cpu_idx).dependencies.is_empty() {
            graph.add_dependency(cpu_idx, root);
        }
    }

    // Step 7: acyclicity is mandatory.
    graph.assert_acyclic(Phase::Builder)?;

    Ok(graph)
}

fn graph_push_cpu_node(graph: &mut Graph, event: TraceEvent, child_events: Vec<TraceEvent>) -> usize {
    // Synthetic but stable: main-thread tasks have no natural id, so derive
    // one from their position in the timeline.
    let id = format!("cpu@{}", event.ts);
    let idx = graph.raw_push(Node {
        id,
        kind: NodeKind::Cpu(CpuNodeData { event, child_events }),
        dependencies: Vec::new(),
        dependents: Vec::new(),
    });
    idx
}

/// Walks `events` in `ts` order; every event with `dur >= 10ms` that is not
/// already inside an open task starts a new group, absorbing every
/// subsequent event whose `ts` falls before the task's end (§4.6 step 4).
fn extract_cpu_task_groups(events: &[TraceEvent]) -> Vec<(TraceEvent, Vec<TraceEvent>)> {
    let mut sorted: Vec<TraceEvent> = events.to_vec();
    sorted.sort_by_key(|e| e.ts);

    let mut groups = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let event = sorted[i].clone();
        if event.duration_us() >= MIN_TASK_DURATION_US {
            let task_end = event.end_ts();
            let mut children = Vec::new();
            let mut j = i + 1;
            while j < sorted.len() && sorted[j].ts < task_end {
                children.push(sorted[j].clone());
                j += 1;
            }
            groups.push((event, children));
            i = j;
        } else {
            i += 1;
        }
    }
    groups
}

/// Dependency-on-URL rule (§4.6 step 5): among network nodes with `url`,
/// ignore any that started after `cpu_start_us`; of the rest, pick the one
/// whose `cpu_start - network.end` is smallest (most-recently finished),
/// allowing up to 100ms of overlap.
fn depend_on_url(graph: &mut Graph, cpu_idx: usize, cpu_start_us: u64, url: &str, index_by_url: &HashMap<String, Vec<usize>>) {
    let Some(candidates) = index_by_url.get(url) else { return };

    let mut best: Option<(i64, usize)> = None;
    for &candidate in candidates {
        let Some(data) = graph.node(candidate).as_network() else { continue };
        let network_start_us = (data.request.start_time * 1_000_000.0).round() as i64;
        if network_start_us > cpu_start_us as i64 {
            continue;
        }
        let network_end_us = (data.request.end_time * 1_000_000.0).round() as i64;
        let diff = cpu_start_us as i64 - network_end_us;
        if diff < -DEPENDENCY_TOLERANCE_US {
            continue;
        }
        if best.map(|(best_diff, _)| diff < best_diff).unwrap_or(true) {
            best = Some((diff, candidate));
        }
    }

    if let Some((_, candidate)) = best {
        graph.add_dependency(cpu_idx, candidate);
    }
}

fn depend_on_event_url(graph: &mut Graph, cpu_idx: usize, cpu_start_us: u64, event: &TraceEvent, index_by_url: &HashMap<String, Vec<usize>>) {
    if let Some(url) = event.url() {
        depend_on_url(graph, cpu_idx, cpu_start_us, url, index_by_url);
    }
}

fn depend_on_stack_urls(graph: &mut Graph, cpu_idx: usize, cpu_start_us: u64, event: &TraceEvent, index_by_url: &HashMap<String, Vec<usize>>) {
    for url in event.stack_urls() {
        depend_on_url(graph, cpu_idx, cpu_start_us, url, index_by_url);
    }
}

/// Invariant 6: no duplicate `request_id`; collisions are suffixed
/// `:duplicate` (repeatedly, if needed) until unique, before any index is
/// built over the ids.
fn assign_unique_ids(records: &[NetworkRequest]) -> Vec<NetworkRequest> {
    let mut seen: HashSet<String> = HashSet::new();
    records
        .iter()
        .cloned()
        .map(|mut r| {
            while seen.contains(&r.request_id) {
                r.request_id.push_str(":duplicate");
            }
            seen.insert(r.request_id.clone());
            r
        })
        .collect()
}
