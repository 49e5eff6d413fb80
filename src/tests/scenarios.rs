//! End-to-end scenarios driven entirely through the public API (§8
//! "Concrete end-to-end scenarios"), complementing the narrower unit tests
//! kept alongside each module.

use crate::graph::build_graph;
use crate::metrics::{compute_all, SpeedlineResult, TraceOfTab};
use crate::model::{NetworkRequestBuilder, Priority, ResourceType, TraceEvent, TracePhase};
use crate::settings::{Settings, ThrottlingMethod};

/// S7-shaped scenario driven through [`compute_all`] rather than the
/// private quiet-window helper directly: FCP/FMP observed at 1000ms, three
/// requests busy through 2000ms, two short CPU tasks, and nothing after —
/// every metric should resolve without error and TTI should land on the
/// network/CPU quiet overlap at 2000ms.
#[test]
fn full_metric_pass_on_an_s7_shaped_observed_trace() {
    let records: Vec<_> = (0..3)
        .map(|i| {
            let mut builder = NetworkRequestBuilder::new(i.to_string(), format!("https://a.com/{i}"))
                .priority(Priority::Medium)
                .start_time(0.0)
                .end_time(2.0)
                .finished(true);
            if i == 0 {
                builder = builder.resource_type(ResourceType::Document).priority(Priority::VeryHigh);
            } else {
                builder = builder.resource_type(ResourceType::Script);
            }
            builder.build()
        })
        .collect();

    let graph = build_graph(&records, &[]).unwrap();

    let main_thread_events = vec![
        TraceEvent { name: "Task".into(), phase: TracePhase::X, ts: 0, dur: Some(80_000), pid: 1, tid: 1, args_data: None },
        TraceEvent { name: "Task".into(), phase: TracePhase::X, ts: 600_000, dur: Some(60_000), pid: 1, tid: 1, args_data: None },
    ];

    let trace = TraceOfTab {
        navigation_start_us: 0,
        first_contentful_paint_us: Some(1_000_000),
        first_meaningful_paint_us: Some(1_000_000),
        speedline: Some(SpeedlineResult { frames_ms: vec![0.0, 500.0, 900.0], speed_index_ms: 900.0 }),
        main_thread_events,
    };

    let mut settings = Settings::default();
    settings.throttling_method = ThrottlingMethod::Provided;

    let metrics = compute_all(&graph, &records, &trace, &settings).unwrap();

    assert_eq!(metrics.first_contentful_paint.timing_ms, 1_000.0);
    assert_eq!(metrics.first_meaningful_paint.timing_ms, 1_000.0);
    assert!((metrics.interactive.timing_ms - 2_000.0).abs() < 1e-6, "got {}", metrics.interactive.timing_ms);
    assert!((metrics.first_cpu_idle.timing_ms - 1_000.0).abs() < 1e-6, "got {}", metrics.first_cpu_idle.timing_ms);
    // Speed Index is clamped to at least FCP; the observed speedline value
    // (900ms) is below FCP (1000ms) here.
    assert!((metrics.speed_index.timing_ms - 1_000.0).abs() < 1e-6, "got {}", metrics.speed_index.timing_ms);
    assert!((metrics.estimated_input_latency.timing_ms - 16.0).abs() < 1e-6, "got {}", metrics.estimated_input_latency.timing_ms);
}

/// A page load with no trace events at all degenerates to the network-only
/// schedule (§8 "With no trace events, CPU-node set is empty...").
#[test]
fn no_trace_events_yields_network_only_graph() {
    let doc = NetworkRequestBuilder::new("root", "https://a.com/")
        .resource_type(ResourceType::Document)
        .priority(Priority::VeryHigh)
        .start_time(0.0)
        .end_time(0.1)
        .build();
    let graph = build_graph(&[doc], &[]).unwrap();
    assert_eq!(graph.len(), 1);
    assert!(graph.iter().all(|(_, n)| n.is_network()));
}
