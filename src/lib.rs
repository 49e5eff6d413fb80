//! Lantern: a page-load performance simulator and metrics engine.
//!
//! Given observed network request records and main-thread trace events from
//! a single browser page load, this crate builds a dependency graph of
//! network and CPU work (`graph`), estimates per-origin network conditions
//! from the observations (`analyzer`), simulates the graph under throttled
//! network/CPU conditions with a discrete-event scheduler (`simulator`,
//! `tcp`, `dns`, `connection_pool`), and derives First Contentful Paint,
//! First Meaningful Paint, Time to Interactive, First CPU Idle, Speed Index,
//! and Estimated Input Latency from the simulated timings (`metrics`).
//!
//! The browser driver, gatherers, audit catalog, and report rendering that
//! normally surround this core are out of scope: callers hand in typed
//! records and get typed metric results back.

pub mod analyzer;
pub mod connection_pool;
pub mod dns;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod model;
pub mod recorder;
pub mod settings;
pub mod simulator;
pub mod tcp;

/// The handful of types most callers embedding this crate need.
pub mod prelude {
    pub use crate::error::{LanternError, Phase, Result};
    pub use crate::graph::{build_graph, Graph, Node, NodeIndex};
    pub use crate::metrics::{compute_all, AllMetrics, MetricResult, SpeedlineResult, TraceOfTab};
    pub use crate::model::{NetworkRequest, Priority, ResourceType, TraceEvent};
    pub use crate::settings::{Settings, ThrottlingConfig, ThrottlingMethod};
    pub use crate::simulator::{SimulationResult, Simulator, SimulatorConfig};
}

#[cfg(test)]
mod tests;
