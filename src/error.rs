//! The closed error enumeration for the simulator and metric engine.
//!
//! Builder/simulator invariant violations abort the metric that triggered
//! them, not the whole computation — see [`LanternError::phase`] and the
//! propagation policy in the design notes.

use std::fmt;

/// The phase in which an error originated, carried alongside the error kind
/// so that a caller driving several metrics can tell which one failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Analyzer,
    Builder,
    Simulator,
    Metric(&'static str),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Analyzer => write!(f, "analyzer"),
            Phase::Builder => write!(f, "builder"),
            Phase::Simulator => write!(f, "simulator"),
            Phase::Metric(name) => write!(f, "metric:{name}"),
        }
    }
}

/// All error kinds the core can raise, per the error surface design.
#[derive(Debug, thiserror::Error)]
pub enum LanternError {
    #[error("[{phase}] no navigation start event found")]
    NoNavigationStart { phase: Phase },

    #[error("[{phase}] no First Contentful Paint event found")]
    NoFirstContentfulPaint { phase: Phase },

    #[error("[{phase}] no First Meaningful Paint event found")]
    NoFirstMeaningfulPaint { phase: Phase },

    #[error("[{phase}] no DOMContentLoaded event found")]
    NoDomContentLoaded { phase: Phase },

    #[error("[{phase}] no speedline frames available")]
    NoSpeedlineFrames { phase: Phase },

    #[error("[{phase}] no screenshots available")]
    NoScreenshots { phase: Phase },

    #[error("[{phase}] speedline data is invalid")]
    InvalidSpeedline { phase: Phase },

    #[error("[{phase}] no network-idle period found after FCP for TTI")]
    NoTtiNetworkIdlePeriod { phase: Phase },

    #[error("[{phase}] no CPU-idle period found after FCP for TTI")]
    NoTtiCpuIdlePeriod { phase: Phase },

    #[error("[{phase}] no main document request found")]
    NoDocumentRequest { phase: Phase },

    #[error("[{phase}] the main document request failed: {request_id}")]
    FailedDocumentRequest { phase: Phase, request_id: String },

    #[error("[{phase}] the main document request errored: {request_id}")]
    ErroredDocumentRequest { phase: Phase, request_id: String },

    #[error("[{phase}] dependency graph contains a cycle")]
    GraphCycleDetected { phase: Phase },

    #[error("[{phase}] simulation starved: no node could be started")]
    GraphStarved { phase: Phase },

    #[error("[{phase}] simulation exceeded the iteration cap")]
    GraphDepthExceeded { phase: Phase },

    #[error("[{phase}] network analyzer produced no timing information")]
    NoTimingInformation { phase: Phase },

    #[error("[{phase}] metric {metric} failed: {source}")]
    Metric {
        phase: Phase,
        metric: &'static str,
        #[source]
        source: Box<LanternError>,
    },
}

impl LanternError {
    /// The phase the error was raised in.
    pub fn phase(&self) -> &Phase {
        match self {
            LanternError::NoNavigationStart { phase }
            | LanternError::NoFirstContentfulPaint { phase }
            | LanternError::NoFirstMeaningfulPaint { phase }
            | LanternError::NoDomContentLoaded { phase }
            | LanternError::NoSpeedlineFrames { phase }
            | LanternError::NoScreenshots { phase }
            | LanternError::InvalidSpeedline { phase }
            | LanternError::NoTtiNetworkIdlePeriod { phase }
            | LanternError::NoTtiCpuIdlePeriod { phase }
            | LanternError::NoDocumentRequest { phase }
            | LanternError::FailedDocumentRequest { phase, .. }
            | LanternError::ErroredDocumentRequest { phase, .. }
            | LanternError::GraphCycleDetected { phase }
            | LanternError::GraphStarved { phase }
            | LanternError::GraphDepthExceeded { phase }
            | LanternError::NoTimingInformation { phase }
            | LanternError::Metric { phase, .. } => phase,
        }
    }

    /// The stable string code matching spec's enumerated error kinds.
    pub fn code(&self) -> &'static str {
        match self {
            LanternError::NoNavigationStart { .. } => "NO_NAVIGATION_START",
            LanternError::NoFirstContentfulPaint { .. } => "NO_FIRST_CONTENTFUL_PAINT",
            LanternError::NoFirstMeaningfulPaint { .. } => "NO_FIRST_MEANINGFUL_PAINT",
            LanternError::NoDomContentLoaded { .. } => "NO_DOM_CONTENT_LOADED",
            LanternError::NoSpeedlineFrames { .. } => "NO_SPEEDLINE_FRAMES",
            LanternError::NoScreenshots { .. } => "NO_SCREENSHOTS",
            LanternError::InvalidSpeedline { .. } => "INVALID_SPEEDLINE",
            LanternError::NoTtiNetworkIdlePeriod { .. } => "NO_TTI_NETWORK_IDLE_PERIOD",
            LanternError::NoTtiCpuIdlePeriod { .. } => "NO_TTI_CPU_IDLE_PERIOD",
            LanternError::NoDocumentRequest { .. } => "NO_DOCUMENT_REQUEST",
            LanternError::FailedDocumentRequest { .. } => "FAILED_DOCUMENT_REQUEST",
            LanternError::ErroredDocumentRequest { .. } => "ERRORED_DOCUMENT_REQUEST",
            LanternError::GraphCycleDetected { .. } => "GRAPH_CYCLE_DETECTED",
            LanternError::GraphStarved { .. } => "GRAPH_STARVED",
            LanternError::GraphDepthExceeded { .. } => "GRAPH_DEPTH_EXCEEDED",
            LanternError::NoTimingInformation { .. } => "NO_TIMING_INFORMATION",
            LanternError::Metric { .. } => "METRIC_FAILED",
        }
    }

    /// Wraps this error as a failure of a specific metric's computation.
    pub fn into_metric(self, metric: &'static str) -> LanternError {
        LanternError::Metric {
            phase: Phase::Metric(metric),
            metric,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, LanternError>;
