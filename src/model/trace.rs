//! The trace event record (§3): the minimal shape of one main-thread
//! Chrome-trace event, as consumed by the CPU-node extraction in the graph
//! builder.

use serde::{Deserialize, Serialize};

use super::request::StackFrame;

/// Trace event phase, per the Chrome trace event format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Duration event, begin.
    B,
    /// Duration event, end.
    E,
    /// Complete event (begin + duration in one record).
    X,
    /// Instant event.
    I,
}

/// The fields nested under `args.data` that the builder cares about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgsData {
    pub url: Option<String>,
    pub stack_trace: Option<Vec<StackFrame>>,
    pub timer_id: Option<String>,
    pub ready_state: Option<u8>,
    pub style_sheet_url: Option<String>,
    pub request_id: Option<String>,
}

/// One main-thread trace event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub name: String,
    pub phase: Phase,
    /// Microseconds since trace start.
    pub ts: u64,
    /// Microseconds, present for `X` (and closed `B`) events.
    pub dur: Option<u64>,
    pub pid: u64,
    pub tid: u64,
    #[serde(default)]
    pub args_data: Option<ArgsData>,
}

impl TraceEvent {
    pub fn end_ts(&self) -> u64 {
        self.ts + self.dur.unwrap_or(0)
    }

    pub fn duration_us(&self) -> u64 {
        self.dur.unwrap_or(0)
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_us() as f64 / 1000.0
    }

    pub fn data(&self) -> Option<&ArgsData> {
        self.args_data.as_ref()
    }

    pub fn url(&self) -> Option<&str> {
        self.data().and_then(|d| d.url.as_deref())
    }

    pub fn stack_urls(&self) -> Vec<&str> {
        self.data()
            .and_then(|d| d.stack_trace.as_ref())
            .map(|frames| frames.iter().map(|f| f.url.as_str()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_ts_adds_duration() {
        let event = TraceEvent {
            name: "Task".into(),
            phase: Phase::X,
            ts: 1_000,
            dur: Some(500),
            pid: 1,
            tid: 1,
            args_data: None,
        };
        assert_eq!(event.end_ts(), 1_500);
        assert_eq!(event.duration_ms(), 0.5);
    }
}
