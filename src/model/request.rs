//! The network request record (§3) and its derived fields.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{parse_url, Origin};

/// Resource type as reported by the network stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Document,
    Script,
    Stylesheet,
    Image,
    Font,
    #[serde(rename = "XHR")]
    Xhr,
    Fetch,
    Media,
    WebSocket,
    Manifest,
    Other,
}

/// Network priority, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

/// One stack frame of a script-initiated request's call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub url: String,
}

/// What caused a request to be made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Initiator {
    #[serde(rename = "other")]
    Other,
    #[serde(rename = "parser")]
    Parser { url: String },
    #[serde(rename = "script")]
    Script { stack: Vec<StackFrame> },
}

impl Initiator {
    /// The initiating URL, when there is exactly one unambiguous one.
    pub fn url(&self) -> Option<&str> {
        match self {
            Initiator::Parser { url } => Some(url),
            _ => None,
        }
    }

    /// All URLs named anywhere in a script initiator's call stack.
    pub fn stack_urls(&self) -> HashSet<&str> {
        match self {
            Initiator::Script { stack } => stack.iter().map(|f| f.url.as_str()).collect(),
            _ => HashSet::new(),
        }
    }
}

/// Connection/resource timing phases, in milliseconds relative to the
/// request's `start_time`, as reported by the network stack. A phase of `-1`
/// (or absence) means "not applicable", mirrored here as `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestTiming {
    pub dns_start: Option<f64>,
    pub dns_end: Option<f64>,
    pub connect_start: Option<f64>,
    pub connect_end: Option<f64>,
    pub ssl_start: Option<f64>,
    pub ssl_end: Option<f64>,
    pub send_start: Option<f64>,
    pub send_end: Option<f64>,
    pub receive_headers_end: Option<f64>,
}

/// One observed network request (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRequest {
    pub request_id: String,
    pub url: String,
    pub resource_type: ResourceType,
    pub priority: Priority,
    /// Seconds since the start of navigation.
    pub start_time: f64,
    /// Seconds since the start of navigation.
    pub end_time: f64,
    pub transfer_size: u64,
    pub resource_size: u64,
    pub status_code: u16,
    pub finished: bool,
    pub failed: bool,
    pub from_disk_cache: bool,
    /// e.g. `"h2"`, `"http/1.1"`, `"quic"`.
    pub protocol: String,
    pub connection_id: String,
    pub connection_reused: bool,
    pub timing: Option<RequestTiming>,
    pub initiator: Initiator,
    pub redirect_source: Option<String>,
    pub redirect_destination: Option<String>,
    pub document_url: String,
}

impl NetworkRequest {
    pub fn origin(&self) -> Origin {
        Origin::from_url(&self.url)
    }

    pub fn is_secure(&self) -> bool {
        parse_url(&self.url)
            .map(|p| matches!(p.scheme.as_str(), "https" | "wss"))
            .unwrap_or(false)
    }

    pub fn is_h2(&self) -> bool {
        self.protocol == "h2"
    }

    /// `has_render_blocking_priority` — VeryHigh, or High+Script, or
    /// High+Document (§3).
    pub fn has_render_blocking_priority(&self) -> bool {
        self.priority == Priority::VeryHigh
            || (self.priority == Priority::High
                && matches!(self.resource_type, ResourceType::Script | ResourceType::Document))
    }

    pub fn initiator_type(&self) -> &'static str {
        match &self.initiator {
            Initiator::Other => "other",
            Initiator::Parser { .. } => "parser",
            Initiator::Script { .. } => "script",
        }
    }

    /// True for schemes the network-quiet sweep line ignores entirely.
    pub fn is_non_network_protocol(&self) -> bool {
        self.url.starts_with("data:") || self.url.starts_with("ws:") || self.url.starts_with("wss:")
    }

    /// Treats QUIC-with-headers and frame-root-with-response as finished
    /// even if the `finished` flag was never flipped (§4.8 quiet periods).
    pub fn is_finished_for_quiet_period(&self) -> bool {
        if self.finished {
            return true;
        }
        if self.protocol == "quic" && self.timing.and_then(|t| t.receive_headers_end).is_some() {
            return true;
        }
        if self.resource_type == ResourceType::Document && self.status_code > 0 {
            return true;
        }
        false
    }
}

/// Builder used by the recorder and by tests to assemble a
/// [`NetworkRequest`] without naming every field at each call site.
#[derive(Debug, Clone)]
pub struct NetworkRequestBuilder {
    inner: NetworkRequest,
}

impl NetworkRequestBuilder {
    pub fn new(request_id: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            inner: NetworkRequest {
                request_id: request_id.into(),
                document_url: url.clone(),
                url,
                resource_type: ResourceType::Other,
                priority: Priority::Medium,
                start_time: 0.0,
                end_time: 0.0,
                transfer_size: 0,
                resource_size: 0,
                status_code: 200,
                finished: true,
                failed: false,
                from_disk_cache: false,
                protocol: "http/1.1".to_string(),
                connection_id: "0".to_string(),
                connection_reused: false,
                timing: None,
                initiator: Initiator::Other,
                redirect_source: None,
                redirect_destination: None,
            },
        }
    }

    pub fn resource_type(mut self, v: ResourceType) -> Self {
        self.inner.resource_type = v;
        self
    }
    pub fn priority(mut self, v: Priority) -> Self {
        self.inner.priority = v;
        self
    }
    pub fn start_time(mut self, v: f64) -> Self {
        self.inner.start_time = v;
        self
    }
    pub fn end_time(mut self, v: f64) -> Self {
        self.inner.end_time = v;
        self
    }
    pub fn transfer_size(mut self, v: u64) -> Self {
        self.inner.transfer_size = v;
        self
    }
    pub fn resource_size(mut self, v: u64) -> Self {
        self.inner.resource_size = v;
        self
    }
    pub fn status_code(mut self, v: u16) -> Self {
        self.inner.status_code = v;
        self
    }
    pub fn finished(mut self, v: bool) -> Self {
        self.inner.finished = v;
        self
    }
    pub fn failed(mut self, v: bool) -> Self {
        self.inner.failed = v;
        self
    }
    pub fn from_disk_cache(mut self, v: bool) -> Self {
        self.inner.from_disk_cache = v;
        self
    }
    pub fn protocol(mut self, v: impl Into<String>) -> Self {
        self.inner.protocol = v.into();
        self
    }
    pub fn connection_id(mut self, v: impl Into<String>) -> Self {
        self.inner.connection_id = v.into();
        self
    }
    pub fn connection_reused(mut self, v: bool) -> Self {
        self.inner.connection_reused = v;
        self
    }
    pub fn timing(mut self, v: RequestTiming) -> Self {
        self.inner.timing = Some(v);
        self
    }
    pub fn initiator(mut self, v: Initiator) -> Self {
        self.inner.initiator = v;
        self
    }
    pub fn redirect_source(mut self, v: impl Into<String>) -> Self {
        self.inner.redirect_source = Some(v.into());
        self
    }
    pub fn redirect_destination(mut self, v: impl Into<String>) -> Self {
        self.inner.redirect_destination = Some(v.into());
        self
    }
    pub fn document_url(mut self, v: impl Into<String>) -> Self {
        self.inner.document_url = v.into();
        self
    }

    pub fn build(self) -> NetworkRequest {
        self.inner
    }
}
