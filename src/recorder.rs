//! Recorder (C1b): folds an ordered devtools protocol-message log into the
//! typed [`NetworkRequest`] list the rest of the crate consumes (§6, §9
//! "Recorder state machine").
//!
//! Modeled as a pure function over the full message slice rather than an
//! event-driven object — replay is always from a complete log, so there is
//! no reason to carry listener state across calls.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::{instrument, trace, warn};

use crate::model::{
    Initiator, NetworkRequest, NetworkRequestBuilder, Priority, RequestTiming, ResourceType,
    StackFrame,
};

/// One devtools protocol message: a method name (`"Network.*"`) plus its
/// params blob, exactly as captured off the wire (§6 Inputs).
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolMessage {
    pub method: String,
    pub params: Value,
}

/// Builds the typed request list from a devtools log (§6, §9).
///
/// Unrecognized methods are ignored; messages missing the fields this
/// function depends on are skipped with a `warn!` rather than aborting the
/// whole replay, since a single malformed message should not lose every
/// other request in the log.
#[instrument(skip_all, fields(messages = log.len()))]
pub fn requests_from_devtools_log(log: &[ProtocolMessage]) -> Vec<NetworkRequest> {
    let mut pending: HashMap<String, NetworkRequest> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for message in log {
        match message.method.as_str() {
            "Network.requestWillBeSent" => handle_request_will_be_sent(message, &mut pending, &mut order),
            "Network.requestServedFromCache" => handle_served_from_cache(message, &mut pending),
            "Network.responseReceived" => handle_response_received(message, &mut pending),
            "Network.dataReceived" => handle_data_received(message, &mut pending),
            "Network.loadingFinished" => handle_loading_finished(message, &mut pending),
            "Network.loadingFailed" => handle_loading_failed(message, &mut pending),
            "Network.resourceChangedPriority" => handle_priority_changed(message, &mut pending),
            _ => {}
        }
    }

    order.into_iter().filter_map(|id| pending.remove(&id)).collect()
}

fn param_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn param_f64(params: &Value, key: &str) -> Option<f64> {
    params.get(key).and_then(Value::as_f64)
}

fn param_u64(params: &Value, key: &str) -> Option<u64> {
    params.get(key).and_then(Value::as_u64)
}

fn resource_type_from_str(s: &str) -> ResourceType {
    match s {
        "Document" => ResourceType::Document,
        "Script" => ResourceType::Script,
        "Stylesheet" => ResourceType::Stylesheet,
        "Image" => ResourceType::Image,
        "Font" => ResourceType::Font,
        "XHR" => ResourceType::Xhr,
        "Fetch" => ResourceType::Fetch,
        "Media" => ResourceType::Media,
        "WebSocket" => ResourceType::WebSocket,
        "Manifest" => ResourceType::Manifest,
        _ => ResourceType::Other,
    }
}

fn priority_from_str(s: &str) -> Priority {
    match s {
        "VeryLow" => Priority::VeryLow,
        "Low" => Priority::Low,
        "High" => Priority::High,
        "VeryHigh" => Priority::VeryHigh,
        _ => Priority::Medium,
    }
}

fn initiator_from_params(params: &Value) -> Initiator {
    let Some(initiator) = params.get("initiator") else { return Initiator::Other };
    match initiator.get("type").and_then(Value::as_str) {
        Some("parser") => match initiator.get("url").and_then(Value::as_str) {
            Some(url) => Initiator::Parser { url: url.to_string() },
            None => Initiator::Other,
        },
        Some("script") => {
            let stack = initiator
                .get("stack")
                .and_then(|s| s.get("callFrames"))
                .and_then(Value::as_array)
                .map(|frames| {
                    frames
                        .iter()
                        .filter_map(|f| f.get("url").and_then(Value::as_str).map(String::from))
                        .map(|url| StackFrame { url })
                        .collect()
                })
                .unwrap_or_default();
            Initiator::Script { stack }
        }
        _ => Initiator::Other,
    }
}

/// Mints a fresh, never-previously-seen id for `base`: suffixing
/// `:duplicate` repeatedly, before the id is ever used as a map key (§9
/// Open Question: uniqueness is resolved before any cross-id index exists).
fn unique_id(base: String, pending: &HashMap<String, NetworkRequest>, order: &[String]) -> String {
    let mut candidate = base;
    while pending.contains_key(&candidate) || order.contains(&candidate) {
        candidate.push_str(":duplicate");
    }
    candidate
}

fn handle_request_will_be_sent(message: &ProtocolMessage, pending: &mut HashMap<String, NetworkRequest>, order: &mut Vec<String>) {
    let params = &message.params;
    let Some(request_id) = param_str(params, "requestId") else {
        warn!("requestWillBeSent missing requestId");
        return;
    };
    let Some(url) = params.get("request").and_then(|r| r.get("url")).and_then(Value::as_str) else {
        warn!(request_id, "requestWillBeSent missing request.url");
        return;
    };
    let start_time = param_f64(params, "timestamp").unwrap_or(0.0);
    let document_url = param_str(params, "documentURL").unwrap_or(url).to_string();
    let resource_type = param_str(params, "type").map(resource_type_from_str).unwrap_or(ResourceType::Other);
    let initiator = initiator_from_params(params);

    // A redirect: the previous record (still open under `request_id`)
    // completes now and gains a new successor under `{request_id}:redirect`.
    if let Some(redirect_response) = params.get("redirectResponse") {
        if let Some(previous) = pending.get_mut(request_id) {
            previous.end_time = start_time;
            previous.finished = true;
            previous.status_code = redirect_response.get("status").and_then(Value::as_u64).unwrap_or(0) as u16;
            previous.protocol = redirect_response.get("protocol").and_then(Value::as_str).unwrap_or(&previous.protocol).to_string();
        }
        let new_id = format!("{request_id}:redirect");
        let new_id = unique_id(new_id, pending, order);
        if let Some(previous) = pending.get_mut(request_id) {
            previous.redirect_destination = Some(new_id.clone());
        }

        let mut record = NetworkRequestBuilder::new(new_id.clone(), url)
            .resource_type(resource_type)
            .priority(Priority::Medium)
            .start_time(start_time)
            .document_url(document_url)
            .initiator(initiator)
            .redirect_source(request_id.to_string())
            .build();
        record.finished = false;
        trace!(request_id = %new_id, url, "recorded redirect hop");
        pending.insert(new_id.clone(), record);
        order.push(new_id);
        return;
    }

    let id = unique_id(request_id.to_string(), pending, order);
    let mut record = NetworkRequestBuilder::new(id.clone(), url)
        .resource_type(resource_type)
        .priority(Priority::Medium)
        .start_time(start_time)
        .document_url(document_url)
        .initiator(initiator)
        .build();
    record.finished = false;
    trace!(request_id = %id, url, "recorded requestWillBeSent");
    pending.insert(id.clone(), record);
    order.push(id);
}

fn handle_served_from_cache(message: &ProtocolMessage, pending: &mut HashMap<String, NetworkRequest>) {
    let Some(request_id) = param_str(&message.params, "requestId") else { return };
    if let Some(record) = pending.get_mut(request_id) {
        record.from_disk_cache = true;
    }
}

fn handle_response_received(message: &ProtocolMessage, pending: &mut HashMap<String, NetworkRequest>) {
    let params = &message.params;
    let Some(request_id) = param_str(params, "requestId") else { return };
    let Some(record) = pending.get_mut(request_id) else { return };
    let Some(response) = params.get("response") else { return };

    record.status_code = response.get("status").and_then(Value::as_u64).unwrap_or(0) as u16;
    if let Some(protocol) = response.get("protocol").and_then(Value::as_str) {
        record.protocol = protocol.to_string();
    }
    if let Some(connection_id) = response.get("connectionId") {
        record.connection_id = connection_id
            .as_str()
            .map(String::from)
            .or_else(|| connection_id.as_u64().map(|n| n.to_string()))
            .unwrap_or_else(|| record.connection_id.clone());
    }
    record.connection_reused = response.get("connectionReused").and_then(Value::as_bool).unwrap_or(false);
    record.from_disk_cache = record.from_disk_cache || response.get("fromDiskCache").and_then(Value::as_bool).unwrap_or(false);

    if let Some(timing) = response.get("timing") {
        record.timing = Some(RequestTiming {
            dns_start: timing.get("dnsStart").and_then(Value::as_f64),
            dns_end: timing.get("dnsEnd").and_then(Value::as_f64),
            connect_start: timing.get("connectStart").and_then(Value::as_f64),
            connect_end: timing.get("connectEnd").and_then(Value::as_f64),
            ssl_start: timing.get("sslStart").and_then(Value::as_f64),
            ssl_end: timing.get("sslEnd").and_then(Value::as_f64),
            send_start: timing.get("sendStart").and_then(Value::as_f64),
            send_end: timing.get("sendEnd").and_then(Value::as_f64),
            receive_headers_end: timing.get("receiveHeadersEnd").and_then(Value::as_f64),
        });
    }
}

fn handle_data_received(message: &ProtocolMessage, pending: &mut HashMap<String, NetworkRequest>) {
    let params = &message.params;
    let Some(request_id) = param_str(params, "requestId") else { return };
    let Some(record) = pending.get_mut(request_id) else { return };
    record.transfer_size += param_u64(params, "encodedDataLength").unwrap_or(0);
    record.resource_size += param_u64(params, "dataLength").unwrap_or(0);
}

fn handle_loading_finished(message: &ProtocolMessage, pending: &mut HashMap<String, NetworkRequest>) {
    let params = &message.params;
    let Some(request_id) = param_str(params, "requestId") else { return };
    let Some(record) = pending.get_mut(request_id) else { return };
    record.end_time = param_f64(params, "timestamp").unwrap_or(record.end_time);
    if let Some(size) = param_u64(params, "encodedDataLength") {
        record.transfer_size = record.transfer_size.max(size);
    }
    record.finished = true;
}

fn handle_loading_failed(message: &ProtocolMessage, pending: &mut HashMap<String, NetworkRequest>) {
    let params = &message.params;
    let Some(request_id) = param_str(params, "requestId") else { return };
    let Some(record) = pending.get_mut(request_id) else { return };
    record.end_time = param_f64(params, "timestamp").unwrap_or(record.end_time);
    record.failed = true;
    record.finished = true;
}

fn handle_priority_changed(message: &ProtocolMessage, pending: &mut HashMap<String, NetworkRequest>) {
    let params = &message.params;
    let Some(request_id) = param_str(params, "requestId") else { return };
    let Some(record) = pending.get_mut(request_id) else { return };
    if let Some(priority) = param_str(params, "newPriority") {
        record.priority = priority_from_str(priority);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(method: &str, params: Value) -> ProtocolMessage {
        ProtocolMessage { method: method.to_string(), params }
    }

    #[test]
    fn single_request_round_trips_core_fields() {
        let log = vec![
            message(
                "Network.requestWillBeSent",
                json!({
                    "requestId": "1",
                    "timestamp": 0.0,
                    "documentURL": "https://a.com/",
                    "type": "Document",
                    "request": {"url": "https://a.com/"},
                }),
            ),
            message(
                "Network.responseReceived",
                json!({
                    "requestId": "1",
                    "response": {"status": 200, "protocol": "h2", "connectionId": 5, "connectionReused": false},
                }),
            ),
            message("Network.loadingFinished", json!({"requestId": "1", "timestamp": 0.1, "encodedDataLength": 1500})),
        ];

        let records = requests_from_devtools_log(&log);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://a.com/");
        assert_eq!(records[0].protocol, "h2");
        assert_eq!(records[0].status_code, 200);
        assert!(records[0].finished);
        assert_eq!(records[0].transfer_size, 1500);
    }

    #[test]
    fn redirect_chain_links_source_and_destination() {
        let log = vec![
            message(
                "Network.requestWillBeSent",
                json!({"requestId": "1", "timestamp": 0.0, "documentURL": "https://a.com/old", "type": "Document", "request": {"url": "https://a.com/old"}}),
            ),
            message(
                "Network.requestWillBeSent",
                json!({
                    "requestId": "1",
                    "timestamp": 0.05,
                    "documentURL": "https://a.com/new",
                    "type": "Document",
                    "request": {"url": "https://a.com/new"},
                    "redirectResponse": {"status": 302, "protocol": "h2"},
                }),
            ),
            message("Network.loadingFinished", json!({"requestId": "1:redirect", "timestamp": 0.1, "encodedDataLength": 500})),
        ];

        let records = requests_from_devtools_log(&log);
        assert_eq!(records.len(), 2);
        let original = records.iter().find(|r| r.request_id == "1").unwrap();
        let redirected = records.iter().find(|r| r.request_id == "1:redirect").unwrap();
        assert_eq!(original.redirect_destination.as_deref(), Some("1:redirect"));
        assert_eq!(redirected.redirect_source.as_deref(), Some("1"));
        assert!(original.finished);
        assert_eq!(original.status_code, 302);
    }

    #[test]
    fn served_from_cache_sets_flag() {
        let log = vec![
            message(
                "Network.requestWillBeSent",
                json!({"requestId": "1", "timestamp": 0.0, "documentURL": "https://a.com/", "type": "Script", "request": {"url": "https://a.com/x.js"}}),
            ),
            message("Network.requestServedFromCache", json!({"requestId": "1"})),
            message("Network.loadingFinished", json!({"requestId": "1", "timestamp": 0.01})),
        ];
        let records = requests_from_devtools_log(&log);
        assert!(records[0].from_disk_cache);
    }

    #[test]
    fn reused_request_id_after_completion_gets_suffixed() {
        let log = vec![
            message(
                "Network.requestWillBeSent",
                json!({"requestId": "1", "timestamp": 0.0, "documentURL": "https://a.com/", "type": "Document", "request": {"url": "https://a.com/"}}),
            ),
            message("Network.loadingFinished", json!({"requestId": "1", "timestamp": 0.1})),
            message(
                "Network.requestWillBeSent",
                json!({"requestId": "1", "timestamp": 0.2, "documentURL": "https://a.com/", "type": "Script", "request": {"url": "https://a.com/y.js"}}),
            ),
        ];
        let records = requests_from_devtools_log(&log);
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.request_id == "1:duplicate"));
    }

    #[test]
    fn unrecognized_method_is_ignored() {
        let log = vec![message("Network.getCookies", json!({}))];
        let records = requests_from_devtools_log(&log);
        assert!(records.is_empty());
    }
}
