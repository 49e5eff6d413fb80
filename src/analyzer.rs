//! Network analyzer (C5): estimates per-origin RTT and server response time
//! from observed records, classifies connection reuse, and locates the main
//! document request.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::error::{LanternError, Phase};
use crate::model::{NetworkRequest, Origin, ResourceType};

/// Bucket key used for the cross-origin rollup.
pub const SUMMARY_ORIGIN: &str = "__SUMMARY__";

/// Size, in bytes, of the initial TCP congestion window used as the
/// download-timing RTT estimator's threshold and log-base.
pub const INITIAL_CWD_BYTES: u64 = 14 * 1024;

/// Coarse estimates (SendStart, TTFB) are deflated by this factor.
const COARSE_ESTIMATE_MULTIPLIER: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OriginSummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub median: f64,
}

impl OriginSummary {
    fn from_samples(samples: &[f64]) -> Self {
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        let median = if count % 2 == 0 {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        } else {
            sorted[count / 2]
        };
        OriginSummary {
            min: sorted[0],
            max: sorted[count - 1],
            avg: sum / count as f64,
            median,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkAnalysis {
    pub rtt_by_origin: HashMap<String, OriginSummary>,
    pub server_response_time_by_origin: HashMap<String, OriginSummary>,
    pub connection_reused: HashMap<String, bool>,
    pub rtt_ms: f64,
    pub throughput_bps: f64,
}

/// Whether observed `connection_id`/`connection_reused` pairs can be trusted
/// as-is (every connection id was fresh at least once, and there are at
/// least two distinct ids).
fn should_trust_observed_reuse(records: &[NetworkRequest]) -> bool {
    let mut ids: HashSet<&str> = HashSet::new();
    let mut fresh_ids: HashSet<&str> = HashSet::new();
    for r in records {
        ids.insert(r.connection_id.as_str());
        if !r.connection_reused {
            fresh_ids.insert(r.connection_id.as_str());
        }
    }
    ids.len() >= 2 && ids.iter().all(|id| fresh_ids.contains(id))
}

/// Classifies every record as connection-reused or not (§4.4).
pub fn classify_connection_reuse(records: &[NetworkRequest]) -> HashMap<String, bool> {
    if should_trust_observed_reuse(records) {
        trace!("trusting observed connection_reused flags");
        return records
            .iter()
            .map(|r| (r.request_id.clone(), r.connection_reused))
            .collect();
    }

    debug!("inferring connection reuse: observed connection ids are inconsistent");
    infer_connection_reuse(records)
}

/// The coarse inference rule: first request per origin is fresh; later ones
/// are reused if the origin had an earlier finishing request, or if the
/// protocol is h2. Used directly by the connection pool, which always wants
/// the coarse classification regardless of whether observed ids could be
/// trusted (`force_coarse` in §4.3).
pub fn infer_connection_reuse(records: &[NetworkRequest]) -> HashMap<String, bool> {
    let mut sorted: Vec<&NetworkRequest> = records.iter().collect();
    sorted.sort_by(|a, b| a.start_time.partial_cmp(&b.start_time).unwrap());

    let mut seen_origin: HashSet<Origin> = HashSet::new();
    let mut result = HashMap::new();
    for r in &sorted {
        let origin = r.origin();
        if seen_origin.insert(origin.clone()) {
            result.insert(r.request_id.clone(), false);
            continue;
        }
        let had_earlier_finish = sorted.iter().any(|o| {
            o.request_id != r.request_id && o.origin() == origin && o.end_time <= r.start_time
        });
        result.insert(r.request_id.clone(), had_earlier_finish || r.is_h2());
    }
    result
}

fn collect_tcp_timing_samples(records: &[NetworkRequest], reused: &HashMap<String, bool>) -> HashMap<Origin, Vec<f64>> {
    let mut samples: HashMap<Origin, Vec<f64>> = HashMap::new();
    for r in records {
        if reused.get(&r.request_id).copied().unwrap_or(r.connection_reused) {
            continue;
        }
        let Some(timing) = r.timing else { continue };
        let (Some(connect_start), Some(connect_end)) = (timing.connect_start, timing.connect_end) else {
            continue;
        };
        let origin = r.origin();
        samples.entry(origin.clone()).or_default().push(connect_end - connect_start);
        if let (Some(ssl_start), Some(ssl_end)) = (timing.ssl_start, timing.ssl_end) {
            samples.entry(origin.clone()).or_default().push(connect_end - ssl_start);
            samples.entry(origin).or_default().push(ssl_start - connect_start);
        }
    }
    samples
}

fn collect_download_timing_samples(records: &[NetworkRequest], reused: &HashMap<String, bool>) -> HashMap<Origin, Vec<f64>> {
    let mut samples: HashMap<Origin, Vec<f64>> = HashMap::new();
    for r in records {
        if reused.get(&r.request_id).copied().unwrap_or(r.connection_reused) {
            continue;
        }
        if r.transfer_size <= INITIAL_CWD_BYTES {
            continue;
        }
        let Some(timing) = r.timing else { continue };
        let Some(receive_headers_end) = timing.receive_headers_end.filter(|v| *v > 0.0) else {
            continue;
        };
        let total_ms = (r.end_time - r.start_time) * 1000.0;
        let ratio = (r.transfer_size as f64 / INITIAL_CWD_BYTES as f64).log2();
        if ratio <= 0.0 {
            continue;
        }
        // `ratio` is the implied round-trip count; discard if it's too large.
        if ratio > 5.0 {
            continue;
        }
        let sample = (total_ms - receive_headers_end) / ratio;
        samples.entry(r.origin()).or_default().push(sample.max(0.0));
    }
    samples
}

fn collect_send_start_samples(records: &[NetworkRequest], reused: &HashMap<String, bool>) -> HashMap<Origin, Vec<f64>> {
    let mut samples: HashMap<Origin, Vec<f64>> = HashMap::new();
    for r in records {
        if reused.get(&r.request_id).copied().unwrap_or(r.connection_reused) {
            continue;
        }
        let Some(timing) = r.timing else { continue };
        let Some(send_start) = timing.send_start.filter(|v| *v > 0.0) else {
            continue;
        };
        let divisor = if r.is_secure() { 3.0 } else { 2.0 };
        let sample = (send_start / divisor) * COARSE_ESTIMATE_MULTIPLIER;
        samples.entry(r.origin()).or_default().push(sample);
    }
    samples
}

fn collect_ttfb_samples(records: &[NetworkRequest], reused: &HashMap<String, bool>) -> HashMap<Origin, Vec<f64>> {
    let mut samples: HashMap<Origin, Vec<f64>> = HashMap::new();
    for r in records {
        let Some(timing) = r.timing else { continue };
        let Some(receive_headers_end) = timing.receive_headers_end.filter(|v| *v > 0.0) else {
            continue;
        };
        let send_end = timing.send_end.unwrap_or(0.0);
        let ttfb = receive_headers_end - send_end;
        let server_fraction = match r.resource_type {
            ResourceType::Document | ResourceType::Xhr | ResourceType::Fetch => 0.9,
            _ => 0.4,
        };
        let network_fraction = ttfb * (1.0 - server_fraction);
        let is_reused = reused.get(&r.request_id).copied().unwrap_or(r.connection_reused);
        let round_trip_count = if is_reused {
            1.0
        } else if r.is_secure() {
            3.0
        } else {
            2.0
        };
        let sample = ((network_fraction / round_trip_count) * COARSE_ESTIMATE_MULTIPLIER).max(3.0);
        samples.entry(r.origin()).or_default().push(sample);
    }
    samples
}

fn merge_missing(base: &mut HashMap<Origin, Vec<f64>>, fallback: HashMap<Origin, Vec<f64>>) {
    for (origin, samples) in fallback {
        base.entry(origin).or_insert(samples);
    }
}

/// Estimates per-origin RTT (§4.4), trying TCP timing, then download timing,
/// then send-start, then TTFB, merging a later tier's samples only for
/// origins the earlier tiers had nothing for.
pub fn estimate_rtt_by_origin(
    records: &[NetworkRequest],
    reused: &HashMap<String, bool>,
) -> Result<HashMap<String, OriginSummary>, LanternError> {
    let mut samples = collect_tcp_timing_samples(records, reused);
    merge_missing(&mut samples, collect_download_timing_samples(records, reused));
    merge_missing(&mut samples, collect_send_start_samples(records, reused));
    merge_missing(&mut samples, collect_ttfb_samples(records, reused));

    if samples.is_empty() {
        return Err(LanternError::NoTimingInformation { phase: Phase::Analyzer });
    }

    let mut summary: HashMap<String, OriginSummary> = samples
        .iter()
        .map(|(origin, s)| (origin.0.clone(), OriginSummary::from_samples(s)))
        .collect();

    let all_samples: Vec<f64> = samples.values().flatten().copied().collect();
    summary.insert(SUMMARY_ORIGIN.to_string(), OriginSummary::from_samples(&all_samples));
    Ok(summary)
}

/// Estimates per-origin server response time (§4.4).
pub fn estimate_server_response_time_by_origin(
    records: &[NetworkRequest],
    rtt_by_origin: &HashMap<String, OriginSummary>,
) -> HashMap<String, OriginSummary> {
    let fallback_rtt = rtt_by_origin.get(SUMMARY_ORIGIN).map(|s| s.min).unwrap_or(0.0);
    let mut samples: HashMap<Origin, Vec<f64>> = HashMap::new();
    for r in records {
        let Some(timing) = r.timing else { continue };
        let Some(receive_headers_end) = timing.receive_headers_end else { continue };
        let send_end = timing.send_end.unwrap_or(0.0);
        let ttfb = receive_headers_end - send_end;
        let origin = r.origin();
        let origin_rtt = rtt_by_origin.get(&origin.0).map(|s| s.min).unwrap_or(fallback_rtt);
        let sample = (ttfb - origin_rtt).max(0.0);
        samples.entry(origin).or_default().push(sample);
    }

    let mut summary: HashMap<String, OriginSummary> = samples
        .iter()
        .map(|(origin, s)| (origin.0.clone(), OriginSummary::from_samples(s)))
        .collect();
    if !samples.is_empty() {
        let all: Vec<f64> = samples.values().flatten().copied().collect();
        summary.insert(SUMMARY_ORIGIN.to_string(), OriginSummary::from_samples(&all));
    }
    summary
}

/// The Document-type record with the earliest `start_time` (§4.4).
pub fn find_main_document(records: &[NetworkRequest]) -> Option<&NetworkRequest> {
    records
        .iter()
        .filter(|r| r.resource_type == ResourceType::Document)
        .min_by(|a, b| a.start_time.partial_cmp(&b.start_time).unwrap())
}

/// Runs the full analysis used by [`crate::simulator::Simulator`] config
/// derivation.
pub fn analyze(records: &[NetworkRequest]) -> Result<NetworkAnalysis, LanternError> {
    let reused = classify_connection_reuse(records);
    let rtt_by_origin = estimate_rtt_by_origin(records, &reused)?;
    let server_response_time_by_origin = estimate_server_response_time_by_origin(records, &rtt_by_origin);
    let rtt_ms = rtt_by_origin.get(SUMMARY_ORIGIN).map(|s| s.min).unwrap_or(0.0);

    Ok(NetworkAnalysis {
        rtt_by_origin,
        server_response_time_by_origin,
        connection_reused: reused,
        rtt_ms,
        throughput_bps: f64::INFINITY,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NetworkRequestBuilder, Priority, RequestTiming};

    fn timed_request(id: &str, origin: &str, connect_start: f64, connect_end: f64) -> NetworkRequest {
        NetworkRequestBuilder::new(id, format!("{origin}/x"))
            .resource_type(ResourceType::Script)
            .priority(Priority::Medium)
            .connection_id(id)
            .connection_reused(false)
            .timing(RequestTiming {
                connect_start: Some(connect_start),
                connect_end: Some(connect_end),
                ..Default::default()
            })
            .build()
    }

    #[test]
    fn summary_min_median_max_ordering_holds() {
        let samples = [10.0, 50.0, 20.0, 5.0, 100.0];
        let summary = OriginSummary::from_samples(&samples);
        assert!(summary.min <= summary.median);
        assert!(summary.median <= summary.max);
        assert!(summary.min <= summary.avg);
        assert!(summary.avg <= summary.max);
    }

    #[test]
    fn tcp_timing_produces_one_sample_without_ssl() {
        let records = vec![timed_request("1", "https://a.com", 0.0, 80.0)];
        let reused = classify_connection_reuse(&records);
        let rtt = estimate_rtt_by_origin(&records, &reused).unwrap();
        assert_eq!(rtt.get("https://a.com").unwrap().min, 80.0);
    }

    #[test]
    fn empty_records_raise_no_timing_information() {
        let records: Vec<NetworkRequest> = vec![];
        let reused = classify_connection_reuse(&records);
        let err = estimate_rtt_by_origin(&records, &reused).unwrap_err();
        assert_eq!(err.code(), "NO_TIMING_INFORMATION");
    }

    #[test]
    fn main_document_is_earliest_document_request() {
        let mut a = NetworkRequestBuilder::new("1", "https://a.com/").resource_type(ResourceType::Document).start_time(1.0).build();
        let b = NetworkRequestBuilder::new("2", "https://a.com/redirected").resource_type(ResourceType::Document).start_time(0.5).build();
        a.redirect_source = Some("2".into());
        let records = vec![a, b];
        let doc = find_main_document(&records).unwrap();
        assert_eq!(doc.request_id, "2");
    }
}
