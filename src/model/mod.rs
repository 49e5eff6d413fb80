//! Typed records for one network request and one trace event (C1), plus the
//! derived fields (origin, resource type, priority) used throughout the
//! rest of the crate.

mod request;
mod trace;

pub use request::{
    Initiator, NetworkRequest, NetworkRequestBuilder, Priority, RequestTiming, ResourceType,
    StackFrame,
};
pub use trace::{ArgsData, Phase as TracePhase, TraceEvent};

/// A page security origin: scheme + host + port, the unit the analyzer and
/// connection pool group requests by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin(pub String);

impl Origin {
    /// Derives the origin from a URL string. Falls back to the whole URL
    /// when it cannot be parsed, mirroring how malformed observed URLs are
    /// tolerated rather than rejected outright.
    pub fn from_url(url: &str) -> Origin {
        match parse_url(url) {
            Some(parsed) => Origin(format!(
                "{}://{}{}",
                parsed.scheme,
                parsed.host,
                parsed
                    .port
                    .map(|p| format!(":{p}"))
                    .unwrap_or_default()
            )),
            None => Origin(url.to_string()),
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A minimally parsed URL: just enough of scheme/host/port/path for origin
/// derivation and TLS/H2 inference. Not a general-purpose URL parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
}

pub fn parse_url(url: &str) -> Option<ParsedUrl> {
    let (scheme, rest) = url.split_once("://")?;
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };
    let authority = authority.split(['?', '#']).next().unwrap_or(authority);
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) && !p.is_empty() => {
            (h.to_string(), p.parse::<u16>().ok())
        }
        _ => (authority.to_string(), None),
    };
    Some(ParsedUrl {
        scheme: scheme.to_ascii_lowercase(),
        host,
        port,
        path: path.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_url_splits_scheme_host_port() {
        let parsed = parse_url("https://example.com:8443/a/b?x=1").unwrap();
        assert_eq!(parsed.scheme, "https");
        assert_eq!(parsed.host, "example.com");
        assert_eq!(parsed.port, Some(8443));
        assert_eq!(parsed.path, "/a/b?x=1");
    }

    #[test]
    fn origin_same_for_differing_paths() {
        let a = Origin::from_url("https://example.com/a");
        let b = Origin::from_url("https://example.com/b?x=1");
        assert_eq!(a, b);
    }

    #[test]
    fn origin_differs_across_ports() {
        let a = Origin::from_url("https://example.com/a");
        let b = Origin::from_url("https://example.com:444/a");
        assert_ne!(a, b);
    }
}
