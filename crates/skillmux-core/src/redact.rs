//! URL redaction for log lines and error messages
//!
//! Query parameters whose name contains "key", "token" or "secret"
//! (case-insensitive) have their value replaced with a placeholder. The rest
//! of the URL is kept byte-for-byte, so redaction also works on strings that
//! fail URL parsing.

/// Placeholder written in place of a sensitive query value.
pub const REDACTED: &str = "***REDACTED***";

const SENSITIVE_PARAM_MARKERS: &[&str] = &["key", "token", "secret"];

fn is_sensitive_param(name: &str) -> bool {
    let lower = name.to_lowercase();
    SENSITIVE_PARAM_MARKERS.iter().any(|m| lower.contains(m))
}

/// Redact credential-bearing query parameters in `url`.
pub fn redact_url(url: &str) -> String {
    let Some(query_start) = url.find('?') else {
        return url.to_string();
    };

    let (base, rest) = url.split_at(query_start);
    let rest = &rest[1..];
    let (query, fragment) = match rest.find('#') {
        Some(idx) => (&rest[..idx], Some(&rest[idx..])),
        None => (rest, None),
    };

    let redacted_query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if is_sensitive_param(name) => format!("{}={}", name, REDACTED),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");

    let mut out = String::with_capacity(url.len());
    out.push_str(base);
    out.push('?');
    out.push_str(&redacted_query);
    if let Some(fragment) = fragment {
        out.push_str(fragment);
    }
    out
}
