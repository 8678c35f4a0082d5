//! Secret redaction for audit events
//!
//! Header values that carry credentials are masked before an event leaves
//! the process. The caller's header map is never modified; redaction always
//! produces a new mapping.

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use tracing::debug;
use url::{form_urlencoded, Url};

use crate::headers;

/// Fixed mask inserted into sensitive values (11 asterisks)
pub const MASK: &str = "***********";

/// Headers whose values are masked, compared case-insensitively
pub const SENSITIVE_HEADERS: [&str; 2] = [headers::API_KEY, headers::AUTHORIZATION];

/// Returns true when `name` is one of [`SENSITIVE_HEADERS`]
pub fn is_sensitive(name: &str) -> bool {
    SENSITIVE_HEADERS
        .iter()
        .any(|sensitive| sensitive.eq_ignore_ascii_case(name))
}

/// Mask a single sensitive value.
///
/// Values longer than four characters keep their first two and last three
/// characters around the mask. Shorter values are echoed on both sides of
/// the mask, so `"abc"` becomes `"abc***********abc"`.
pub fn mask_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();

    if len > 4 {
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[len - 3..].iter().collect();
        format!("{head}{MASK}{tail}")
    } else {
        format!("{value}{MASK}{value}")
    }
}

/// Copy `headers` into an ordered `{name: [values]}` mapping with every
/// sensitive value masked.
pub fn redact_headers(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut redacted: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (name, value) in headers {
        let raw = String::from_utf8_lossy(value.as_bytes());
        let value = if is_sensitive(name.as_str()) {
            mask_value(&raw)
        } else {
            raw.into_owned()
        };

        redacted
            .entry(name.as_str().to_string())
            .or_default()
            .push(value);
    }

    redacted
}

/// Connection-string query parameters that carry credentials
pub const CREDENTIAL_PARAMS: [&str; 3] = ["user", "password", "sslpassword"];

/// Remove user name and password from a connection string, both from the
/// authority and from query parameters.
///
/// Unparseable input is returned unchanged except for anything before an
/// `@`, so a malformed DSN still never leaks its credentials.
pub fn strip_credentials(dsn: &str) -> String {
    if let Ok(mut url) = Url::parse(dsn) {
        if url.has_host() {
            // Setters only fail for URLs without a host.
            let _ = url.set_username("");
            let _ = url.set_password(None);
            let query = url.query().map(strip_query_credentials);
            url.set_query(query.as_deref().filter(|q| !q.is_empty()));
            return url.to_string();
        }
    }

    debug!("Connection string has no URL authority, trimming userinfo");
    let rest = match dsn.rsplit_once('@') {
        Some((_, host)) => host,
        None => dsn,
    };
    match rest.split_once('?') {
        Some((base, query)) => match strip_query_credentials(query) {
            kept if kept.is_empty() => base.to_string(),
            kept => format!("{base}?{kept}"),
        },
        None => rest.to_string(),
    }
}

fn strip_query_credentials(query: &str) -> String {
    let kept = form_urlencoded::parse(query.as_bytes()).filter(|(name, _)| {
        !CREDENTIAL_PARAMS
            .iter()
            .any(|param| name.eq_ignore_ascii_case(param))
    });
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(kept)
        .finish()
}
