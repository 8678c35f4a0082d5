//! Response-code catalog
//!
//! Every gateway-built response is HTTP 200; the outcome travels in the
//! `X-ResponseCode` / `X-ResponseDesc` headers. Codes are looked up per
//! domain and anything unknown resolves to `05 Undefined Error`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::headers;

pub const SUCCESS_CODE: &str = "00";
pub const SUCCESS_MESSAGE: &str = "Success";

pub const FORMAT_ERROR_CODE: &str = "30";
pub const FORMAT_ERROR_MESSAGE: &str = "Format Error";

pub const UNDEFINED_ERROR_CODE: &str = "05";
pub const UNDEFINED_ERROR_MESSAGE: &str = "Undefined Error";

/// Business domain whose code table applies to a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    #[serde(rename = "fuse")]
    Internal,
    #[serde(rename = "pros")]
    Prospera,
    #[serde(rename = "tmn")]
    Temenos,
    #[serde(rename = "wow")]
    Wow,
}

impl Domain {
    pub const ALL: [Domain; 4] = [Domain::Internal, Domain::Prospera, Domain::Temenos, Domain::Wow];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Internal => "fuse",
            Domain::Prospera => "pros",
            Domain::Temenos => "tmn",
            Domain::Wow => "wow",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown domain '{s}', expected one of fuse, pros, tmn, wow"))
    }
}

/// Code → message tables per domain, built once from configuration
#[derive(Debug, Clone, Default)]
pub struct ResponseCatalog {
    entries: HashMap<Domain, HashMap<String, String>>,
}

impl ResponseCatalog {
    /// Empty catalog: every lookup resolves to the undefined error
    pub fn empty() -> Self {
        Self::default()
    }

    /// Success and format-error entries for every domain
    pub fn standard() -> Self {
        Domain::ALL.into_iter().fold(Self::empty(), |catalog, domain| {
            catalog
                .with_code(domain, SUCCESS_CODE, SUCCESS_MESSAGE)
                .with_code(domain, FORMAT_ERROR_CODE, FORMAT_ERROR_MESSAGE)
        })
    }

    pub fn with_code(
        mut self,
        domain: Domain,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.entries
            .entry(domain)
            .or_default()
            .insert(code.into(), message.into());
        self
    }

    /// `(code, message)` for `domain`, or the undefined error if unknown
    pub fn resolve<'a>(&'a self, domain: Domain, code: &'a str) -> (&'a str, &'a str) {
        match self.entries.get(&domain).and_then(|codes| codes.get(code)) {
            Some(message) => (code, message.as_str()),
            None => (UNDEFINED_ERROR_CODE, UNDEFINED_ERROR_MESSAGE),
        }
    }

    /// HTTP 200 JSON response carrying the resolved code headers
    pub fn respond(&self, domain: Domain, code: &str, body: JsonValue) -> Response {
        let (code, message) = self.resolve(domain, code);
        let mut response = (StatusCode::OK, Json(body)).into_response();
        stamp(&mut response, code, message);
        response
    }
}

fn stamp(response: &mut Response, code: &str, message: &str) {
    let response_headers = response.headers_mut();
    let (code, message) = match (HeaderValue::from_str(code), HeaderValue::from_str(message)) {
        (Ok(code), Ok(message)) => (code, message),
        _ => (
            HeaderValue::from_static(UNDEFINED_ERROR_CODE),
            HeaderValue::from_static(UNDEFINED_ERROR_MESSAGE),
        ),
    };
    response_headers.insert(HeaderName::from_static(headers::RESPONSE_CODE), code);
    response_headers.insert(HeaderName::from_static(headers::RESPONSE_MESSAGE), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::json;

    #[test]
    fn test_standard_catalog_resolves_known_codes() {
        let catalog = ResponseCatalog::standard();
        for domain in Domain::ALL {
            assert_eq!(catalog.resolve(domain, "00"), ("00", "Success"));
            assert_eq!(catalog.resolve(domain, "30"), ("30", "Format Error"));
        }
    }

    #[test]
    fn test_unknown_code_is_undefined() {
        let catalog = ResponseCatalog::standard();
        assert_eq!(catalog.resolve(Domain::Wow, "99"), ("05", "Undefined Error"));
        assert_eq!(
            ResponseCatalog::empty().resolve(Domain::Internal, "00"),
            ("05", "Undefined Error")
        );
    }

    #[test]
    fn test_custom_code_is_scoped_to_domain() {
        let catalog = ResponseCatalog::standard().with_code(Domain::Temenos, "14", "Invalid Account");
        assert_eq!(catalog.resolve(Domain::Temenos, "14"), ("14", "Invalid Account"));
        assert_eq!(catalog.resolve(Domain::Wow, "14").0, "05");
    }

    #[test]
    fn test_domain_parse() {
        assert_eq!("fuse".parse::<Domain>().unwrap(), Domain::Internal);
        assert_eq!("TMN".parse::<Domain>().unwrap(), Domain::Temenos);
        assert!("bank".parse::<Domain>().is_err());
    }

    #[tokio::test]
    async fn test_respond_is_http_200_with_headers() {
        let response = ResponseCatalog::standard().respond(Domain::Internal, "30", json!({}));

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["X-ResponseCode"], "30");
        assert_eq!(response.headers()["X-ResponseDesc"], "Format Error");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"{}");
    }
}
