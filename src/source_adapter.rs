//! # Spot Source Adapter Trait
//!
//! The abstraction every polled HTTP source implements. An adapter fetches
//! one JSON document, converts each element into a canonical [`Spot`] and
//! enriches it. The [`PollingSource`](crate::polling::PollingSource) decides
//! when to call it and what to do with the result.
//!
//! ## Adding a New Source
//!
//! 1. Add a [`SpotSource`] variant
//! 2. Implement `SpotSourceAdapter` in `adapters/`
//! 3. Register it in `adapters::build_adapters`
//!
//! ## Example
//!
//! ```rust,no_run
//! use spotfeed::enrichment::SpotEnricher;
//! use spotfeed::source_adapter::{SourceError, SpotSourceAdapter};
//! use spotfeed::spot::{Spot, SpotSource};
//! use async_trait::async_trait;
//!
//! struct MyProgram;
//!
//! #[async_trait]
//! impl SpotSourceAdapter for MyProgram {
//!     fn name(&self) -> &'static str {
//!         "MyProgram"
//!     }
//!
//!     fn source(&self) -> SpotSource {
//!         SpotSource::Pota
//!     }
//!
//!     async fn fetch_spots(&self, enricher: &SpotEnricher) -> Result<Vec<Spot>, SourceError> {
//!         // GET the feed, convert every element, enrich
//!         Ok(vec![])
//!     }
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::enrichment::SpotEnricher;
use crate::spot::{Spot, SpotSource};

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("spotfeed/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected document shape: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid endpoint URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[async_trait]
pub trait SpotSourceAdapter: Send + Sync {
    /// Human-readable adapter name for logs.
    fn name(&self) -> &'static str;

    fn source(&self) -> SpotSource;

    /// Fetches and converts the current spots. Elements that fail to convert
    /// are dropped; only transport and document-level failures are errors.
    async fn fetch_spots(&self, enricher: &SpotEnricher) -> Result<Vec<Spot>, SourceError>;
}

/// Shared HTTP client for all adapters.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Validates a configured endpoint URL.
pub fn parse_endpoint_url(raw: &str) -> Result<url::Url, SourceError> {
    let parsed = url::Url::parse(raw).map_err(|e| SourceError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(SourceError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// GETs a JSON document and returns its elements undecoded. A top-level
/// object is searched for the first array-valued field.
pub async fn fetch_json_elements(
    client: &reqwest::Client,
    url: &url::Url,
    field: Option<&str>,
) -> Result<Vec<serde_json::Value>, SourceError> {
    let body = client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    json_elements(&body, field)
}

/// Elements of a top-level array, or of the array under `field` when the
/// document is an object.
pub fn json_elements(body: &str, field: Option<&str>) -> Result<Vec<serde_json::Value>, SourceError> {
    let doc: serde_json::Value = serde_json::from_str(body)?;
    let items = match (doc, field) {
        (serde_json::Value::Array(items), _) => items,
        (serde_json::Value::Object(mut map), Some(field)) => match map.remove(field) {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                debug!("No '{}' array in document", field);
                Vec::new()
            }
        },
        _ => Vec::new(),
    };
    Ok(items)
}

/// Decodes each element independently, dropping the ones that do not fit.
pub fn decode_each<T: DeserializeOwned>(source: &str, items: Vec<serde_json::Value>) -> Vec<T> {
    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!("[{}] Dropping malformed element: {}", source, e);
                None
            }
        })
        .collect();
    if decoded.len() < total {
        debug!("[{}] Decoded {}/{} elements", source, decoded.len(), total);
    }
    decoded
}

/// Accepts RFC 3339 or a zoneless ISO timestamp (taken as UTC).
pub fn parse_utc_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Parses a number that upstreams send either as JSON number or string.
pub fn number_field(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use serde_json::json;

    #[test]
    fn test_timestamp_formats() {
        let a = parse_utc_timestamp("2024-06-01T12:34:56").unwrap();
        let b = parse_utc_timestamp("2024-06-01T12:34:56Z").unwrap();
        let c = parse_utc_timestamp("2024-06-01T14:34:56+02:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        let d = parse_utc_timestamp("2024-06-01 12:34:56.250").unwrap();
        assert_eq!(d.minute(), 34);
        assert!(parse_utc_timestamp("yesterday").is_none());
        assert!(parse_utc_timestamp("").is_none());
    }

    #[test]
    fn test_json_elements_shapes() {
        assert_eq!(json_elements("[1,2]", None).unwrap().len(), 2);
        assert_eq!(json_elements("[1,2]", Some("spots")).unwrap().len(), 2);
        let doc = r#"{"activeReceiver":[9],"count":2,"spots":[1,2]}"#;
        assert_eq!(json_elements(doc, Some("spots")).unwrap(), vec![json!(1), json!(2)]);
        assert!(json_elements(doc, None).unwrap().is_empty());
        assert!(json_elements("{}", Some("spots")).unwrap().is_empty());
        assert!(json_elements("<html>", None).is_err());
    }

    #[test]
    fn test_decode_each_drops_bad_elements() {
        #[derive(serde::Deserialize)]
        struct Item {
            #[allow(dead_code)]
            call: String,
        }
        let items = vec![json!({"call": "K1ABC"}), json!({"call": 5}), json!("x")];
        let decoded: Vec<Item> = decode_each("test", items);
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn test_number_field() {
        assert_eq!(number_field(&json!("14062.5")), Some(14_062.5));
        assert_eq!(number_field(&json!(7.032)), Some(7.032));
        assert_eq!(number_field(&json!(null)), None);
        assert_eq!(number_field(&json!("abc")), None);
    }

    #[test]
    fn test_endpoint_url_validation() {
        assert!(parse_endpoint_url("https://api.pota.app/spot/activator").is_ok());
        assert!(parse_endpoint_url("ftp://example.com/").is_err());
        assert!(parse_endpoint_url("not a url").is_err());
    }
}
