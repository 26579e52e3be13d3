//! HTTP client for the array management API.
//!
//! All endpoints return JSON wrapped in a `{"response": {...}}` envelope.
//! Authentication is a static `X-Access-Key` header. TLS certificate
//! validation is disabled: the appliances ship self-signed certificates and
//! this is a documented accepted risk, not a defect.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use snafu::prelude::*;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::config::SourceConfig;
use crate::error::{
    ClientBuildSnafu, InvalidUrlSnafu, MalformedResponseSnafu, SourceError, UnavailableSnafu,
};
use crate::source::{CacheEndpoint, LogRecord, Resource, ResourceCategory, SourceApi, UsageSample};

const ACCESS_KEY_HEADER: &str = "X-Access-Key";

/// Authenticated client for the source API.
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    interval_secs: u64,
}

impl ApiClient {
    /// Create a client from source configuration.
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        Self::with_base_url(config, &format!("https://{}/api/", config.host))
    }

    /// Create a client against an explicit base URL (used by tests).
    pub fn with_base_url(config: &SourceConfig, base: &str) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(&config.api_key)
            .unwrap_or_else(|_| HeaderValue::from_static(""));
        key.set_sensitive(true);
        headers.insert(ACCESS_KEY_HEADER, key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            // Self-signed appliance certificates; accepted risk.
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context(ClientBuildSnafu)?;

        let base = Url::parse(base).context(InvalidUrlSnafu { path: base })?;

        Ok(Self {
            http,
            base,
            interval_secs: config.interval_secs,
        })
    }

    /// Issue one GET and unwrap the `response` envelope.
    async fn api_get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, SourceError> {
        let url = self.base.join(path).context(InvalidUrlSnafu { path })?;

        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .context(UnavailableSnafu { path })?
            .error_for_status()
            .context(UnavailableSnafu { path })?;

        let body: Value = response.json().await.map_err(|e| {
            MalformedResponseSnafu {
                path,
                message: format!("body is not JSON: {e}"),
            }
            .build()
        })?;

        body.get("response").cloned().context(MalformedResponseSnafu {
            path,
            message: "missing \"response\" envelope",
        })
    }

    /// Pull a named array out of an unwrapped envelope.
    fn envelope_array<'a>(
        envelope: &'a Value,
        key: &str,
        path: &str,
    ) -> Result<&'a Vec<Value>, SourceError> {
        envelope
            .get(key)
            .and_then(Value::as_array)
            .context(MalformedResponseSnafu {
                path,
                message: format!("missing \"{key}\" array"),
            })
    }

    fn parse_usages(envelope: &Value, path: &str) -> Result<Vec<UsageSample>, SourceError> {
        let usages = Self::envelope_array(envelope, "usages", path)?;
        usages
            .iter()
            .map(|raw| parse_usage_sample(raw, path))
            .collect()
    }
}

#[async_trait]
impl SourceApi for ApiClient {
    async fn list_resources(
        &self,
        category: ResourceCategory,
    ) -> Result<Vec<Resource>, SourceError> {
        let path = format!("{}.json", category.api_name());
        let envelope = self.api_get(&path, &[]).await?;
        let raw = Self::envelope_array(&envelope, category.api_name(), &path)?;

        raw.iter()
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| {
                    MalformedResponseSnafu {
                        path: path.clone(),
                        message: format!("bad {} entry: {e}", category.api_name()),
                    }
                    .build()
                })
            })
            .collect()
    }

    async fn fetch_usage(
        &self,
        category: ResourceCategory,
        resource_name: &str,
    ) -> Result<Vec<UsageSample>, SourceError> {
        let path = format!("{}/{}/performance.json", category.api_name(), resource_name);
        let query = [("interval", self.interval_secs.to_string())];
        let envelope = self.api_get(&path, &query).await?;
        Self::parse_usages(&envelope, &path)
    }

    async fn fetch_cache_usage(
        &self,
        endpoint: CacheEndpoint,
    ) -> Result<Vec<UsageSample>, SourceError> {
        let path = endpoint.path();
        let query = [("interval", self.interval_secs.to_string())];
        let envelope = self.api_get(path, &query).await?;
        Self::parse_usages(&envelope, path)
    }

    async fn fetch_log(
        &self,
        after_id: u64,
        page_size: usize,
    ) -> Result<Vec<LogRecord>, SourceError> {
        let path = "messages.json";
        let query = [
            ("after", after_id.to_string()),
            ("limit", page_size.to_string()),
            ("sort", "ASC".to_string()),
        ];
        let envelope = self.api_get(path, &query).await?;
        let messages = Self::envelope_array(&envelope, "messages", path)?;

        messages
            .iter()
            .map(|raw| parse_log_record(raw, path))
            .collect()
    }
}

/// Parse one raw usage object: the `time` field is the sample timestamp,
/// every other numeric field is a metric value. Non-numeric fields (resource
/// names and the like) are not metrics and are dropped.
fn parse_usage_sample(raw: &Value, path: &str) -> Result<UsageSample, SourceError> {
    let object = raw.as_object().context(MalformedResponseSnafu {
        path,
        message: "usage entry is not an object",
    })?;

    let timestamp = object
        .get("time")
        .and_then(parse_timestamp)
        .context(MalformedResponseSnafu {
            path,
            message: "usage entry has no parsable \"time\"",
        })?;

    let mut values = BTreeMap::new();
    for (name, value) in object {
        if name == "time" {
            continue;
        }
        if let Some(number) = numeric_value(value) {
            values.insert(name.clone(), number);
        }
    }

    Ok(UsageSample { timestamp, values })
}

fn parse_log_record(raw: &Value, path: &str) -> Result<LogRecord, SourceError> {
    let object = raw.as_object().context(MalformedResponseSnafu {
        path,
        message: "message entry is not an object",
    })?;

    let id = object
        .get("id")
        .and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        })
        .context(MalformedResponseSnafu {
            path,
            message: "message entry has no numeric \"id\"",
        })?;

    let occurred_at = object
        .get("time")
        .and_then(parse_timestamp)
        .context(MalformedResponseSnafu {
            path,
            message: "message entry has no parsable \"time\"",
        })?;

    Ok(LogRecord {
        id,
        occurred_at,
        payload: raw.clone(),
    })
}

/// Timestamps arrive as epoch seconds (number or numeric string) or RFC 3339.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let secs = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            DateTime::from_timestamp(secs, 0)
        }
        Value::String(s) => {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return Some(parsed.with_timezone(&Utc));
            }
            let secs: i64 = s.parse().ok()?;
            DateTime::from_timestamp(secs, 0)
        }
        _ => None,
    }
}

/// Appliances are inconsistent about numbers vs numeric strings.
fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn usage_sample_keeps_numeric_fields_only() {
        let raw = json!({
            "time": 1700000000,
            "iops": 120,
            "read_bandwidth": "12.5",
            "cpu_busy": 3.25,
            "pool_name": "pool-1"
        });
        let sample = parse_usage_sample(&raw, "test").unwrap();
        assert_eq!(sample.timestamp.timestamp(), 1700000000);
        assert_eq!(sample.values.len(), 3);
        assert_eq!(sample.values["read_bandwidth"], 12.5);
        assert!(!sample.values.contains_key("pool_name"));
    }

    #[test]
    fn usage_sample_without_time_is_malformed() {
        let raw = json!({"iops": 120});
        let err = parse_usage_sample(&raw, "test").unwrap_err();
        assert!(matches!(err, SourceError::MalformedResponse { .. }));
    }

    #[test]
    fn log_record_keeps_full_payload() {
        let raw = json!({
            "id": 42,
            "time": "2024-06-01T12:00:00Z",
            "severity": "warning",
            "message": "drive rebuild started"
        });
        let record = parse_log_record(&raw, "test").unwrap();
        assert_eq!(record.id, 42);
        assert_eq!(record.payload["severity"], "warning");
    }

    #[test]
    fn timestamps_parse_from_all_source_shapes() {
        assert!(parse_timestamp(&json!(1700000000)).is_some());
        assert!(parse_timestamp(&json!("1700000000")).is_some());
        assert!(parse_timestamp(&json!("2024-06-01T12:00:00+02:00")).is_some());
        assert!(parse_timestamp(&json!(["nope"])).is_none());
    }
}
