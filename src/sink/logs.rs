//! HTTP client for the log sink.
//!
//! The sink keeps one append-only event log per named stream. Every accepted
//! append returns the next continuation token; supplying a stale token is
//! rejected with a conflict so out-of-order appends cannot interleave.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::error::{LogRejectedSnafu, LogSinkError, LogTransportSnafu, StaleTokenSnafu};
use crate::sink::{AppendToken, LogEvent, LogSink};

/// Log sink client appending event batches to an HTTP stream endpoint.
pub struct HttpLogSink {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct AppendRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a AppendToken>,
    events: &'a [LogEvent],
}

#[derive(Deserialize)]
struct AppendResponse {
    next_token: AppendToken,
}

#[derive(Deserialize)]
struct StreamState {
    #[serde(default)]
    token: Option<AppendToken>,
}

impl HttpLogSink {
    pub fn new(endpoint: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn stream_url(&self, stream: &str) -> String {
        format!("{}/v1/streams/{stream}", self.endpoint)
    }
}

#[async_trait]
impl LogSink for HttpLogSink {
    async fn resolve_token(&self, stream: &str) -> Result<Option<AppendToken>, LogSinkError> {
        let response = self
            .http
            .get(self.stream_url(stream))
            .send()
            .await
            .context(LogTransportSnafu)?;

        // A stream nobody has written to yet has no token.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return LogRejectedSnafu {
                status: status.as_u16(),
                message,
            }
            .fail();
        }

        let state: StreamState = response.json().await.context(LogTransportSnafu)?;
        Ok(state.token)
    }

    async fn append(
        &self,
        stream: &str,
        token: Option<&AppendToken>,
        events: &[LogEvent],
    ) -> Result<AppendToken, LogSinkError> {
        let url = format!("{}/append", self.stream_url(stream));
        let response = self
            .http
            .post(url)
            .json(&AppendRequest { token, events })
            .send()
            .await
            .context(LogTransportSnafu)?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            return StaleTokenSnafu { stream }.fail();
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return LogRejectedSnafu {
                status: status.as_u16(),
                message,
            }
            .fail();
        }

        let accepted: AppendResponse = response.json().await.context(LogTransportSnafu)?;
        Ok(accepted.next_token)
    }
}
