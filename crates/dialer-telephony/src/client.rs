//! HTTP client for the provider's call-control REST API

use async_trait::async_trait;
use dialer_core::config::TelephonyConfig;
use dialer_core::traits::{DialRequest, TelephonyProvider};
use dialer_core::{AppError, AppResult};
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Call-control API client
pub struct CallControlClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    connection_id: String,
    timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct DialBody<'a> {
    connection_id: &'a str,
    to: &'a str,
    from: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct BridgeBody<'a> {
    call_control_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct DialedCall {
    call_control_id: String,
}

impl CallControlClient {
    pub fn new(config: &TelephonyConfig) -> AppResult<Self> {
        let http_client = ClientBuilder::new()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            connection_id: config.connection_id.clone(),
            timeout_ms: config.request_timeout_ms,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn action_url(&self, call_control_id: &str, action: &str) -> String {
        self.url(&format!("calls/{}/actions/{}", call_control_id, action))
    }

    async fn post<B, R>(&self, url: &str, body: &B) -> AppResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Provider(format!("request timed out after {}ms", self.timeout_ms))
                } else {
                    AppError::Provider(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(status, &body);
            error!("Call-control API error: status={}, message={}", status, message);
            return Err(AppError::Provider(message));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| AppError::Provider(format!("unexpected response body: {}", e)))
    }
}

/// Pull a readable message out of an error response
fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.pointer("/errors/0/detail")
            .or_else(|| v.pointer("/errors/0/title"))
            .or_else(|| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    match detail {
        Some(detail) => format!("{}: {}", status, detail),
        None if body.is_empty() => status.to_string(),
        None => format!("{}: {}", status, body),
    }
}

#[async_trait]
impl TelephonyProvider for CallControlClient {
    #[instrument(skip(self, request), fields(to = %request.to, from = %request.from))]
    async fn dial(&self, request: &DialRequest) -> AppResult<String> {
        let body = DialBody {
            connection_id: &self.connection_id,
            to: request.to.as_str(),
            from: request.from.as_str(),
            client_state: request.client_state.as_deref(),
            timeout_secs: request.timeout_secs,
        };

        let reply: DataEnvelope<DialedCall> = self.post(&self.url("calls"), &body).await?;

        info!(call_control_id = %reply.data.call_control_id, "Call originated");
        Ok(reply.data.call_control_id)
    }

    #[instrument(skip(self))]
    async fn bridge(&self, call_control_id: &str, other_call_control_id: &str) -> AppResult<()> {
        let body = BridgeBody {
            call_control_id: other_call_control_id,
        };
        let _: Value = self
            .post(&self.action_url(call_control_id, "bridge"), &body)
            .await?;

        debug!("Bridge command accepted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn hangup(&self, call_control_id: &str) -> AppResult<()> {
        let _: Value = self
            .post(
                &self.action_url(call_control_id, "hangup"),
                &serde_json::json!({}),
            )
            .await?;

        debug!("Hangup command accepted");
        Ok(())
    }
}
