use super::{GatewayError, JobGateway};
use crate::config::GatewayConfig;
use crate::types::{
    ItemPayload, ItemResult, JobOutcome, JobProgress, JobSnapshot, JobStatus, SubmitReceipt,
};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::Proxy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

const SUBMIT_PATH: &str = "api/questions/extract/batch/async";
const MAX_ERROR_BODY: usize = 512;

/// REST implementation of [`JobGateway`].
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        // Path joins drop the last segment unless the base ends with '/'.
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid gateway base URL: {}", e),
                ErrorContext::new()
                    .with_field_path("gateway.base_url")
                    .with_details(config.base_url.clone())
                    .with_source("http_gateway"),
            )
        })?;

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid proxy URL: {}", e),
                    ErrorContext::new()
                        .with_field_path("gateway.proxy_url")
                        .with_details(proxy_url.clone())
                        .with_source("http_gateway"),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            Error::runtime_with_context(
                format!("failed to build HTTP client: {}", e),
                ErrorContext::new().with_source("http_gateway"),
            )
        })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::Unavailable(format!("invalid endpoint {}: {}", path, e)))
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> std::result::Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http {
                status: status.as_u16(),
                message: truncate(&body, MAX_ERROR_BODY),
            });
        }
        let bytes = response.bytes().await.map_err(classify)?;
        serde_json::from_slice(&bytes).map_err(|e| GatewayError::MalformedResponse(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> std::result::Result<T, GatewayError> {
        let url = self.endpoint(path)?;
        let response = self.client.get(url).send().await.map_err(classify)?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl JobGateway for HttpGateway {
    async fn submit_batch(
        &self,
        items: &[ItemPayload],
        concurrency_hint: usize,
    ) -> std::result::Result<SubmitReceipt, GatewayError> {
        let body = SubmitRequest {
            images: items
                .iter()
                .map(|p| WireImage {
                    filename: p.filename.clone(),
                    data: p.data_url(),
                })
                .collect(),
            max_workers: concurrency_hint,
        };
        let url = self.endpoint(SUBMIT_PATH)?;
        debug!(url = %url, images = items.len(), max_workers = concurrency_hint, "submitting batch");

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status().as_u16();
        let wire: SubmitResponse = Self::read_json(response).await?;
        if !wire.success {
            return Err(GatewayError::Http {
                status,
                message: wire.message.unwrap_or_else(|| "submission rejected".to_string()),
            });
        }
        match wire.task_id {
            Some(id) if !id.is_empty() => Ok(SubmitReceipt {
                job_id: id,
                message: wire.message,
            }),
            _ => Err(GatewayError::MalformedResponse(
                "submit response carries no task_id".to_string(),
            )),
        }
    }

    async fn poll_status(&self, job_id: &str) -> std::result::Result<JobSnapshot, GatewayError> {
        let wire: StatusResponse = self.get_json(&format!("api/tasks/{}/status", job_id)).await?;
        let task = wire
            .task
            .ok_or_else(|| GatewayError::MalformedResponse("status response carries no task".into()))?;
        let status: JobStatus = task.status.parse().map_err(GatewayError::MalformedResponse)?;
        Ok(JobSnapshot::new(status, task.progress.unwrap_or_default()))
    }

    async fn fetch_result(&self, job_id: &str) -> std::result::Result<JobOutcome, GatewayError> {
        let wire: ResultResponse = self.get_json(&format!("api/tasks/{}/result", job_id)).await?;
        Ok(JobOutcome {
            success: wire.success,
            items: wire.result.map(|r| r.results),
            error: wire.error.or(wire.message),
        })
    }
}

/// Map a `reqwest` failure onto the gateway taxonomy.
fn classify(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(err.to_string())
    } else if err.is_connect() {
        GatewayError::Unavailable(err.to_string())
    } else if err.is_decode() || err.is_body() {
        GatewayError::MalformedResponse(err.to_string())
    } else if let Some(status) = err.status() {
        GatewayError::Http {
            status: status.as_u16(),
            message: err.to_string(),
        }
    } else {
        GatewayError::Unavailable(err.to_string())
    }
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[derive(Debug, Serialize)]
struct WireImage {
    filename: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct SubmitRequest {
    images: Vec<WireImage>,
    max_workers: usize,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    task: Option<TaskInfo>,
}

#[derive(Debug, Deserialize)]
struct TaskInfo {
    status: String,
    #[serde(default)]
    progress: Option<JobProgress>,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<BatchResult>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchResult {
    #[serde(default)]
    results: Vec<ItemResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let gw = HttpGateway::new(&GatewayConfig::new("http://127.0.0.1:5000/v2")).unwrap();
        assert_eq!(gw.base_url().as_str(), "http://127.0.0.1:5000/v2/");
        let url = gw.endpoint("api/tasks/abc/status").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5000/v2/api/tasks/abc/status");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = HttpGateway::new(&GatewayConfig::new("not a url")).err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let mut config = GatewayConfig::new("http://127.0.0.1:5000");
        config.proxy_url = Some("ftp://proxy.local:2121".to_string());
        let err = HttpGateway::new(&config).err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("gateway.proxy_url")
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
