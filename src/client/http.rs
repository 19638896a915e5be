//! HTTP client for the metrics service
//!
//! Every endpoint answers with the `{ok, data, error}` envelope. GET reads are
//! idempotent and retried with backoff; the scenario-load POST is sent once.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::{ApiEnvelope, EntityInfo, MetricsSource, PerfHistory};
use crate::config::ServiceConfig;
use crate::failsafe::{RetryPolicy, with_retry};
use crate::metrics::{MetricValues, ScriptCounters};
use crate::{Error, Result};

/// reqwest-backed [`MetricsSource`]
pub struct HttpMetricsClient {
    /// HTTP client
    client: Client,
    /// Base URL of the service
    base_url: Url,
    /// Bearer token, if configured
    api_token: Option<String>,
    /// Retry policy for reads
    retry: RetryPolicy,
    /// Path polled by [`MetricsSource::probe`]
    probe_path: String,
}

impl HttpMetricsClient {
    /// Create a client from service settings
    pub fn new(config: &ServiceConfig, retry: RetryPolicy) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::Config(format!("invalid base_url {:?}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("base_url {base_url} cannot be a base")));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_token: config.resolve_api_token(),
            retry,
            probe_path: config.probe_path.clone(),
        })
    }

    /// Build an endpoint URL from path segments under the base URL
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("base_url {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and unwrap the response envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &str,
    ) -> Result<Option<T>> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{endpoint}: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::Transport(format!("{endpoint} returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("{endpoint}: {e}")))?;
        let envelope: ApiEnvelope<T> = serde_json::from_str(&body).map_err(|e| {
            Error::Protocol(format!("{endpoint} returned {status} with unexpected body: {e}"))
        })?;
        envelope.into_result(endpoint)
    }

    /// GET with retries
    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<Option<T>> {
        let url = self.endpoint(segments.iter().copied())?;
        let endpoint = url.path().to_string();
        with_retry(&self.retry, &endpoint, || {
            debug!(url = %url, "GET");
            self.send(self.client.get(url.clone()), &endpoint)
        })
        .await
    }

    async fn get_required<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        self.get(segments).await?.ok_or_else(|| {
            Error::Protocol(format!("/{} returned no data", segments.join("/")))
        })
    }
}

#[async_trait]
impl MetricsSource for HttpMetricsClient {
    async fn snapshot(&self) -> Result<MetricValues> {
        self.get_required(&["perf"]).await
    }

    async fn history(&self) -> Result<PerfHistory> {
        Ok(self.get(&["perf", "history"]).await?.unwrap_or_default())
    }

    async fn script_counters(&self) -> Result<ScriptCounters> {
        Ok(self.get(&["scripts", "stats"]).await?.unwrap_or_default())
    }

    async fn list_entities(&self) -> Result<Vec<String>> {
        let items: Vec<EntityInfo> = self.get(&["examples"]).await?.unwrap_or_default();
        Ok(items
            .into_iter()
            .map(|item| item.name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }

    async fn load_entity(&self, name: &str) -> Result<()> {
        let url = self.endpoint(["examples", name, "load"])?;
        let endpoint = url.path().to_string();
        debug!(url = %url, "POST");
        let request = self.client.post(url).json(&serde_json::json!({}));
        self.send::<serde_json::Value>(request, &endpoint).await?;
        Ok(())
    }

    async fn probe(&self) -> Result<()> {
        let segments: Vec<&str> = self
            .probe_path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let url = self.endpoint(segments)?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        if response.status().is_server_error() {
            return Err(Error::Transport(format!("probe returned {}", response.status())));
        }
        Ok(())
    }
}
