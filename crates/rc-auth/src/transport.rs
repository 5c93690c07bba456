use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use crate::config::TransportConfig;
use crate::errors::Result;

/// Status and body of a finished HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// HTTP seam used by every network step
///
/// Implementations only move bytes; status handling and decoding stay with the callers.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// POST an `application/x-www-form-urlencoded` body
    async fn post_form(&self, url: &Url, form: &[(&str, &str)]) -> Result<HttpResponse>;

    /// POST a JSON body
    async fn post_json(&self, url: &Url, body: &serde_json::Value) -> Result<HttpResponse>;
}

/// reqwest backed [`Transport`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("rauncher-auth"))
            .build()?;

        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, form), fields(url = %url))]
    async fn post_form(&self, url: &Url, form: &[(&str, &str)]) -> Result<HttpResponse> {
        let response = self
            .http
            .post(url.clone())
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(%status, "form request finished");
        Ok(HttpResponse { status, body })
    }

    #[instrument(skip(self, body), fields(url = %url))]
    async fn post_json(&self, url: &Url, body: &serde_json::Value) -> Result<HttpResponse> {
        let response = self
            .http
            .post(url.clone())
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(%status, "json request finished");
        Ok(HttpResponse { status, body })
    }
}
