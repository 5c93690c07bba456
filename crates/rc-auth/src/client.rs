use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::callback::CallbackGateway;
use crate::config::{ExchangeEndpoints, ProviderConfig, TransportConfig};
use crate::device::DeviceAuthFlow;
use crate::errors::{RcAuthError, Result};
use crate::exchange::{ExchangeChain, ExchangeOutcome};
use crate::models::{CodeErrorResponse, ExchangeErrorResponse};
use crate::outcome::Outcome;
use crate::tokens::{AccessToken, GameServiceToken};
use crate::transport::{HttpTransport, Transport};

pub type TokenOutcome = Outcome<AccessToken, CodeErrorResponse>;

/// Entry point for every authentication operation of one identity provider
///
/// Cloning is cheap; clones share the configuration and the transport.
#[derive(Clone)]
pub struct RcAuthClient {
    config: Arc<ProviderConfig>,
    transport: Arc<dyn Transport>,
    exchange: ExchangeChain,
}

impl fmt::Debug for RcAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RcAuthClient")
            .field("config", &self.config)
            .field("exchange", self.exchange.endpoints())
            .finish_non_exhaustive()
    }
}

impl RcAuthClient {
    /// Create a client backed by reqwest with default timeouts
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Self::with_transport_config(config, &TransportConfig::default())
    }

    pub fn with_transport_config(
        config: ProviderConfig,
        transport_config: &TransportConfig,
    ) -> Result<Self> {
        let transport = HttpTransport::new(transport_config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ProviderConfig, transport: Arc<dyn Transport>) -> Self {
        let exchange = ExchangeChain::new(transport.clone());
        Self {
            config: Arc::new(config),
            transport,
            exchange,
        }
    }

    /// Point the exchange chain at other hosts
    pub fn with_exchange_endpoints(mut self, endpoints: ExchangeEndpoints) -> Self {
        self.exchange = ExchangeChain::with_endpoints(self.transport.clone(), endpoints);
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn exchange(&self) -> &ExchangeChain {
        &self.exchange
    }

    /// Start a new, independent device authorization attempt
    pub fn device_flow(&self) -> DeviceAuthFlow {
        DeviceAuthFlow::new(self.config.clone(), self.transport.clone(), None)
    }

    /// Like [`Self::device_flow`], stopping `gateway` once the user is authorized
    pub fn device_flow_with_callback(&self, gateway: CallbackGateway) -> DeviceAuthFlow {
        DeviceAuthFlow::new(self.config.clone(), self.transport.clone(), Some(gateway))
    }

    fn redirect_uri(&self) -> Result<&Url> {
        self.config.redirect_uri().ok_or_else(|| {
            RcAuthError::InvalidConfig(
                "redirect_uri is required for the browser grant".to_string(),
            )
        })
    }

    /// Build the authorization URL for the user to visit
    #[instrument(skip(self))]
    pub fn build_authorize_url(&self, state: Option<&str>) -> Result<Url> {
        let redirect_uri = self.redirect_uri()?;

        let mut url = self.config.endpoints().authorize.clone();
        url.query_pairs_mut()
            .append_pair("client_id", self.config.client_id())
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("scope", &self.config.scope_param())
            .append_pair("prompt", "select_account");

        if let Some(s) = state {
            url.query_pairs_mut().append_pair("state", s);
        }

        debug!("Built authorize URL: {}", url);
        Ok(url)
    }

    /// Parse the redirect URL and extract the authorization code
    #[instrument(skip(self))]
    pub fn parse_redirect(
        &self,
        redirect_url: &str,
        expected_state: Option<&str>,
    ) -> Result<String> {
        let url = Url::parse(redirect_url)?;
        let params: HashMap<_, _> = url.query_pairs().collect();

        if let Some(error) = params.get("error") {
            if error == "access_denied" {
                return Err(RcAuthError::UserCancelled);
            }
            return Err(RcAuthError::InvalidRedirect);
        }

        if let Some(expected) = expected_state {
            match params.get("state") {
                Some(actual) if actual == expected => {}
                _ => return Err(RcAuthError::StateMismatch),
            }
        }

        params
            .get("code")
            .map(|c| c.to_string())
            .ok_or(RcAuthError::InvalidRedirect)
    }

    /// Exchange an authorization code for provider tokens
    #[instrument(skip(self, code, on_error))]
    pub async fn exchange_code<F>(&self, code: &str, on_error: F) -> Result<TokenOutcome>
    where
        F: FnOnce(&CodeErrorResponse),
    {
        let redirect_uri = self.redirect_uri()?;

        debug!("Exchanging authorization code for tokens");
        self.token_request(
            vec![
                ("code", code.to_string()),
                ("redirect_uri", redirect_uri.to_string()),
                ("grant_type", "authorization_code".to_string()),
            ],
            on_error,
        )
        .await
    }

    /// Trade a refresh token for a fresh access token
    #[instrument(skip(self, refresh_token, on_error))]
    pub async fn refresh_access_token<F>(
        &self,
        refresh_token: &str,
        on_error: F,
    ) -> Result<TokenOutcome>
    where
        F: FnOnce(&CodeErrorResponse),
    {
        debug!("Refreshing access token");
        self.token_request(
            vec![
                ("refresh_token", refresh_token.to_string()),
                ("grant_type", "refresh_token".to_string()),
            ],
            on_error,
        )
        .await
    }

    async fn token_request<F>(
        &self,
        grant: Vec<(&'static str, String)>,
        on_error: F,
    ) -> Result<TokenOutcome>
    where
        F: FnOnce(&CodeErrorResponse),
    {
        let mut form = self.config.client_form();
        form.extend(grant);
        form.push(("scope", self.config.scope_param()));
        let pairs: Vec<(&str, &str)> = form.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let response = self
            .transport
            .post_form(&self.config.endpoints().token, &pairs)
            .await?;

        if !response.is_success() {
            let err: CodeErrorResponse = serde_json::from_str(&response.body)
                .map_err(|_| RcAuthError::http(response.status, &response.body))?;
            warn!(status = %response.status, error = %err.error, "Token request rejected");
            on_error(&err);
            return Ok(Outcome::Failed(err));
        }

        Ok(Outcome::Success(serde_json::from_str(&response.body)?))
    }

    /// Browser grant through a loopback callback server
    ///
    /// Starts `gateway`, waits for the redirect, stops the gateway and
    /// exchanges the delivered code. Cancellation or a vanished server yields
    /// [`RcAuthError::UserCancelled`].
    #[instrument(skip_all)]
    pub async fn authorize_with_callback<F>(
        &self,
        gateway: &CallbackGateway,
        expected_state: Option<&str>,
        cancel: &CancellationToken,
        on_error: F,
    ) -> Result<TokenOutcome>
    where
        F: FnOnce(&CodeErrorResponse),
    {
        gateway.start().await?;
        let event = gateway.wait_for_code(cancel).await;
        gateway.stop().await;

        let event = event.ok_or(RcAuthError::UserCancelled)?;
        if let Some(expected) = expected_state
            && event.state.as_deref() != Some(expected)
        {
            return Err(RcAuthError::StateMismatch);
        }

        self.exchange_code(&event.code, on_error).await
    }

    /// Run the Xbox Live exchange chain with a Microsoft access token
    #[instrument(skip(self, access_token, on_error))]
    pub async fn complete_login<F>(
        &self,
        access_token: &AccessToken,
        relying_party: Option<&str>,
        on_error: F,
    ) -> Result<ExchangeOutcome<GameServiceToken>>
    where
        F: FnMut(&ExchangeErrorResponse),
    {
        if !self.config.is_microsoft() {
            return Err(RcAuthError::UnsupportedProvider(
                self.config.provider().name(),
            ));
        }

        self.exchange
            .run(access_token, relying_party, on_error)
            .await
    }
}
