use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{ExchangeEndpoints, RP_MINECRAFT};
use crate::errors::Result;
use crate::models::{
    ExchangeErrorResponse, ExchangeStep, McLoginRequest, McLoginResponse, XblAuthRequest,
    XboxTokenResponse, XstsAuthRequest,
};
use crate::outcome::Outcome;
use crate::tokens::{AccessToken, ExchangeToken, GameServiceToken, XstsToken};
use crate::transport::{HttpResponse, Transport};

pub type ExchangeOutcome<T> = Outcome<T, ExchangeErrorResponse>;

/// Identity provider token → Xbox user token → XSTS token → game service token
///
/// Every step is a pure request/response pair; nothing is cached between calls.
#[derive(Clone)]
pub struct ExchangeChain {
    transport: Arc<dyn Transport>,
    endpoints: ExchangeEndpoints,
}

impl ExchangeChain {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_endpoints(transport, ExchangeEndpoints::default())
    }

    pub fn with_endpoints(transport: Arc<dyn Transport>, endpoints: ExchangeEndpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &ExchangeEndpoints {
        &self.endpoints
    }

    async fn send<R: Serialize>(&self, url: &Url, request: &R) -> Result<HttpResponse> {
        let body = serde_json::to_value(request)?;
        self.transport.post_json(url, &body).await
    }

    fn finish<T, F>(
        step: ExchangeStep,
        response: HttpResponse,
        on_error: F,
    ) -> Result<ExchangeOutcome<T>>
    where
        T: DeserializeOwned,
        F: FnOnce(&ExchangeErrorResponse),
    {
        if !response.is_success() {
            let err =
                ExchangeErrorResponse::from_raw(step, response.status.as_u16(), response.body);
            warn!(?step, status = err.status, xsts_error = ?err.xsts_error, "Exchange step failed");
            on_error(&err);
            return Ok(Outcome::Failed(err));
        }

        Ok(Outcome::Success(serde_json::from_str(&response.body)?))
    }

    /// Trade the identity provider access token for an Xbox Live user token
    #[instrument(skip_all)]
    pub async fn xbox_authenticate<F>(
        &self,
        access_token: &AccessToken,
        on_error: F,
    ) -> Result<ExchangeOutcome<ExchangeToken>>
    where
        F: FnOnce(&ExchangeErrorResponse),
    {
        let url = &self.endpoints.xbl_authenticate;

        debug!("Authenticating with Xbox Live");
        let request = XblAuthRequest::new(format!("d={}", access_token.access_token));
        let mut response = self.send(url, &request).await?;

        if response.status == reqwest::StatusCode::BAD_REQUEST {
            warn!("Xbox Live rejected the 'd=' ticket, retrying with the bare token");
            let request = XblAuthRequest::new(access_token.access_token.clone());
            response = self.send(url, &request).await?;
        }

        match Self::finish::<XboxTokenResponse, _>(ExchangeStep::XboxUser, response, on_error)? {
            Outcome::Success(body) => Ok(Outcome::Success(ExchangeToken::try_from(body)?)),
            Outcome::Failed(err) => Ok(Outcome::Failed(err)),
        }
    }

    /// Trade an Xbox user token for an XSTS token scoped to `relying_party`,
    /// the game service when `None`
    #[instrument(skip(self, exchange_token, on_error))]
    pub async fn xsts_authorize_with<F>(
        &self,
        exchange_token: &ExchangeToken,
        relying_party: Option<&str>,
        on_error: F,
    ) -> Result<ExchangeOutcome<XstsToken>>
    where
        F: FnOnce(&ExchangeErrorResponse),
    {
        let request =
            XstsAuthRequest::new(&exchange_token.token, relying_party.unwrap_or(RP_MINECRAFT));

        debug!(relying_party = %request.relying_party, "Authorizing with XSTS");
        let response = self.send(&self.endpoints.xsts_authorize, &request).await?;

        match Self::finish::<XboxTokenResponse, _>(ExchangeStep::Xsts, response, on_error)? {
            Outcome::Success(body) => Ok(Outcome::Success(XstsToken::try_from(body)?)),
            Outcome::Failed(err) => Ok(Outcome::Failed(err)),
        }
    }

    /// [`Self::xsts_authorize_with`] without an error handler
    pub async fn xsts_authorize(
        &self,
        exchange_token: &ExchangeToken,
        relying_party: Option<&str>,
    ) -> Result<ExchangeOutcome<XstsToken>> {
        self.xsts_authorize_with(exchange_token, relying_party, |_| {})
            .await
    }

    /// Log in to the game service with an XSTS token
    #[instrument(skip_all)]
    pub async fn game_service_login<F>(
        &self,
        xsts_token: &XstsToken,
        on_error: F,
    ) -> Result<ExchangeOutcome<GameServiceToken>>
    where
        F: FnOnce(&ExchangeErrorResponse),
    {
        let request = McLoginRequest::new(&xsts_token.uhs, &xsts_token.token);

        debug!("Logging in to Minecraft Services");
        let response = self.send(&self.endpoints.game_login, &request).await?;

        match Self::finish::<McLoginResponse, _>(ExchangeStep::GameService, response, on_error)? {
            Outcome::Success(body) => Ok(Outcome::Success(GameServiceToken::try_from(body)?)),
            Outcome::Failed(err) => Ok(Outcome::Failed(err)),
        }
    }

    /// Run all three steps in order, stopping at the first failure
    #[instrument(skip(self, access_token, on_error))]
    pub async fn run<F>(
        &self,
        access_token: &AccessToken,
        relying_party: Option<&str>,
        mut on_error: F,
    ) -> Result<ExchangeOutcome<GameServiceToken>>
    where
        F: FnMut(&ExchangeErrorResponse),
    {
        let user = match self.xbox_authenticate(access_token, &mut on_error).await? {
            Outcome::Success(token) => token,
            Outcome::Failed(err) => return Ok(Outcome::Failed(err)),
        };

        let xsts = match self
            .xsts_authorize_with(&user, relying_party, &mut on_error)
            .await?
        {
            Outcome::Success(token) => token,
            Outcome::Failed(err) => return Ok(Outcome::Failed(err)),
        };

        self.game_service_login(&xsts, &mut on_error).await
    }
}
