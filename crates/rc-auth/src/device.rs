use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::callback::CallbackGateway;
use crate::config::{DEVICE_CODE_GRANT_TYPE, ProviderConfig};
use crate::errors::{RcAuthError, Result};
use crate::models::{CodeErrorResponse, DeviceAuthErrorKind, DeviceAuthStateError, DeviceCodeGrant};
use crate::outcome::{Outcome, PollOutcome};
use crate::tokens::AccessToken;
use crate::transport::Transport;

/// Lifecycle of one device authorization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAuthState {
    Idle,
    CodeRequested,
    Polling,
    Succeeded,
    Denied,
    Expired,
    Failed,
    Cancelled,
}

impl DeviceAuthState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Idle | Self::CodeRequested | Self::Polling)
    }
}

enum PollResponse {
    Token(AccessToken),
    Error(DeviceAuthStateError),
}

/// Decode the body before looking at it: an object carrying an `error`
/// member is an error answer, everything else must be a token
fn classify(body: &str) -> serde_json::Result<PollResponse> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    if value.get("error").is_some() {
        Ok(PollResponse::Error(serde_json::from_value(value)?))
    } else {
        Ok(PollResponse::Token(serde_json::from_value(value)?))
    }
}

fn as_pairs<'a>(form: &'a [(&'static str, String)]) -> Vec<(&'static str, &'a str)> {
    form.iter().map(|(k, v)| (*k, v.as_str())).collect()
}

/// A single OAuth2 device authorization attempt (RFC 8628)
///
/// Every attempt owns its state, timers and optional callback server, so any
/// number of them can run side by side on the same client.
pub struct DeviceAuthFlow {
    config: Arc<ProviderConfig>,
    transport: Arc<dyn Transport>,
    callback: Option<CallbackGateway>,
    state: watch::Sender<DeviceAuthState>,
}

impl DeviceAuthFlow {
    pub fn new(
        config: Arc<ProviderConfig>,
        transport: Arc<dyn Transport>,
        callback: Option<CallbackGateway>,
    ) -> Self {
        let (state, _) = watch::channel(DeviceAuthState::Idle);
        Self {
            config,
            transport,
            callback,
            state,
        }
    }

    pub fn state(&self) -> DeviceAuthState {
        *self.state.borrow()
    }

    /// Observe state transitions, e.g. to drive a login prompt
    pub fn subscribe(&self) -> watch::Receiver<DeviceAuthState> {
        self.state.subscribe()
    }

    pub fn callback(&self) -> Option<&CallbackGateway> {
        self.callback.as_ref()
    }

    fn transition(&self, next: DeviceAuthState) {
        let previous = self.state.send_replace(next);
        debug!(?previous, ?next, "Device flow state changed");
    }

    /// Ask the provider for a device code and user code
    ///
    /// On a non-success status the error body is handed to `on_error` and
    /// returned as [`Outcome::Failed`].
    #[instrument(skip_all, fields(provider = self.config.provider().name()))]
    pub async fn request_device_code<F>(
        &self,
        on_error: F,
    ) -> Result<Outcome<DeviceCodeGrant, CodeErrorResponse>>
    where
        F: FnOnce(&CodeErrorResponse),
    {
        let result = self.send_device_code_request(on_error).await;
        match &result {
            Ok(Outcome::Success(_)) => self.transition(DeviceAuthState::CodeRequested),
            _ => self.transition(DeviceAuthState::Failed),
        }
        result
    }

    async fn send_device_code_request<F>(
        &self,
        on_error: F,
    ) -> Result<Outcome<DeviceCodeGrant, CodeErrorResponse>>
    where
        F: FnOnce(&CodeErrorResponse),
    {
        let mut form = self.config.client_form();
        form.push(("scope", self.config.scope_param()));

        debug!("Requesting device code");
        let response = self
            .transport
            .post_form(&self.config.endpoints().device_code, &as_pairs(&form))
            .await?;

        if !response.is_success() {
            let err: CodeErrorResponse = serde_json::from_str(&response.body)
                .map_err(|_| RcAuthError::http(response.status, &response.body))?;
            warn!(status = %response.status, error = %err.error, "Device code request rejected");
            on_error(&err);
            return Ok(Outcome::Failed(err));
        }

        let grant: DeviceCodeGrant = serde_json::from_str(&response.body)?;
        info!(
            verification_uri = %grant.verification_uri,
            expires_in = grant.expires_in,
            interval = grant.interval,
            "Device code issued"
        );
        Ok(Outcome::Success(grant))
    }

    /// Poll the token endpoint until the user finishes, refuses, the code
    /// expires or `cancel` fires
    ///
    /// `authorization_pending` is retried silently and `slow_down` stretches
    /// the interval within the configured policy. Any other error kind is
    /// handed to `on_error` exactly once and ends the loop.
    #[instrument(
        skip_all,
        fields(
            provider = self.config.provider().name(),
            interval = grant.interval,
            expires_in = grant.expires_in
        )
    )]
    pub async fn poll_for_token<F>(
        &self,
        grant: &DeviceCodeGrant,
        cancel: &CancellationToken,
        on_error: F,
    ) -> Result<PollOutcome>
    where
        F: FnOnce(&DeviceAuthStateError),
    {
        self.transition(DeviceAuthState::Polling);
        let result = self.poll_loop(grant, cancel, on_error).await;
        self.transition(match &result {
            Ok(PollOutcome::Authorized(_)) => DeviceAuthState::Succeeded,
            Ok(PollOutcome::Denied(_)) => DeviceAuthState::Denied,
            Ok(PollOutcome::Expired) => DeviceAuthState::Expired,
            Ok(PollOutcome::Cancelled) => DeviceAuthState::Cancelled,
            Ok(PollOutcome::Failed(_)) | Err(_) => DeviceAuthState::Failed,
        });
        result
    }

    async fn poll_loop<F>(
        &self,
        grant: &DeviceCodeGrant,
        cancel: &CancellationToken,
        on_error: F,
    ) -> Result<PollOutcome>
    where
        F: FnOnce(&DeviceAuthStateError),
    {
        let policy = self.config.poll_policy();
        let lifetime = Duration::from_secs(grant.expires_in);
        let Some(deadline) = Instant::now().checked_add(lifetime) else {
            return Err(RcAuthError::InvalidResponse(format!(
                "device code lifetime out of range: {}s",
                grant.expires_in
            )));
        };
        let mut interval = Duration::from_secs(grant.interval).max(policy.min_interval);
        let mut slow_downs = 0;
        let mut attempt = 0u32;

        let mut form = self.config.client_form();
        form.push(("device_code", grant.device_code.clone()));
        form.push(("grant_type", DEVICE_CODE_GRANT_TYPE.to_string()));
        let pairs = as_pairs(&form);
        let token_url = &self.config.endpoints().token;

        while Instant::now() < deadline {
            if cancel.is_cancelled() {
                info!(attempt, "Device authorization cancelled");
                return Ok(PollOutcome::Cancelled);
            }

            attempt += 1;
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(attempt, "Device authorization cancelled while polling");
                    return Ok(PollOutcome::Cancelled);
                }
                response = self.transport.post_form(token_url, &pairs) => response?,
            };

            let answer = classify(&response.body)
                .map_err(|_| RcAuthError::http(response.status, &response.body))?;

            match answer {
                PollResponse::Token(token) => {
                    info!(attempt, "Device authorization granted");
                    if let Some(callback) = &self.callback {
                        callback.stop().await;
                    }
                    return Ok(PollOutcome::Authorized(token));
                }
                PollResponse::Error(err) => match err.error {
                    DeviceAuthErrorKind::AuthorizationPending => {
                        debug!(attempt, "Authorization pending");
                    }
                    DeviceAuthErrorKind::SlowDown if slow_downs < policy.max_slow_downs => {
                        slow_downs += 1;
                        interval = interval.saturating_add(policy.slow_down_step);
                        warn!(
                            attempt,
                            interval_secs = interval.as_secs(),
                            "Token endpoint asked to slow down"
                        );
                    }
                    kind => {
                        warn!(attempt, ?kind, "Device authorization ended with an error");
                        on_error(&err);
                        return Ok(if kind.is_denial() {
                            PollOutcome::Denied(err)
                        } else {
                            PollOutcome::Failed(err)
                        });
                    }
                },
            }

            let wake = Instant::now()
                .checked_add(interval)
                .map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(attempt, "Device authorization cancelled");
                    return Ok(PollOutcome::Cancelled);
                }
                _ = sleep_until(wake) => {}
            }
        }

        warn!(attempt, "Device code expired before authorization completed");
        Ok(PollOutcome::Expired)
    }
}
