//! OAuth2 device authorization and Xbox Live token exchange for Minecraft launchers
//!
//! # Authentication Flow
//!
//! 1. Request a device code from the identity provider and show the user code
//! 2. Poll the token endpoint until the user approves, refuses or the code expires
//! 3. Xbox Live user authentication
//! 4. XSTS authorization for a relying party
//! 5. Minecraft Services login
//!
//! Microsoft is the only provider whose tokens the Xbox Live chain accepts;
//! Keycloak and authentik configurations cover steps 1 and 2 and the browser grant.
//!
//! # Example
//!
//! ```no_run
//! use rc_auth::{PollOutcome, ProviderConfig, RcAuthClient};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ProviderConfig::microsoft("00000000-0000-0000-0000-000000000000").build()?;
//!     let client = RcAuthClient::new(config)?;
//!
//!     let flow = client.device_flow();
//!     let grant = flow
//!         .request_device_code(|err| eprintln!("device code refused: {}", err.error))
//!         .await?
//!         .into_result()
//!         .map_err(|err| anyhow::anyhow!(err.error))?;
//!     println!("Visit {} and enter {}", grant.verification_uri, grant.user_code);
//!
//!     let cancel = CancellationToken::new();
//!     let token = match flow.poll_for_token(&grant, &cancel, |_| {}).await? {
//!         PollOutcome::Authorized(token) => token,
//!         other => anyhow::bail!("login failed: {}", other.describe()),
//!     };
//!
//!     if let Some(mc) = client.complete_login(&token, None, |_| {}).await?.success() {
//!         println!("Logged in as {}", mc.username);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Important Notes
//!
//! - Every device flow attempt is independent; start as many as you like from one client
//! - Tokens are never logged
//! - The MC access token expires after 24 hours and needs a new exchange

pub mod callback;
pub mod client;
pub mod config;
pub mod device;
pub mod errors;
pub mod exchange;
pub mod models;
pub mod outcome;
pub mod tokens;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export main types
pub use callback::{CallbackEvent, CallbackGateway, CallbackServer};
pub use client::{RcAuthClient, TokenOutcome};
pub use config::{
    ExchangeEndpoints, PollPolicy, Provider, ProviderConfig, ProviderConfigBuilder,
    ProviderEndpoints, Tenant, TransportConfig,
};
pub use device::{DeviceAuthFlow, DeviceAuthState};
pub use errors::{RcAuthError, Result, XstsError};
pub use exchange::{ExchangeChain, ExchangeOutcome};
pub use models::{
    CodeErrorResponse, DeviceAuthErrorKind, DeviceAuthStateError, DeviceCodeGrant,
    ExchangeErrorResponse, ExchangeStep,
};
pub use outcome::{Outcome, PollOutcome};
pub use tokens::{AccessToken, ExchangeToken, GameServiceToken, XstsToken};
pub use transport::{HttpResponse, HttpTransport, Transport};
