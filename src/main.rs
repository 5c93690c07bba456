use anyhow::{Context, bail};
use rc_auth::{PollOutcome, ProviderConfig, RcAuthClient};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let client_id = std::env::args()
        .nth(1)
        .context("usage: rauncher-auth <azure-client-id>")?;
    let config = ProviderConfig::microsoft(client_id)
        .build()
        .context("invalid client configuration")?;
    let client = RcAuthClient::new(config)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling login");
                cancel.cancel();
            }
        }
    });

    let flow = client.device_flow();
    let grant = match flow
        .request_device_code(|err| warn!(error = %err.error, "Device code request refused"))
        .await?
        .into_result()
    {
        Ok(grant) => grant,
        Err(err) => bail!(
            "device code request refused: {}",
            err.error_description.unwrap_or(err.error)
        ),
    };

    match &grant.message {
        Some(message) => println!("{message}"),
        None => println!(
            "Open {} and enter the code {}",
            grant.verification_uri, grant.user_code
        ),
    }

    let token = match flow.poll_for_token(&grant, &cancel, |_| {}).await? {
        PollOutcome::Authorized(token) => token,
        other => bail!("login did not complete: {}", other.describe()),
    };
    info!("Microsoft account authorized");

    let game = match client
        .complete_login(&token, None, |_| {})
        .await?
        .into_result()
    {
        Ok(game) => game,
        Err(err) => match err.xsts_error {
            Some(xsts) => bail!("Xbox Live refused the account: {xsts}"),
            None => bail!(
                "{:?} step failed with HTTP {}: {}",
                err.step,
                err.status,
                err.message.unwrap_or(err.body)
            ),
        },
    };

    println!(
        "Logged in as {} (token valid until {})",
        game.username, game.expires_at
    );
    Ok(())
}
