use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use url::Url;

use crate::errors::{RcAuthError, Result};

/// Identity provider and platform endpoints
pub mod endpoints {
    pub const MS_LOGIN_BASE: &str = "https://login.microsoftonline.com";
    pub const XBL_AUTHENTICATE: &str = "https://user.auth.xboxlive.com/user/authenticate";
    pub const XSTS_AUTHORIZE: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
    pub const MC_LOGIN: &str = "https://api.minecraftservices.com/authentication/login_with_xbox";
}

/// Relying parties
pub const RP_MINECRAFT: &str = "rp://api.minecraftservices.com/";
pub const RP_XBOXLIVE: &str = "http://xboxlive.com";
pub const RP_XBL_AUTH: &str = "http://auth.xboxlive.com";

/// OAuth2 grant type used while polling the token endpoint (RFC 8628)
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Time skew for token expiration (refresh 5 minutes early)
pub const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(300);

const MICROSOFT_SCOPES: &[&str] = &["XboxLive.signin", "offline_access"];
const OIDC_SCOPES: &[&str] = &["openid", "offline_access"];

static MICROSOFT_CLIENT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$")
        .expect("valid client id pattern")
});

/// Microsoft identity platform tenant
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Tenant {
    Common,
    /// Personal Microsoft accounts only, required for Xbox Live
    #[default]
    Consumers,
    Organizations,
    Custom(String),
}

impl Tenant {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Common => "common",
            Self::Consumers => "consumers",
            Self::Organizations => "organizations",
            Self::Custom(id) => id,
        }
    }
}

/// Supported identity providers, resolved once when the configuration is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    Microsoft { tenant: Tenant },
    Keycloak { base_url: Url, realm: String },
    Authentik { base_url: Url },
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Microsoft { .. } => "microsoft",
            Self::Keycloak { .. } => "keycloak",
            Self::Authentik { .. } => "authentik",
        }
    }

    fn validate_client_id(&self, client_id: &str) -> Result<()> {
        if client_id.trim().is_empty() {
            return Err(RcAuthError::MissingClientId);
        }

        if let Self::Microsoft { .. } = self
            && !MICROSOFT_CLIENT_ID.is_match(client_id)
        {
            return Err(RcAuthError::InvalidClientId {
                provider: self.name(),
                client_id: client_id.to_string(),
            });
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Microsoft {
                tenant: Tenant::Custom(id),
            } if id.trim().is_empty() => Err(RcAuthError::InvalidConfig(
                "custom tenant must not be empty".to_string(),
            )),
            Self::Keycloak { realm, .. } if realm.trim().is_empty() => Err(
                RcAuthError::InvalidConfig("keycloak realm must not be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }

    fn default_scopes(&self) -> &'static [&'static str] {
        match self {
            Self::Microsoft { .. } => MICROSOFT_SCOPES,
            Self::Keycloak { .. } | Self::Authentik { .. } => OIDC_SCOPES,
        }
    }

    fn default_endpoints(&self) -> Result<ProviderEndpoints> {
        match self {
            Self::Microsoft { tenant } => {
                let base = Url::parse(endpoints::MS_LOGIN_BASE)?;
                let oauth =
                    |leaf: &str| join_segments(&base, &[tenant.as_str(), "oauth2", "v2.0", leaf]);
                Ok(ProviderEndpoints {
                    authorize: oauth("authorize")?,
                    token: oauth("token")?,
                    device_code: oauth("devicecode")?,
                })
            }
            Self::Keycloak { base_url, realm } => {
                let oidc = |tail: &[&str]| {
                    let mut segments = vec!["realms", realm.as_str(), "protocol", "openid-connect"];
                    segments.extend_from_slice(tail);
                    join_segments(base_url, &segments)
                };
                Ok(ProviderEndpoints {
                    authorize: oidc(&["auth"])?,
                    token: oidc(&["token"])?,
                    device_code: oidc(&["auth", "device"])?,
                })
            }
            // authentik expects the trailing slash on its OAuth2 routes
            Self::Authentik { base_url } => Ok(ProviderEndpoints {
                authorize: join_segments(base_url, &["application", "o", "authorize", ""])?,
                token: join_segments(base_url, &["application", "o", "token", ""])?,
                device_code: join_segments(base_url, &["application", "o", "device", ""])?,
            }),
        }
    }
}

fn join_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| RcAuthError::InvalidConfig(format!("{base} cannot be used as a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Resolved OAuth2 endpoints of the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorize: Url,
    pub token: Url,
    pub device_code: Url,
}

/// Platform endpoints used by the token exchange chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeEndpoints {
    pub xbl_authenticate: Url,
    pub xsts_authorize: Url,
    pub game_login: Url,
}

impl Default for ExchangeEndpoints {
    fn default() -> Self {
        Self {
            xbl_authenticate: Url::parse(endpoints::XBL_AUTHENTICATE).expect("valid XBL URL"),
            xsts_authorize: Url::parse(endpoints::XSTS_AUTHORIZE).expect("valid XSTS URL"),
            game_login: Url::parse(endpoints::MC_LOGIN).expect("valid login URL"),
        }
    }
}

/// Device flow polling policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// How many `slow_down` answers are tolerated before polling gives up
    pub max_slow_downs: u32,
    /// Interval increase applied on every `slow_down`
    pub slow_down_step: Duration,
    /// Lower bound for the server supplied interval
    pub min_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_slow_downs: 3,
            slow_down_step: Duration::from_secs(5),
            min_interval: Duration::from_secs(1),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// Settings for the reqwest backed transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub http_timeouts: HttpTimeouts,
    pub user_agent: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some("rauncher-auth".to_string()),
        }
    }
}

/// Validated, immutable identity provider configuration
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    provider: Provider,
    client_id: String,
    client_secret: Option<String>,
    scopes: Vec<String>,
    endpoints: ProviderEndpoints,
    redirect_uri: Option<Url>,
    poll_policy: PollPolicy,
}

impl ProviderConfig {
    /// Start configuring a Microsoft identity platform client
    pub fn microsoft(client_id: impl Into<String>) -> ProviderConfigBuilder {
        ProviderConfigBuilder::new(
            Provider::Microsoft {
                tenant: Tenant::default(),
            },
            client_id.into(),
        )
    }

    pub fn keycloak(
        client_id: impl Into<String>,
        base_url: Url,
        realm: impl Into<String>,
    ) -> ProviderConfigBuilder {
        ProviderConfigBuilder::new(
            Provider::Keycloak {
                base_url,
                realm: realm.into(),
            },
            client_id.into(),
        )
    }

    pub fn authentik(client_id: impl Into<String>, base_url: Url) -> ProviderConfigBuilder {
        ProviderConfigBuilder::new(Provider::Authentik { base_url }, client_id.into())
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Scopes in the space separated form used on the wire
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    pub fn redirect_uri(&self) -> Option<&Url> {
        self.redirect_uri.as_ref()
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll_policy
    }

    pub fn is_microsoft(&self) -> bool {
        matches!(self.provider, Provider::Microsoft { .. })
    }

    /// Client credentials as form parameters, secret included when configured
    pub(crate) fn client_form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![("client_id", self.client_id.clone())];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        form
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("scopes", &self.scopes)
            .field("endpoints", &self.endpoints)
            .field("redirect_uri", &self.redirect_uri)
            .field("poll_policy", &self.poll_policy)
            .finish()
    }
}

/// Builder for [`ProviderConfig`]; nothing is validated until [`build`](Self::build)
#[derive(Debug, Clone)]
pub struct ProviderConfigBuilder {
    provider: Provider,
    client_id: String,
    client_secret: Option<String>,
    scopes: Vec<String>,
    tenant: Option<Tenant>,
    endpoints: Option<ProviderEndpoints>,
    redirect_uri: Option<Url>,
    poll_policy: PollPolicy,
}

impl ProviderConfigBuilder {
    fn new(provider: Provider, client_id: String) -> Self {
        Self {
            provider,
            client_id,
            client_secret: None,
            scopes: Vec::new(),
            tenant: None,
            endpoints: None,
            redirect_uri: None,
            poll_policy: PollPolicy::default(),
        }
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Microsoft tenant, defaults to [`Tenant::Consumers`]
    pub fn tenant(mut self, tenant: Tenant) -> Self {
        self.tenant = Some(tenant);
        self
    }

    /// Replace the provider's derived endpoints
    pub fn endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Loopback redirect target for the browser based grant
    pub fn redirect_uri(mut self, redirect_uri: Url) -> Self {
        self.redirect_uri = Some(redirect_uri);
        self
    }

    pub fn poll_policy(mut self, poll_policy: PollPolicy) -> Self {
        self.poll_policy = poll_policy;
        self
    }

    pub fn build(self) -> Result<ProviderConfig> {
        let mut provider = self.provider;
        if let Some(tenant) = self.tenant {
            match &mut provider {
                Provider::Microsoft { tenant: current } => *current = tenant,
                other => {
                    return Err(RcAuthError::InvalidConfig(format!(
                        "tenant does not apply to the {} provider",
                        other.name()
                    )));
                }
            }
        }

        provider.validate_client_id(&self.client_id)?;
        provider.validate()?;

        let mut scopes: Vec<String> = Vec::new();
        let requested = if self.scopes.is_empty() {
            provider
                .default_scopes()
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.scopes
        };
        for scope in requested {
            if scope.is_empty() || scope.contains(char::is_whitespace) {
                return Err(RcAuthError::InvalidConfig(format!(
                    "invalid scope {scope:?}"
                )));
            }
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }

        let endpoints = match self.endpoints {
            Some(endpoints) => endpoints,
            None => provider.default_endpoints()?,
        };

        Ok(ProviderConfig {
            provider,
            client_id: self.client_id,
            client_secret: self.client_secret.filter(|s| !s.is_empty()),
            scopes,
            endpoints,
            redirect_uri: self.redirect_uri,
            poll_policy: self.poll_policy,
        })
    }
}
