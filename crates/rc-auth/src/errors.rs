use thiserror::Error;

/// Hard failures of the authentication client.
///
/// Expected protocol conditions (pending authorization, denied grants,
/// structured 4xx/5xx bodies) never show up here; they are reported as
/// [`Outcome::Failed`](crate::Outcome) or [`PollOutcome`](crate::PollOutcome).
#[derive(Error, Debug)]
pub enum RcAuthError {
    #[error("Client id is not set")]
    MissingClientId,

    #[error("Client id is not valid for {provider}: {client_id}")]
    InvalidClientId {
        provider: &'static str,
        client_id: String,
    },

    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),

    #[error("Provider {0} cannot be used for this operation")]
    UnsupportedProvider(&'static str),

    #[error("User cancelled the authentication flow")]
    UserCancelled,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid redirect URI or missing code")]
    InvalidRedirect,

    #[error("OAuth state mismatch - possible CSRF attack")]
    StateMismatch,

    #[error("Callback server error: {0}")]
    CallbackServer(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RcAuthError {
    pub(crate) fn http(status: reqwest::StatusCode, body: &str) -> Self {
        Self::Http {
            status,
            body_snippet: body.chars().take(200).collect(),
        }
    }
}

/// XSTS-specific error codes from XErr field
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum XstsError {
    #[error("Account doesn't have an Xbox account (XErr: 2148916233)")]
    NoXboxAccount,

    #[error("Xbox Live not available in this country (XErr: 2148916235)")]
    RegionNotSupported,

    #[error("Adult verification required on Xbox page (XErr: 2148916236/2148916237)")]
    AdultVerificationRequired,

    #[error("Child account requires Family (XErr: 2148916238)")]
    ChildAccountRequiresFamily,

    #[error("Unknown XSTS error code: {0}")]
    Unknown(u64),
}

impl XstsError {
    /// Parse XErr code from XSTS response
    pub fn from_xerr(code: u64) -> Self {
        match code {
            2148916233 => Self::NoXboxAccount,
            2148916235 => Self::RegionNotSupported,
            2148916236 | 2148916237 => Self::AdultVerificationRequired,
            2148916238 => Self::ChildAccountRequiresFamily,
            code => Self::Unknown(code),
        }
    }
}

pub type Result<T> = std::result::Result<T, RcAuthError>;
