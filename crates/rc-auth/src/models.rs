use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::XstsError;

/// Device authorization endpoint response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCodeGrant {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    /// Lifetime of the device code in seconds
    pub expires_in: u64,
    /// Minimum seconds between two polls
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Localized instructions, Microsoft only
    #[serde(default)]
    pub message: Option<String>,
}

fn default_interval() -> u64 {
    5
}

/// OAuth2 error body returned by the device authorization and token endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_codes: Vec<u64>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// Error kinds the token endpoint answers with while a device code is polled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceAuthErrorKind {
    AuthorizationPending,
    SlowDown,
    ExpiredToken,
    AccessDenied,
    AuthorizationDeclined,
    BadVerificationCode,
    InvalidGrant,
    InvalidClient,
    #[serde(other)]
    Unknown,
}

impl DeviceAuthErrorKind {
    /// The user (or an administrator) refused the grant
    pub fn is_denial(self) -> bool {
        matches!(self, Self::AccessDenied | Self::AuthorizationDeclined)
    }
}

/// Token endpoint error body received while polling a device code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuthStateError {
    pub error: DeviceAuthErrorKind,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_codes: Vec<u64>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// Xbox Live user.authenticate request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XblAuthRequest {
    pub properties: XblAuthProperties,
    pub relying_party: String,
    pub token_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XblAuthProperties {
    pub auth_method: String,
    pub site_name: String,
    pub rps_ticket: String,
}

impl XblAuthRequest {
    pub fn new(rps_ticket: String) -> Self {
        Self {
            properties: XblAuthProperties {
                auth_method: "RPS".to_string(),
                site_name: "user.auth.xboxlive.com".to_string(),
                rps_ticket,
            },
            relying_party: crate::config::RP_XBL_AUTH.to_string(),
            token_type: "JWT".to_string(),
        }
    }
}

/// Response shared by user.authenticate and xsts.authorize
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XboxTokenResponse {
    pub token: String,
    pub display_claims: DisplayClaims,
    #[serde(default)]
    pub issue_instant: Option<DateTime<Utc>>,
    pub not_after: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayClaims {
    pub xui: Vec<XboxUserInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XboxUserInfo {
    pub uhs: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtg: Option<String>,
}

/// XSTS authorize request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XstsAuthRequest {
    pub properties: XstsAuthProperties,
    pub relying_party: String,
    pub token_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XstsAuthProperties {
    pub sandbox_id: String,
    pub user_tokens: Vec<String>,
}

impl XstsAuthRequest {
    pub fn new(user_token: &str, relying_party: &str) -> Self {
        Self {
            properties: XstsAuthProperties {
                sandbox_id: "RETAIL".to_string(),
                user_tokens: vec![user_token.to_string()],
            },
            relying_party: relying_party.to_string(),
            token_type: "JWT".to_string(),
        }
    }
}

/// Minecraft login_with_xbox request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McLoginRequest {
    pub identity_token: String,
}

impl McLoginRequest {
    pub fn new(user_hash: &str, xsts_token: &str) -> Self {
        Self {
            identity_token: format!("XBL3.0 x={};{}", user_hash, xsts_token),
        }
    }
}

/// Minecraft login_with_xbox response
#[derive(Debug, Clone, Deserialize)]
pub struct McLoginResponse {
    pub username: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Error body of the Xbox and Minecraft services, every field optional
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct PlatformErrorBody {
    #[serde(rename = "XErr", default)]
    pub xerr: Option<u64>,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Which link of the exchange chain produced a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeStep {
    XboxUser,
    Xsts,
    GameService,
}

/// Failed exchange step, raw response included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeErrorResponse {
    pub step: ExchangeStep,
    pub status: u16,
    pub body: String,
    /// Decoded `XErr`, XSTS only
    pub xsts_error: Option<XstsError>,
    pub message: Option<String>,
}

impl ExchangeErrorResponse {
    pub(crate) fn from_raw(step: ExchangeStep, status: u16, body: String) -> Self {
        let decoded: PlatformErrorBody = serde_json::from_str(&body).unwrap_or_default();
        let message = decoded
            .message
            .filter(|m| !m.is_empty())
            .or(decoded.error_message)
            .or(decoded.error);

        Self {
            step,
            status,
            xsts_error: decoded.xerr.map(XstsError::from_xerr),
            message,
            body,
        }
    }
}
