use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{RcAuthError, Result};
use crate::models::{DisplayClaims, McLoginResponse, XboxTokenResponse};

/// Identity provider token response (device code, authorization code and refresh grants)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_expires_in: Option<u64>,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Xbox Live user token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeToken {
    pub token: String,
    pub uhs: String,
    pub display_claims: DisplayClaims,
    pub issue_instant: Option<DateTime<Utc>>,
    pub not_after: DateTime<Utc>,
}

impl ExchangeToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.not_after
    }
}

impl TryFrom<XboxTokenResponse> for ExchangeToken {
    type Error = RcAuthError;

    fn try_from(response: XboxTokenResponse) -> Result<Self> {
        let uhs = user_hash(&response.display_claims)?;
        Ok(Self {
            token: response.token,
            uhs,
            display_claims: response.display_claims,
            issue_instant: response.issue_instant,
            not_after: response.not_after,
        })
    }
}

/// XSTS token scoped to a relying party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XstsToken {
    pub token: String,
    pub uhs: String,
    pub display_claims: DisplayClaims,
    pub issue_instant: Option<DateTime<Utc>>,
    pub not_after: DateTime<Utc>,
}

impl XstsToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.not_after
    }

    /// Xbox user id, only present for relying parties that expose it
    pub fn xuid(&self) -> Option<&str> {
        self.display_claims.xui.first()?.xid.as_deref()
    }

    pub fn gamertag(&self) -> Option<&str> {
        self.display_claims.xui.first()?.gtg.as_deref()
    }
}

impl TryFrom<XboxTokenResponse> for XstsToken {
    type Error = RcAuthError;

    fn try_from(response: XboxTokenResponse) -> Result<Self> {
        let uhs = user_hash(&response.display_claims)?;
        Ok(Self {
            token: response.token,
            uhs,
            display_claims: response.display_claims,
            issue_instant: response.issue_instant,
            not_after: response.not_after,
        })
    }
}

fn user_hash(claims: &DisplayClaims) -> Result<String> {
    Ok(claims
        .xui
        .first()
        .ok_or_else(|| RcAuthError::InvalidResponse("Missing XUI claims".to_string()))?
        .uhs
        .clone())
}

/// Minecraft services access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameServiceToken {
    pub username: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
}

impl GameServiceToken {
    pub fn is_expired(&self) -> bool {
        use crate::config::TOKEN_EXPIRY_SKEW;
        let skew_duration = chrono::Duration::from_std(TOKEN_EXPIRY_SKEW)
            .unwrap_or(chrono::Duration::seconds(300));
        Utc::now() + skew_duration >= self.expires_at
    }
}

impl TryFrom<McLoginResponse> for GameServiceToken {
    type Error = RcAuthError;

    fn try_from(response: McLoginResponse) -> Result<Self> {
        let expires_at = i64::try_from(response.expires_in)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                RcAuthError::InvalidResponse(format!(
                    "game token lifetime out of range: {}s",
                    response.expires_in
                ))
            })?;
        Ok(Self {
            username: response.username,
            access_token: response.access_token,
            token_type: response.token_type,
            expires_in: response.expires_in,
            expires_at,
        })
    }
}
