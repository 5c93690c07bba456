use crate::models::DeviceAuthStateError;
use crate::tokens::AccessToken;

/// Result of a single request/response step whose failure is an expected
/// protocol answer rather than a fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Success(T),
    Failed(E),
}

impl<T, E> Outcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(self) -> Option<E> {
        match self {
            Self::Success(_) => None,
            Self::Failed(err) => Some(err),
        }
    }

    pub fn into_result(self) -> std::result::Result<T, E> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failed(err) => Err(err),
        }
    }
}

/// How a device authorization polling loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Authorized(AccessToken),
    /// The user declined the request
    Denied(DeviceAuthStateError),
    /// The server answered with a fatal error kind, including its own `expired_token`
    Failed(DeviceAuthStateError),
    /// The local deadline derived from `expires_in` passed without an answer
    Expired,
    Cancelled,
}

impl PollOutcome {
    pub fn token(self) -> Option<AccessToken> {
        match self {
            Self::Authorized(token) => Some(token),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Authorized(_) => "authorized".to_string(),
            Self::Denied(err) | Self::Failed(err) => match &err.error_description {
                Some(description) => format!("{:?}: {}", err.error, description),
                None => format!("{:?}", err.error),
            },
            Self::Expired => "device code expired".to_string(),
            Self::Cancelled => "cancelled".to_string(),
        }
    }
}
