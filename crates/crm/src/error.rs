use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("Timeout waiting for CRM response [{timeout:?}]")]
    Timeout { timeout: Duration },
    #[error("Cannot reach CRM: {message}")]
    Connection { message: String },
    #[error("Error on decode CRM response [{body}]")]
    Decode { body: String },
    #[error("CRM method {method} returned neither result nor error [{body}]")]
    UnexpectedShape { method: String, body: String },
    #[error("CRM error {code}: {description}")]
    Api { code: String, description: String },
    #[error("CRM still rate limiting after {attempts} attempts")]
    RateLimited { attempts: u32 },
    #[error("Error on decode OAuth response [{body}]")]
    OAuthDecode { body: String },
    #[error("OAuth refresh rejected: {error} {description}")]
    OAuthRejected { error: String, description: String },
    #[error("Invalid batch structure: `halt` and `cmd` are required")]
    InvalidBatch,
    #[error("Cannot build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl CrmError {
    pub fn kind(&self) -> &'static str {
        match self {
            CrmError::Timeout { .. } => "timeout",
            CrmError::Connection { .. } => "connection",
            CrmError::Decode { .. } => "decode",
            CrmError::UnexpectedShape { .. } => "unexpected_shape",
            CrmError::Api { .. } => "api",
            CrmError::RateLimited { .. } => "rate_limited",
            CrmError::OAuthDecode { .. } => "oauth_decode",
            CrmError::OAuthRejected { .. } => "oauth_rejected",
            CrmError::InvalidBatch => "invalid_batch",
            CrmError::Client(_) => "client",
        }
    }

    /// Upstream error code, for errors the CRM itself declared.
    pub fn code(&self) -> Option<&str> {
        match self {
            CrmError::Api { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    pub(crate) fn from_transport(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            CrmError::Timeout { timeout }
        } else {
            CrmError::Connection {
                message: e.to_string(),
            }
        }
    }
}
