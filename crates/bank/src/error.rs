use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong talking to the bank. Transport and decoding
/// failures are folded into these variants; the client never panics on a bad
/// response.
#[derive(Debug, Error)]
pub enum BankError {
    #[error("Timeout waiting for bank API response [{timeout:?}]")]
    Timeout { timeout: Duration },
    #[error("Cannot reach bank API, max retries exceeded [{retries}]: {message}")]
    Connection { retries: u32, message: String },
    #[error("Error on decode bank API response [{body}]")]
    Decode { body: String },
    #[error("Bank API returned an error: {message}")]
    Api { message: String, code: Option<String> },
    #[error("Bank API still rate limiting after {attempts} attempts [{body}]")]
    RateLimited { attempts: u32, body: String },
    #[error("Unexpected bank API response ({reason}) [{body}]")]
    UnexpectedShape { reason: String, body: String },
    #[error("Cannot build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl BankError {
    pub fn kind(&self) -> &'static str {
        match self {
            BankError::Timeout { .. } => "timeout",
            BankError::Connection { .. } => "connection",
            BankError::Decode { .. } => "decode",
            BankError::Api { .. } => "api",
            BankError::RateLimited { .. } => "rate_limited",
            BankError::UnexpectedShape { .. } => "unexpected_shape",
            BankError::Client(_) => "client",
        }
    }

    pub(crate) fn from_transport(e: reqwest::Error, timeout: Duration, retries: u32) -> Self {
        if e.is_timeout() {
            BankError::Timeout { timeout }
        } else {
            BankError::Connection {
                retries,
                message: e.to_string(),
            }
        }
    }
}
