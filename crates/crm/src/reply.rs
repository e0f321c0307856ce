use serde_json::Value;

use crate::error::CrmError;

pub const RESULT_KEY: &str = "result";
pub const ERROR_KEY: &str = "error";
const ERROR_DESCRIPTION_KEY: &str = "error_description";

pub const NO_AUTH_FOUND: &str = "NO_AUTH_FOUND";
pub const EXPIRED_TOKEN: &str = "expired_token";
pub const QUERY_LIMIT_EXCEEDED: &str = "QUERY_LIMIT_EXCEEDED";

/// A decoded CRM response body.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    Result(Value),
    Error(DeclaredError),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DeclaredError {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorClass {
    AuthExpired,
    RateLimited,
    Other,
}

impl DeclaredError {
    pub fn class(&self) -> ErrorClass {
        match self.code.as_str() {
            NO_AUTH_FOUND | EXPIRED_TOKEN => ErrorClass::AuthExpired,
            QUERY_LIMIT_EXCEEDED => ErrorClass::RateLimited,
            _ => ErrorClass::Other,
        }
    }
}

impl From<DeclaredError> for CrmError {
    fn from(e: DeclaredError) -> Self {
        CrmError::Api {
            code: e.code,
            description: e.description,
        }
    }
}

/// Classify a raw response body. An `error` key takes precedence over
/// `result`, matching how the CRM reports partial failures.
pub(crate) fn parse_reply(method: &str, body: &str) -> Result<Reply, CrmError> {
    let value: Value = serde_json::from_str(body).map_err(|_| CrmError::Decode {
        body: body.to_string(),
    })?;
    let Value::Object(mut object) = value else {
        return Err(CrmError::Decode {
            body: body.to_string(),
        });
    };

    if let Some(code) = object.get(ERROR_KEY) {
        let code = match code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let description = object
            .get(ERROR_DESCRIPTION_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(Reply::Error(DeclaredError { code, description }));
    }

    match object.remove(RESULT_KEY) {
        Some(result) => Ok(Reply::Result(result)),
        None => Err(CrmError::UnexpectedShape {
            method: method.to_string(),
            body: body.to_string(),
        }),
    }
}
