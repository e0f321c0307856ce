use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Bank API access. Both fields are optional so a half-filled secrets file
/// can be reported instead of failing to parse.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankCredentials {
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl BankCredentials {
    pub fn new(account_number: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            account_number: Some(account_number.into()),
            auth_token: Some(auth_token.into()),
        }
    }

    /// Account number and token, if both are present and non-empty.
    pub fn complete(&self) -> Option<(&str, &str)> {
        let account = self.account_number.as_deref().filter(|s| !s.trim().is_empty())?;
        let token = self.auth_token.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((account, token))
    }
}

impl fmt::Debug for BankCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BankCredentials")
            .field("account_number", &self.account_number)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// CRM OAuth application and token pair. The token fields change on every
/// refresh; the rest is fixed for the installation.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmCredentials {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl CrmCredentials {
    /// The fields rewritten after a token refresh.
    pub fn token_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("auth_token".into(), Value::from(self.auth_token.clone()));
        fields.insert("refresh_token".into(), Value::from(self.refresh_token.clone()));
        fields.insert(
            "expires_in".into(),
            self.expires_in.map(Value::from).unwrap_or(Value::Null),
        );
        fields
    }
}

impl fmt::Debug for CrmCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrmCredentials")
            .field("domain", &self.domain)
            .field("client_id", &self.client_id)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}
