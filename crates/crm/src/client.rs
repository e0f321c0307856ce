use std::time::Duration;

use remit_storage::{CrmCredentials, SecretStore};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::CrmError;
use crate::reply::{parse_reply, ErrorClass, Reply, ERROR_KEY};

pub const DEFAULT_OAUTH_URL: &str = "https://oauth.bitrix.info/oauth/token/";

#[derive(Debug, Clone)]
pub struct CrmConfig {
    /// REST root, e.g. `https://acme.bitrix24.ru/rest`. Derived from the
    /// portal domain in the credentials when unset.
    pub api_base: Option<String>,
    pub oauth_url: String,
    pub timeout: Duration,
    pub rate_limit_backoff: Duration,
    /// Retries allowed per call while the CRM answers QUERY_LIMIT_EXCEEDED.
    pub max_rate_limit_retries: u32,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            oauth_url: DEFAULT_OAUTH_URL.to_string(),
            timeout: Duration::from_secs(60),
            rate_limit_backoff: Duration::from_secs(2),
            max_rate_limit_retries: 30,
        }
    }
}

impl CrmConfig {
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    pub fn with_oauth_url(mut self, oauth_url: impl Into<String>) -> Self {
        self.oauth_url = oauth_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_rate_limit_retries = max_retries;
        self.rate_limit_backoff = backoff;
        self
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

/// REST client for the CRM portal. Owns the OAuth credentials and writes
/// them back to the secret store whenever they are refreshed.
pub struct CrmClient {
    http: reqwest::Client,
    config: CrmConfig,
    credentials: CrmCredentials,
    store: SecretStore,
}

impl CrmClient {
    pub fn new(
        config: CrmConfig,
        credentials: CrmCredentials,
        store: SecretStore,
    ) -> Result<Self, CrmError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(CrmError::Client)?;
        Ok(Self {
            http,
            config,
            credentials,
            store,
        })
    }

    pub fn credentials(&self) -> &CrmCredentials {
        &self.credentials
    }

    fn api_base(&self) -> String {
        match &self.config.api_base {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}/rest", self.credentials.domain),
        }
    }

    /// Call a REST method and return its `result`.
    ///
    /// An expired or missing token triggers one refresh and one retry per
    /// call. QUERY_LIMIT_EXCEEDED is retried after a fixed pause up to
    /// `max_rate_limit_retries` times. Any other declared error, and any
    /// transport or decoding failure, is returned as is.
    pub async fn call(&mut self, method: &str, payload: &Value) -> Result<Value, CrmError> {
        let mut refreshed = false;
        let mut throttled = 0u32;

        loop {
            let declared = match self.send(method, payload).await? {
                Reply::Result(result) => return Ok(result),
                Reply::Error(declared) => declared,
            };

            match declared.class() {
                ErrorClass::AuthExpired if !refreshed => {
                    info!(method, code = %declared.code, "CRM token rejected, refreshing");
                    self.refresh_tokens().await?;
                    refreshed = true;
                }
                ErrorClass::RateLimited => {
                    throttled += 1;
                    if throttled > self.config.max_rate_limit_retries {
                        return Err(CrmError::RateLimited {
                            attempts: throttled,
                        });
                    }
                    warn!(
                        method,
                        attempt = throttled,
                        wait_ms = self.config.rate_limit_backoff.as_millis(),
                        "CRM query limit exceeded, waiting before retry"
                    );
                    tokio::time::sleep(self.config.rate_limit_backoff).await;
                }
                _ => return Err(declared.into()),
            }
        }
    }

    /// Run a `batch` request. `params` must carry both `halt` and `cmd`.
    pub async fn batch(&mut self, params: &Value) -> Result<Value, CrmError> {
        let valid = params
            .as_object()
            .is_some_and(|p| p.contains_key("halt") && p.contains_key("cmd"));
        if !valid {
            return Err(CrmError::InvalidBatch);
        }
        self.call("batch", params).await
    }

    /// Exchange the refresh token for a new token pair and persist it.
    pub async fn refresh_tokens(&mut self) -> Result<(), CrmError> {
        let timeout = self.config.timeout;
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
        ];

        let response = self
            .http
            .post(&self.config.oauth_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| CrmError::from_transport(e, timeout))?;
        let body = response
            .text()
            .await
            .map_err(|e| CrmError::from_transport(e, timeout))?;

        let token = parse_token(&body)?;
        self.credentials.auth_token = token.access_token;
        self.credentials.refresh_token = token.refresh_token;
        self.credentials.expires_in = Some(token.expires_in);
        info!(expires_in = token.expires_in, "CRM tokens refreshed");

        // The old refresh token is already spent, so carry on with the new
        // pair even if it cannot be written down.
        if let Err(e) = self.store.save_crm_tokens(&self.credentials).await {
            error!(error = %e, "Refreshed CRM tokens could not be persisted");
        }
        Ok(())
    }

    async fn send(&self, method: &str, payload: &Value) -> Result<Reply, CrmError> {
        let url = format!("{}/{}.json", self.api_base(), method);
        let timeout = self.config.timeout;
        debug!(method, "Sending CRM request");

        let response = self
            .http
            .post(&url)
            .query(&[("auth", self.credentials.auth_token.as_str())])
            .json(payload)
            .send()
            .await
            .map_err(|e| CrmError::from_transport(e, timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CrmError::from_transport(e, timeout))?;
        debug!(method, status = %status, "Received CRM response");

        parse_reply(method, &body)
    }
}

fn parse_token(body: &str) -> Result<TokenResponse, CrmError> {
    let decode_err = || CrmError::OAuthDecode {
        body: body.to_string(),
    };
    let value: Value = serde_json::from_str(body).map_err(|_| decode_err())?;

    if let Some(error) = value.get(ERROR_KEY) {
        return Err(CrmError::OAuthRejected {
            error: error.as_str().map_or_else(|| error.to_string(), str::to_string),
            description: value
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }

    serde_json::from_value(value).map_err(|_| decode_err())
}
