use std::time::Duration;

use remit_core::{Statement, StatementWindow};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::BankError;

pub const DEFAULT_BASE_URL: &str = "https://business.tinkoff.ru/openapi";
pub const STATEMENTS_PATH: &str = "/api/v1/bank-statement";

/// Response key holding the statement list.
pub const STATEMENTS_KEY: &str = "operation";
/// Response key the bank uses for error descriptions.
pub const ERROR_KEY: &str = "errorMessage";
const ERROR_CODE_KEY: &str = "errorCode";

#[derive(Debug, Clone)]
pub struct BankConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Retries after the first attempt when the bank answers 429.
    pub rate_limit_retries: u32,
    pub rate_limit_backoff: Duration,
    /// Immediate retries when the connection itself fails.
    pub connect_retries: u32,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            rate_limit_retries: 5,
            rate_limit_backoff: Duration::from_secs(5),
            connect_retries: 10,
        }
    }
}

impl BankConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit(mut self, retries: u32, backoff: Duration) -> Self {
        self.rate_limit_retries = retries;
        self.rate_limit_backoff = backoff;
        self
    }

    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }
}

pub struct BankClient {
    http: reqwest::Client,
    config: BankConfig,
}

impl BankClient {
    pub fn new(config: BankConfig) -> Result<Self, BankError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(BankError::Client)?;
        Ok(Self { http, config })
    }

    /// Fetch the account's statement entries for `window`.
    pub async fn fetch_statements(
        &self,
        account_number: &str,
        auth_token: &str,
        window: &StatementWindow,
    ) -> Result<Vec<Statement>, BankError> {
        let mut query = vec![("accountNumber", account_number.to_string())];
        if let Some(from) = window.from_param() {
            query.push(("from", from));
        }
        if let Some(till) = window.till_param() {
            query.push(("till", till));
        }

        let body = self.get(STATEMENTS_PATH, auth_token, &query).await?;
        parse_statements(&body)
    }

    /// GET with the 429 and connection retry budgets applied. Returns the raw
    /// response body.
    async fn get(
        &self,
        path: &str,
        auth_token: &str,
        query: &[(&str, String)],
    ) -> Result<String, BankError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut attempt = 0u32;
        let mut throttled = 0u32;
        let mut connect_failures = 0u32;

        loop {
            attempt += 1;
            debug!(url = %url, attempt, "Sending bank API request");

            let sent = self
                .http
                .get(&url)
                .bearer_auth(auth_token)
                .header(CONTENT_TYPE, "application/json")
                .query(query)
                .send()
                .await;
            let response = match sent {
                Ok(response) => response,
                Err(e) if e.is_connect() && connect_failures < self.config.connect_retries => {
                    connect_failures += 1;
                    warn!(
                        url = %url,
                        attempt = connect_failures,
                        error = %e,
                        "Cannot reach bank API, retrying"
                    );
                    continue;
                }
                Err(e) => return Err(self.transport_error(e)),
            };

            let status = response.status();
            let body = response.text().await.map_err(|e| self.transport_error(e))?;

            if status == StatusCode::TOO_MANY_REQUESTS {
                throttled += 1;
                if throttled <= self.config.rate_limit_retries {
                    warn!(
                        url = %url,
                        attempt = throttled,
                        wait_ms = self.config.rate_limit_backoff.as_millis(),
                        "Bank API rate limited (429), waiting before retry"
                    );
                    tokio::time::sleep(self.config.rate_limit_backoff).await;
                    continue;
                }
                return Err(BankError::RateLimited {
                    attempts: throttled,
                    body,
                });
            }

            debug!(url = %url, status = %status, attempt, "Received bank API response");
            return Ok(body);
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> BankError {
        BankError::from_transport(e, self.config.timeout, self.config.connect_retries)
    }
}

fn parse_statements(body: &str) -> Result<Vec<Statement>, BankError> {
    let decode_err = || BankError::Decode {
        body: body.to_string(),
    };
    let mut object = match serde_json::from_str::<Value>(body).map_err(|_| decode_err())? {
        Value::Object(object) => object,
        _ => return Err(decode_err()),
    };

    if let Some(message) = object.get(ERROR_KEY) {
        return Err(BankError::Api {
            message: text_of(message),
            code: object.get(ERROR_CODE_KEY).map(text_of),
        });
    }

    let entries = match object.remove(STATEMENTS_KEY) {
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(BankError::UnexpectedShape {
                reason: format!("`{STATEMENTS_KEY}` is not a list"),
                body: body.to_string(),
            })
        }
        None => {
            return Err(BankError::UnexpectedShape {
                reason: format!("missing `{STATEMENTS_KEY}` key"),
                body: body.to_string(),
            })
        }
    };

    let statements = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| match entry {
            Value::Object(raw) => Ok(Statement::from(raw)),
            other => Err(BankError::UnexpectedShape {
                reason: format!("`{STATEMENTS_KEY}` entry {index} is not an object: {other}"),
                body: body.to_string(),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(count = statements.len(), "Parsed bank statements");
    Ok(statements)
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
