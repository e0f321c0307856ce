use serde_json::{Map, Value};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::credentials::{BankCredentials, CrmCredentials};

pub const DEFAULT_BANK_FILE: &str = "secrets_bank.json";
pub const DEFAULT_CRM_FILE: &str = "secrets_crm.json";

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("Cannot access {domain} secrets at {path}: {source}")]
    Io {
        domain: SecretDomain,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed {domain} secrets in {path}: {source}")]
    Format {
        domain: SecretDomain,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{domain} secrets in {path} must be a JSON object")]
    NotAnObject { domain: SecretDomain, path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretDomain {
    Bank,
    Crm,
}

impl fmt::Display for SecretDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretDomain::Bank => write!(f, "bank"),
            SecretDomain::Crm => write!(f, "crm"),
        }
    }
}

/// Two flat JSON credential files. Single writer assumed; no locking.
#[derive(Debug, Clone)]
pub struct SecretStore {
    bank_path: PathBuf,
    crm_path: PathBuf,
}

impl SecretStore {
    pub fn new(bank_path: impl Into<PathBuf>, crm_path: impl Into<PathBuf>) -> Self {
        Self {
            bank_path: bank_path.into(),
            crm_path: crm_path.into(),
        }
    }

    /// Store using the default file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(DEFAULT_BANK_FILE), dir.join(DEFAULT_CRM_FILE))
    }

    pub fn path(&self, domain: SecretDomain) -> &Path {
        match domain {
            SecretDomain::Bank => &self.bank_path,
            SecretDomain::Crm => &self.crm_path,
        }
    }

    pub async fn load(&self, domain: SecretDomain) -> Result<Map<String, Value>, SecretsError> {
        let path = self.path(domain);
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SecretsError::Io {
                domain,
                path: path.to_path_buf(),
                source,
            })?;
        parse_record(domain, path, &raw)
    }

    /// Overwrite `fields` in the record, keeping every other key. A missing
    /// file is treated as an empty record.
    pub async fn save(
        &self,
        domain: SecretDomain,
        fields: Map<String, Value>,
    ) -> Result<(), SecretsError> {
        let path = self.path(domain);
        let io_err = |source| SecretsError::Io {
            domain,
            path: path.to_path_buf(),
            source,
        };

        let mut record = match tokio::fs::read_to_string(path).await {
            Ok(raw) => parse_record(domain, path, &raw)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(io_err(e)),
        };
        record.extend(fields);

        let body = serde_json::to_string_pretty(&Value::Object(record)).map_err(|source| {
            SecretsError::Format {
                domain,
                path: path.to_path_buf(),
                source,
            }
        })?;

        // Write next to the target and rename so a crash never leaves a
        // truncated token file behind.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;

        tracing::debug!(%domain, path = %path.display(), "Secrets saved");
        Ok(())
    }

    pub async fn load_bank(&self) -> Result<BankCredentials, SecretsError> {
        self.load_typed(SecretDomain::Bank).await
    }

    pub async fn load_crm(&self) -> Result<CrmCredentials, SecretsError> {
        self.load_typed(SecretDomain::Crm).await
    }

    pub async fn save_crm_tokens(&self, credentials: &CrmCredentials) -> Result<(), SecretsError> {
        self.save(SecretDomain::Crm, credentials.token_fields()).await
    }

    async fn load_typed<T: serde::de::DeserializeOwned>(
        &self,
        domain: SecretDomain,
    ) -> Result<T, SecretsError> {
        let record = self.load(domain).await?;
        serde_json::from_value(Value::Object(record)).map_err(|source| SecretsError::Format {
            domain,
            path: self.path(domain).to_path_buf(),
            source,
        })
    }
}

fn parse_record(
    domain: SecretDomain,
    path: &Path,
    raw: &str,
) -> Result<Map<String, Value>, SecretsError> {
    let value: Value = serde_json::from_str(raw).map_err(|source| SecretsError::Format {
        domain,
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(SecretsError::NotAnObject {
            domain,
            path: path.to_path_buf(),
        }),
    }
}
