use std::path::{Path, PathBuf};
use std::time::Duration;

use remit_bank::BankConfig;
use remit_crm::{CrmConfig, InvoiceSchema};
use remit_storage::SecretStore;
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV: &str = "REMIT_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "remit.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub secrets: SecretsSection,
    pub bank: BankSection,
    pub crm: CrmSection,
    pub invoice: InvoiceSchema,
    pub job: JobSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SecretsSection {
    pub bank_path: PathBuf,
    pub crm_path: PathBuf,
}

impl Default for SecretsSection {
    fn default() -> Self {
        Self {
            bank_path: PathBuf::from(remit_storage::secrets::DEFAULT_BANK_FILE),
            crm_path: PathBuf::from(remit_storage::secrets::DEFAULT_CRM_FILE),
        }
    }
}

impl SecretsSection {
    pub fn store(&self) -> SecretStore {
        SecretStore::new(&self.bank_path, &self.crm_path)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BankSection {
    pub base_url: String,
    pub timeout_secs: u64,
    pub rate_limit_retries: u32,
    pub rate_limit_backoff_ms: u64,
    pub connect_retries: u32,
}

impl Default for BankSection {
    fn default() -> Self {
        Self {
            base_url: remit_bank::DEFAULT_BASE_URL.to_string(),
            timeout_secs: 60,
            rate_limit_retries: 5,
            rate_limit_backoff_ms: 5_000,
            connect_retries: 10,
        }
    }
}

impl BankSection {
    pub fn client_config(&self) -> BankConfig {
        BankConfig::new(self.base_url.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_rate_limit(
                self.rate_limit_retries,
                Duration::from_millis(self.rate_limit_backoff_ms),
            )
            .with_connect_retries(self.connect_retries)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CrmSection {
    pub api_base: Option<String>,
    pub oauth_url: String,
    pub timeout_secs: u64,
    pub rate_limit_backoff_ms: u64,
    pub max_rate_limit_retries: u32,
}

impl Default for CrmSection {
    fn default() -> Self {
        Self {
            api_base: None,
            oauth_url: remit_crm::DEFAULT_OAUTH_URL.to_string(),
            timeout_secs: 60,
            rate_limit_backoff_ms: 2_000,
            max_rate_limit_retries: 30,
        }
    }
}

impl CrmSection {
    pub fn client_config(&self) -> CrmConfig {
        let config = CrmConfig::default()
            .with_oauth_url(self.oauth_url.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_rate_limit(
                self.max_rate_limit_retries,
                Duration::from_millis(self.rate_limit_backoff_ms),
            );
        match &self.api_base {
            Some(base) => config.with_api_base(base.clone()),
            None => config,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct JobSection {
    /// How many days back the statement window starts.
    pub window_days: u32,
}

impl Default for JobSection {
    fn default() -> Self {
        Self { window_days: 11 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub dir: PathBuf,
    pub file_prefix: String,
    pub max_files: usize,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_prefix: "remit".to_string(),
            // One file per week.
            max_files: 12,
        }
    }
}

impl AppConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load from `$REMIT_CONFIG`, else `./remit.toml` when it exists, else
    /// built-in defaults. An explicitly named file must exist.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
