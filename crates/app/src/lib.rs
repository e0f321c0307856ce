pub mod config;
pub mod job;
pub mod logging;

use anyhow::Context;
use chrono::NaiveDate;
use remit_bank::BankClient;
use remit_crm::CrmClient;

pub use config::{AppConfig, ConfigError};
pub use job::{JobError, JobSettings, Outcome, ReconcileJob, RunSummary};

/// Load credentials, build both clients and run one reconciliation pass.
pub async fn run(config: AppConfig, today: NaiveDate) -> anyhow::Result<RunSummary> {
    let store = config.secrets.store();

    let bank_credentials = store
        .load_bank()
        .await
        .context("Failed to load bank credentials")?;
    if bank_credentials.complete().is_none() {
        return Err(JobError::MissingCredentials.into());
    }
    let crm_credentials = store
        .load_crm()
        .await
        .context("Failed to load CRM credentials")?;

    let bank = BankClient::new(config.bank.client_config())?;
    let crm = CrmClient::new(config.crm.client_config(), crm_credentials, store)?;

    let settings = JobSettings {
        window_days: config.job.window_days,
        schema: config.invoice,
    };
    let mut job = ReconcileJob::new(bank, crm, settings);
    Ok(job.run(&bank_credentials, today).await?)
}
