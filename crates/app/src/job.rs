use chrono::NaiveDate;
use remit_bank::{BankClient, BankError};
use remit_core::{InvoiceId, Money, Statement, StatementWindow};
use remit_crm::{CrmClient, InvoiceSchema};
use remit_storage::BankCredentials;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Missing bank account number or access token")]
    MissingCredentials,
    #[error("Cannot fetch bank statements: {0}")]
    Statements(#[from] BankError),
}

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub window_days: u32,
    pub schema: InvoiceSchema,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            window_days: 11,
            schema: InvoiceSchema::default(),
        }
    }
}

/// What happened to a single statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    OtherAccount,
    NoInvoiceNumber,
    NoAmount { invoice: String },
    LookupFailed { invoice: String },
    NotFound { invoice: String },
    AlreadyPaid { invoice: String, id: InvoiceId },
    UpdateFailed { invoice: String, id: InvoiceId },
    Reconciled { invoice: String, id: InvoiceId, commented: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub statements: usize,
    pub other_account: usize,
    pub no_invoice_number: usize,
    pub not_found: usize,
    pub already_paid: usize,
    pub failed: usize,
    pub reconciled: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &Outcome) {
        self.statements += 1;
        match outcome {
            Outcome::OtherAccount => self.other_account += 1,
            Outcome::NoInvoiceNumber => self.no_invoice_number += 1,
            Outcome::NotFound { .. } => self.not_found += 1,
            Outcome::AlreadyPaid { .. } => self.already_paid += 1,
            Outcome::NoAmount { .. }
            | Outcome::LookupFailed { .. }
            | Outcome::UpdateFailed { .. } => self.failed += 1,
            Outcome::Reconciled { .. } => self.reconciled += 1,
        }
    }
}

/// Fetch recent statements and mark the matching CRM invoices paid.
///
/// Each statement is handled on its own: a failed lookup or update is logged
/// and the job moves on. Nothing is rolled back.
pub struct ReconcileJob {
    bank: BankClient,
    crm: CrmClient,
    settings: JobSettings,
}

impl ReconcileJob {
    pub fn new(bank: BankClient, crm: CrmClient, settings: JobSettings) -> Self {
        Self {
            bank,
            crm,
            settings,
        }
    }

    pub fn crm(&self) -> &CrmClient {
        &self.crm
    }

    pub async fn run(
        &mut self,
        credentials: &BankCredentials,
        today: NaiveDate,
    ) -> Result<RunSummary, JobError> {
        let Some((account_number, auth_token)) = credentials.complete() else {
            return Err(JobError::MissingCredentials);
        };

        let window = StatementWindow::trailing(self.settings.window_days, today);
        info!(account = %account_number, window = %window, "Fetching bank statements");

        let statements = self
            .bank
            .fetch_statements(account_number, auth_token, &window)
            .await?;

        let mut summary = RunSummary::default();
        for statement in &statements {
            let outcome = self.reconcile(account_number, statement).await;
            debug!(?outcome, "Statement processed");
            summary.record(&outcome);
        }

        info!(
            statements = summary.statements,
            reconciled = summary.reconciled,
            already_paid = summary.already_paid,
            not_found = summary.not_found,
            no_invoice_number = summary.no_invoice_number,
            failed = summary.failed,
            "Reconciliation finished"
        );
        Ok(summary)
    }

    /// Reconcile one statement against the CRM.
    pub async fn reconcile(&mut self, account_number: &str, statement: &Statement) -> Outcome {
        if !statement.is_for_account(account_number) {
            return Outcome::OtherAccount;
        }

        let Some(invoice) = statement.invoice_number() else {
            warn!(statement = %statement.to_audit_text(), "No invoice number in payment purpose");
            return Outcome::NoInvoiceNumber;
        };

        let page = match self.crm.find_invoices(&self.settings.schema, &invoice).await {
            Ok(page) => page,
            Err(e) => {
                error!(invoice = %invoice, kind = e.kind(), error = %e, "Invoice lookup failed");
                return Outcome::LookupFailed { invoice };
            }
        };

        let Some(item) = page.first() else {
            info!(invoice = %invoice, "No CRM invoice for statement");
            return Outcome::NotFound { invoice };
        };
        let id = item.id;

        if item.is_paid(&self.settings.schema.paid_field) {
            debug!(invoice = %invoice, id = %id, "Invoice already paid");
            return Outcome::AlreadyPaid { invoice, id };
        }

        let Some(raw_amount) = statement.raw_amount() else {
            warn!(invoice = %invoice, id = %id, "Statement has no amount, invoice left as is");
            return Outcome::NoAmount { invoice };
        };
        let amount = match Money::try_from(raw_amount) {
            Ok(amount) => amount,
            Err(e) => {
                warn!(
                    invoice = %invoice,
                    id = %id,
                    error = %e,
                    "Statement amount is not a number, invoice left as is"
                );
                return Outcome::NoAmount { invoice };
            }
        };

        if let Err(e) = self
            .crm
            .mark_invoice_paid(&self.settings.schema, id, raw_amount)
            .await
        {
            error!(invoice = %invoice, id = %id, kind = e.kind(), error = %e, "Invoice update failed");
            return Outcome::UpdateFailed { invoice, id };
        }
        info!(invoice = %invoice, id = %id, amount = %amount, "Invoice marked paid");

        let entity = self.settings.schema.entity();
        let commented = match self
            .crm
            .add_timeline_comment(&entity, id, &statement.to_audit_text())
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!(invoice = %invoice, id = %id, kind = e.kind(), error = %e, "Audit comment failed");
                false
            }
        };

        Outcome::Reconciled {
            invoice,
            id,
            commented,
        }
    }
}
