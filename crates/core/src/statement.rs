use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::extract::extract_invoice_number;

pub const RECIPIENT_ACCOUNT_KEY: &str = "recipientAccount";
pub const PAYMENT_PURPOSE_KEY: &str = "paymentPurpose";
pub const AMOUNT_KEY: &str = "amount";

/// One bank transaction as returned by the statements endpoint.
///
/// The entry is kept exactly as the bank sent it, key order and number
/// formatting included. Accessors give a typed view of the fields the
/// reconciliation reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Statement {
    raw: Map<String, Value>,
}

impl Statement {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    pub fn recipient_account(&self) -> Option<&str> {
        self.get(RECIPIENT_ACCOUNT_KEY).and_then(Value::as_str)
    }

    pub fn payment_purpose(&self) -> Option<&str> {
        self.get(PAYMENT_PURPOSE_KEY).and_then(Value::as_str)
    }

    /// The amount exactly as sent, `None` when absent or null.
    pub fn raw_amount(&self) -> Option<&Value> {
        self.get(AMOUNT_KEY).filter(|v| !v.is_null())
    }

    pub fn is_for_account(&self, account_number: &str) -> bool {
        self.recipient_account() == Some(account_number)
    }

    pub fn invoice_number(&self) -> Option<String> {
        self.payment_purpose().and_then(extract_invoice_number)
    }

    /// The raw entry rendered as 4-space indented JSON with non-ASCII text
    /// left as is.
    pub fn to_audit_text(&self) -> String {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        match self.raw.serialize(&mut ser) {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => Value::Object(self.raw.clone()).to_string(),
        }
    }
}

impl From<Map<String, Value>> for Statement {
    fn from(raw: Map<String, Value>) -> Self {
        Self { raw }
    }
}
