use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvoiceId(pub i64);

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for InvoiceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // The CRM sends ids as numbers from some methods and strings from others.
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_i64()
                .map(InvoiceId)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid invoice id {n}"))),
            Value::String(s) => s
                .trim()
                .parse()
                .map(InvoiceId)
                .map_err(|_| serde::de::Error::custom(format!("invalid invoice id {s:?}"))),
            other => Err(serde::de::Error::custom(format!("invalid invoice id {other}"))),
        }
    }
}

/// The CRM smart-process entity that holds invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceEntity {
    pub type_id: String,
}

impl InvoiceEntity {
    pub fn new(type_id: impl Into<String>) -> Self {
        Self { type_id: type_id.into() }
    }

    /// Entity type name used by timeline methods, e.g. `dynamic_31`.
    pub fn timeline_type(&self) -> String {
        format!("dynamic_{}", self.type_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: InvoiceId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl InvoiceItem {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// An invoice counts as paid once its paid-amount field holds anything
    /// other than an empty value.
    pub fn is_paid(&self, paid_field: &str) -> bool {
        self.field(paid_field).is_some_and(is_set)
    }
}

/// `result` payload of the item-list method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoicePage {
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
}

impl InvoicePage {
    pub fn first(&self) -> Option<&InvoiceItem> {
        self.items.first()
    }
}

/// JSON truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are unset.
pub fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> InvoiceItem {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn id_accepts_number_and_string() {
        assert_eq!(item(json!({ "id": 7 })).id, InvoiceId(7));
        assert_eq!(item(json!({ "id": "42" })).id, InvoiceId(42));
        assert!(serde_json::from_value::<InvoiceItem>(json!({ "id": "x" })).is_err());
    }

    #[test]
    fn paid_marker() {
        assert!(!item(json!({ "id": 1, "paid": null })).is_paid("paid"));
        assert!(!item(json!({ "id": 1 })).is_paid("paid"));
        assert!(!item(json!({ "id": 1, "paid": "" })).is_paid("paid"));
        assert!(!item(json!({ "id": 1, "paid": 0 })).is_paid("paid"));
        assert!(item(json!({ "id": 1, "paid": 500 })).is_paid("paid"));
        assert!(item(json!({ "id": 1, "paid": "500|RUB" })).is_paid("paid"));
    }

    #[test]
    fn page_without_items_is_empty() {
        let page: InvoicePage = serde_json::from_value(json!({ "total": 0 })).unwrap();
        assert!(page.first().is_none());
    }

    #[test]
    fn timeline_type_name() {
        assert_eq!(InvoiceEntity::new("31").timeline_type(), "dynamic_31");
    }
}
