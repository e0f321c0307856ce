use remit_core::{InvoiceEntity, InvoiceId, InvoicePage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::client::CrmClient;
use crate::error::CrmError;

pub const ITEM_LIST: &str = "crm.item.list";
pub const ITEM_UPDATE: &str = "crm.item.update";
pub const TIMELINE_COMMENT_ADD: &str = "crm.timeline.comment.add";

/// Where invoices live in the CRM and which fields mark them paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceSchema {
    pub entity_type_id: String,
    pub stage_field: String,
    pub success_stage: String,
    pub paid_field: String,
}

impl Default for InvoiceSchema {
    fn default() -> Self {
        Self {
            entity_type_id: "31".to_string(),
            stage_field: "stageId".to_string(),
            success_stage: "DT31_3:P".to_string(),
            paid_field: "ufCrmSmartInvoice1656422348947".to_string(),
        }
    }
}

impl InvoiceSchema {
    pub fn entity(&self) -> InvoiceEntity {
        InvoiceEntity::new(self.entity_type_id.clone())
    }
}

impl CrmClient {
    /// Invoices whose account number equals `account_number`.
    pub async fn find_invoices(
        &mut self,
        schema: &InvoiceSchema,
        account_number: &str,
    ) -> Result<InvoicePage, CrmError> {
        let payload = json!({
            "entityTypeId": schema.entity_type_id,
            "filter": { "accountNumber": account_number },
        });
        let result = self.call(ITEM_LIST, &payload).await?;
        serde_json::from_value(result.clone()).map_err(|_| CrmError::UnexpectedShape {
            method: ITEM_LIST.to_string(),
            body: result.to_string(),
        })
    }

    /// Move the invoice to the success stage and record the paid amount.
    ///
    /// `amount` is written as given, so the CRM sees the bank's own value.
    pub async fn mark_invoice_paid(
        &mut self,
        schema: &InvoiceSchema,
        id: InvoiceId,
        amount: &Value,
    ) -> Result<Value, CrmError> {
        let mut fields = Map::new();
        fields.insert(schema.stage_field.clone(), json!(schema.success_stage));
        fields.insert(schema.paid_field.clone(), amount.clone());

        let payload = json!({
            "entityTypeId": schema.entity_type_id,
            "id": id,
            "fields": fields,
        });
        self.call(ITEM_UPDATE, &payload).await
    }

    pub async fn add_timeline_comment(
        &mut self,
        entity: &InvoiceEntity,
        id: InvoiceId,
        comment: &str,
    ) -> Result<Value, CrmError> {
        let payload = json!({
            "fields": {
                "ENTITY_ID": id,
                "ENTITY_TYPE": entity.timeline_type(),
                "COMMENT": comment,
            }
        });
        self.call(TIMELINE_COMMENT_ADD, &payload).await
    }
}
