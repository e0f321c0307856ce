pub mod client;
pub mod error;
pub mod invoices;
mod reply;

pub use client::{CrmClient, CrmConfig, DEFAULT_OAUTH_URL};
pub use error::CrmError;
pub use invoices::{InvoiceSchema, ITEM_LIST, ITEM_UPDATE, TIMELINE_COMMENT_ADD};
pub use reply::{EXPIRED_TOKEN, NO_AUTH_FOUND, QUERY_LIMIT_EXCEEDED};
