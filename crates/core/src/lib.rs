pub mod extract;
pub mod invoice;
pub mod money;
pub mod period;
pub mod statement;

pub use extract::extract_invoice_number;
pub use invoice::{is_set, InvoiceEntity, InvoiceId, InvoiceItem, InvoicePage};
pub use money::{Money, MoneyError};
pub use period::{StatementWindow, DATE_FORMAT};
pub use statement::Statement;
