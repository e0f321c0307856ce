pub mod client;
pub mod error;

pub use client::{BankClient, BankConfig, DEFAULT_BASE_URL, STATEMENTS_PATH};
pub use error::BankError;
