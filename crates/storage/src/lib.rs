pub mod credentials;
pub mod secrets;

pub use credentials::{BankCredentials, CrmCredentials};
pub use secrets::{SecretDomain, SecretStore, SecretsError};
