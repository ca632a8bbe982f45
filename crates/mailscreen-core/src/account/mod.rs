//! Account configuration, storage, and the credential vault.

mod model;
mod repository;
pub mod validation;
pub mod vault;

pub use model::{Account, AccountId, ImapConfig, Security};
pub use repository::AccountRepository;
pub use validation::{ValidationError, ValidationResult, validate_account};
pub use vault::CredentialVault;
