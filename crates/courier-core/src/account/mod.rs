//! Account management module.
//!
//! Provides the account record, its credential variants, and validation.

mod model;
mod validation;

pub use model::{AccountId, Authentication, EmailAccount, LoginCredential, ProjectId};
pub use validation::{EmailAddress, ValidationError, ValidationResult, validate_account};
