//! Domain model, authorization policy and shared configuration for bogbot.

pub mod config;
pub mod domain;
pub mod errors;
pub mod policy;
pub mod secrets;

pub use domain::settings::{FormDocument, PasswordDocument, Roster, SettingName};
pub use domain::user::{Role, User, UserId, DEFAULT_TEAM};
pub use errors::{ApplicationError, DomainError, FailureClass, InterfaceError};
pub use policy::{authorize, Authorization, CommandKind};
pub use secrets::{Argon2Hasher, SecretError, SecretHasher};
