use async_trait::async_trait;
use thiserror::Error;

use bogbot_core::domain::settings::{FormDocument, PasswordDocument, Roster};
use bogbot_core::domain::user::{Role, User, UserId};
use bogbot_core::errors::ApplicationError;

pub mod memory;
pub mod settings;
pub mod user;

pub use memory::{InMemorySettingsRepository, InMemoryUserRepository};
pub use settings::SqlSettingsRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Persistence(value.to_string())
    }
}

/// Access to user records. Users are created lazily with member defaults the
/// first time any operation references their id.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_or_create(&self, id: &UserId) -> Result<User, RepositoryError>;

    async fn get_or_create_many(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError>;

    async fn set_role(&self, id: &UserId, role: Role) -> Result<(), RepositoryError>;

    async fn set_team(&self, id: &UserId, team: &str) -> Result<(), RepositoryError>;

    /// Adds `amount` to every listed user in one statement, clamping at zero.
    /// Returns the number of rows touched.
    async fn add_bits(&self, ids: &[UserId], amount: i64) -> Result<u64, RepositoryError>;

    /// Adds `amount` to every existing user on `team`, clamping at zero.
    async fn add_bits_to_team(&self, team: &str, amount: i64) -> Result<u64, RepositoryError>;

    /// Awards one bit and stores `token` unless the user already checked in
    /// with that token. Returns the new balance, or `None` when the user was
    /// already checked in.
    async fn record_checkin(
        &self,
        id: &UserId,
        token: &str,
    ) -> Result<Option<i64>, RepositoryError>;

    async fn leaderboard(&self, limit: u32) -> Result<Vec<User>, RepositoryError>;
}

/// The three singleton settings documents.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn password(&self) -> Result<Option<PasswordDocument>, RepositoryError>;

    async fn replace_password(&self, document: PasswordDocument) -> Result<(), RepositoryError>;

    async fn form(&self) -> Result<Option<FormDocument>, RepositoryError>;

    async fn replace_form(&self, document: FormDocument) -> Result<(), RepositoryError>;

    /// Returns whether a form document existed.
    async fn delete_form(&self) -> Result<bool, RepositoryError>;

    /// An absent roster reads as empty.
    async fn roster(&self) -> Result<Roster, RepositoryError>;

    async fn append_teams(&self, teams: &[String]) -> Result<Roster, RepositoryError>;

    async fn remove_teams(&self, teams: &[String]) -> Result<Roster, RepositoryError>;
}
