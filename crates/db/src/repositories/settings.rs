use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Sqlite, Transaction};

use bogbot_core::domain::settings::{FormDocument, PasswordDocument, Roster, SettingName};

use super::{RepositoryError, SettingsRepository};
use crate::DbPool;

pub struct SqlSettingsRepository {
    pool: DbPool,
}

impl SqlSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load<T: DeserializeOwned>(
        &self,
        name: SettingName,
    ) -> Result<Option<T>, RepositoryError> {
        let document: Option<String> =
            sqlx::query_scalar("SELECT document FROM bot_setting WHERE name = ?")
                .bind(name.as_str())
                .fetch_optional(&self.pool)
                .await?;
        document.map(|raw| decode(name, &raw)).transpose()
    }

    async fn store<T: Serialize>(&self, name: SettingName, document: &T) -> Result<(), RepositoryError> {
        upsert(&self.pool, name, &encode(name, document)?).await
    }

    async fn edit_roster<F>(&self, edit: F) -> Result<Roster, RepositoryError>
    where
        F: FnOnce(&mut Roster) + Send,
    {
        let mut tx: Transaction<'_, Sqlite> = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT document FROM bot_setting WHERE name = ?")
                .bind(SettingName::Roster.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        let mut roster = match current {
            Some(raw) => decode::<Roster>(SettingName::Roster, &raw)?,
            None => Roster::default(),
        };

        edit(&mut roster);

        upsert(&mut *tx, SettingName::Roster, &encode(SettingName::Roster, &roster)?).await?;
        tx.commit().await?;
        Ok(roster)
    }
}

fn decode<T: DeserializeOwned>(name: SettingName, raw: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("{} document: {e}", name.as_str())))
}

fn encode<T: Serialize>(name: SettingName, document: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(document)
        .map_err(|e| RepositoryError::Decode(format!("{} document: {e}", name.as_str())))
}

async fn upsert<'e, E>(executor: E, name: SettingName, document: &str) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO bot_setting (name, document, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(name) DO UPDATE SET
             document = excluded.document,
             updated_at = excluded.updated_at",
    )
    .bind(name.as_str())
    .bind(document)
    .bind(Utc::now().to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait::async_trait]
impl SettingsRepository for SqlSettingsRepository {
    async fn password(&self) -> Result<Option<PasswordDocument>, RepositoryError> {
        self.load(SettingName::Password).await
    }

    async fn replace_password(&self, document: PasswordDocument) -> Result<(), RepositoryError> {
        self.store(SettingName::Password, &document).await
    }

    async fn form(&self) -> Result<Option<FormDocument>, RepositoryError> {
        self.load(SettingName::Form).await
    }

    async fn replace_form(&self, document: FormDocument) -> Result<(), RepositoryError> {
        self.store(SettingName::Form, &document).await
    }

    async fn delete_form(&self) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM bot_setting WHERE name = ?")
            .bind(SettingName::Form.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn roster(&self) -> Result<Roster, RepositoryError> {
        Ok(self.load(SettingName::Roster).await?.unwrap_or_default())
    }

    async fn append_teams(&self, teams: &[String]) -> Result<Roster, RepositoryError> {
        self.edit_roster(|roster| roster.append(teams.iter().cloned())).await
    }

    async fn remove_teams(&self, teams: &[String]) -> Result<Roster, RepositoryError> {
        self.edit_roster(|roster| roster.remove_first_occurrences(teams)).await
    }
}
