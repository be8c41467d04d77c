use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite};

use bogbot_core::domain::user::{Role, User, UserId};

use super::{RepositoryError, UserRepository};
use crate::DbPool;

const USER_COLUMNS: &str = "user_id, role, bits, team, last_checkin_token";

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role_str: String =
        row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let bits: i64 = row.try_get("bits").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let team: String = row.try_get("team").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let last_checkin_token: Option<String> =
        row.try_get("last_checkin_token").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let role = Role::parse(&role_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role_str}` for {id}")))?;

    Ok(User { id: UserId(id), role, bits, team, last_checkin_token })
}

/// Pushes `bits = bits + amount` held within `0..=i64::MAX`. SQLite turns an
/// overflowing integer sum into a REAL, which would no longer decode.
fn push_saturating_bits(builder: &mut QueryBuilder<'_, Sqlite>, amount: i64) {
    builder.push("bits = CASE WHEN bits > 9223372036854775807 - MAX(");
    builder.push_bind(amount);
    builder.push(", 0) THEN 9223372036854775807 ELSE MAX(bits + ");
    builder.push_bind(amount);
    builder.push(", 0) END");
}

async fn insert_missing<'e, E>(executor: E, id: &UserId) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO bot_user (user_id, created_at, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(user_id) DO NOTHING",
    )
    .bind(id.as_str())
    .bind(&now)
    .bind(&now)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn get_or_create(&self, id: &UserId) -> Result<User, RepositoryError> {
        insert_missing(&self.pool, id).await?;

        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM bot_user WHERE user_id = ?"))
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await?;
        row_to_user(&row)
    }

    async fn get_or_create_many(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            insert_missing(&mut *tx, id).await?;
            let row =
                sqlx::query(&format!("SELECT {USER_COLUMNS} FROM bot_user WHERE user_id = ?"))
                    .bind(id.as_str())
                    .fetch_one(&mut *tx)
                    .await?;
            users.push(row_to_user(&row)?);
        }
        tx.commit().await?;
        Ok(users)
    }

    async fn set_role(&self, id: &UserId, role: Role) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO bot_user (user_id, role, created_at, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 role = excluded.role,
                 updated_at = excluded.updated_at",
        )
        .bind(id.as_str())
        .bind(role.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_team(&self, id: &UserId, team: &str) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO bot_user (user_id, team, created_at, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 team = excluded.team,
                 updated_at = excluded.updated_at",
        )
        .bind(id.as_str())
        .bind(team)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_bits(&self, ids: &[UserId], amount: i64) -> Result<u64, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE bot_user SET ");
        push_saturating_bits(&mut builder, amount);
        builder.push(", updated_at = ");
        builder.push_bind(now);
        builder.push(" WHERE user_id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn add_bits_to_team(&self, team: &str, amount: i64) -> Result<u64, RepositoryError> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE bot_user SET ");
        push_saturating_bits(&mut builder, amount);
        builder.push(", updated_at = ");
        builder.push_bind(Utc::now().to_rfc3339());
        builder.push(" WHERE team = ");
        builder.push_bind(team);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn record_checkin(
        &self,
        id: &UserId,
        token: &str,
    ) -> Result<Option<i64>, RepositoryError> {
        insert_missing(&self.pool, id).await?;

        let bits: Option<i64> = sqlx::query_scalar(
            "UPDATE bot_user
             SET bits = MIN(bits, 9223372036854775806) + 1, last_checkin_token = ?, updated_at = ?
             WHERE user_id = ?
               AND (last_checkin_token IS NULL OR last_checkin_token <> ?)
             RETURNING bits",
        )
        .bind(token)
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(bits)
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM bot_user ORDER BY bits DESC, user_id ASC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use bogbot_core::domain::user::{Role, UserId, DEFAULT_TEAM};

    use super::SqlUserRepository;
    use crate::repositories::UserRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlUserRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlUserRepository::new(pool)
    }

    fn ids(values: &[&str]) -> Vec<UserId> {
        values.iter().map(|value| UserId::new(*value)).collect()
    }

    #[tokio::test]
    async fn get_or_create_inserts_member_defaults_once() {
        let repo = setup().await;
        let id = UserId::new("U1");

        let created = repo.get_or_create(&id).await.expect("create");
        assert_eq!(created.role, Role::Member);
        assert_eq!(created.bits, 0);
        assert_eq!(created.team, DEFAULT_TEAM);
        assert_eq!(created.last_checkin_token, None);

        repo.add_bits(&[id.clone()], 3).await.expect("grant");
        let fetched = repo.get_or_create(&id).await.expect("fetch");
        assert_eq!(fetched.bits, 3, "second call must not reset the record");
    }

    #[tokio::test]
    async fn add_bits_updates_all_targets_in_one_statement() {
        let repo = setup().await;
        let targets = ids(&["U1", "U2", "U3", "U4", "U5"]);
        repo.get_or_create_many(&targets).await.expect("create");

        let touched = repo.add_bits(&targets, 2).await.expect("grant");
        assert_eq!(touched, 5);

        for user in repo.get_or_create_many(&targets).await.expect("reload") {
            assert_eq!(user.bits, 2, "{} should have two bits", user.id);
        }
    }

    #[tokio::test]
    async fn add_bits_with_no_targets_is_a_noop() {
        let repo = setup().await;
        assert_eq!(repo.add_bits(&[], 5).await.expect("grant"), 0);
    }

    #[tokio::test]
    async fn negative_grants_clamp_at_zero() {
        let repo = setup().await;
        let targets = ids(&["U1", "U2"]);
        repo.get_or_create_many(&targets).await.expect("create");
        repo.add_bits(&targets[..1], 4).await.expect("grant");

        repo.add_bits(&targets, -3).await.expect("correction");

        let users = repo.get_or_create_many(&targets).await.expect("reload");
        assert_eq!(users[0].bits, 1);
        assert_eq!(users[1].bits, 0);
    }

    #[tokio::test]
    async fn team_grant_only_touches_members_of_that_team() {
        let repo = setup().await;
        repo.set_team(&UserId::new("U1"), "Red").await.expect("team");
        repo.set_team(&UserId::new("U2"), "Red").await.expect("team");
        repo.set_team(&UserId::new("U3"), "Blue").await.expect("team");

        let touched = repo.add_bits_to_team("Red", 5).await.expect("grant");
        assert_eq!(touched, 2);

        let blue = repo.get_or_create(&UserId::new("U3")).await.expect("fetch");
        assert_eq!(blue.bits, 0);
        let red = repo.get_or_create(&UserId::new("U2")).await.expect("fetch");
        assert_eq!(red.bits, 5);
    }

    #[tokio::test]
    async fn checkin_is_idempotent_per_token() {
        let repo = setup().await;
        let id = UserId::new("U1");

        assert_eq!(repo.record_checkin(&id, "hash-1").await.expect("first"), Some(1));
        assert_eq!(repo.record_checkin(&id, "hash-1").await.expect("second"), None);
        assert_eq!(repo.record_checkin(&id, "hash-2").await.expect("rotated"), Some(2));

        let user = repo.get_or_create(&id).await.expect("fetch");
        assert_eq!(user.last_checkin_token.as_deref(), Some("hash-2"));
    }

    #[tokio::test]
    async fn set_role_upserts_and_preserves_other_fields() {
        let repo = setup().await;
        let id = UserId::new("U1");
        repo.set_team(&id, "Red").await.expect("team");

        repo.set_role(&id, Role::Exec).await.expect("role");

        let user = repo.get_or_create(&id).await.expect("fetch");
        assert_eq!(user.role, Role::Exec);
        assert_eq!(user.team, "Red");
    }

    #[tokio::test]
    async fn leaderboard_sorts_by_bits_then_id_and_truncates() {
        let repo = setup().await;
        for (id, bits) in [("U1", 5), ("U2", 1), ("U4", 9), ("U3", 9)] {
            let id = UserId::new(id);
            repo.get_or_create(&id).await.expect("create");
            repo.add_bits(&[id], bits).await.expect("grant");
        }

        let board = repo.leaderboard(3).await.expect("leaderboard");
        let order: Vec<_> = board.iter().map(|user| (user.id.as_str(), user.bits)).collect();
        assert_eq!(order, vec![("U3", 9), ("U4", 9), ("U1", 5)]);
    }

    #[tokio::test]
    async fn huge_grants_saturate_instead_of_corrupting_the_row() {
        let repo = setup().await;
        let targets = ids(&["U1", "U2"]);
        repo.get_or_create_many(&targets).await.expect("create");
        repo.add_bits(&targets[..1], 1).await.expect("seed");

        assert_eq!(repo.add_bits(&targets, i64::MAX).await.expect("grant"), 2);
        repo.add_bits(&targets[..1], i64::MAX).await.expect("grant again");

        let users = repo.get_or_create_many(&targets).await.expect("reload");
        assert_eq!(users[0].bits, i64::MAX);
        assert_eq!(users[1].bits, i64::MAX);
        assert_eq!(repo.record_checkin(&targets[0], "hash-1").await.expect("checkin"), Some(i64::MAX));

        let board = repo.leaderboard(10).await.expect("leaderboard still decodes");
        assert_eq!(board.len(), 2);

        repo.add_bits(&targets, i64::MIN).await.expect("deduct");
        let users = repo.get_or_create_many(&targets).await.expect("reload");
        assert_eq!(users[0].bits, 0);
    }

    #[tokio::test]
    async fn huge_team_grants_saturate_too() {
        let repo = setup().await;
        let id = UserId::new("U1");
        repo.set_team(&id, "Red").await.expect("team");
        repo.add_bits(&[id.clone()], 7).await.expect("seed");

        repo.add_bits_to_team("Red", i64::MAX).await.expect("grant");

        let user = repo.get_or_create(&id).await.expect("row still decodes");
        assert_eq!(user.bits, i64::MAX);
    }
}
