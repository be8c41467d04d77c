use std::collections::{BTreeSet, HashMap};

use tokio::sync::RwLock;

use bogbot_core::domain::settings::{FormDocument, PasswordDocument, Roster};
use bogbot_core::domain::user::{leaderboard_order, Role, User, UserId};

use super::{RepositoryError, SettingsRepository, UserRepository};

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    /// Seeds a record directly, bypassing the command path.
    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

fn entry<'a>(users: &'a mut HashMap<UserId, User>, id: &UserId) -> &'a mut User {
    users.entry(id.clone()).or_insert_with(|| User::new(id.clone()))
}

fn clamp_add(bits: i64, amount: i64) -> i64 {
    bits.saturating_add(amount).max(0)
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get_or_create(&self, id: &UserId) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        Ok(entry(&mut users, id).clone())
    }

    async fn get_or_create_many(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let mut users = self.users.write().await;
        Ok(ids.iter().map(|id| entry(&mut users, id).clone()).collect())
    }

    async fn set_role(&self, id: &UserId, role: Role) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        entry(&mut users, id).role = role;
        Ok(())
    }

    async fn set_team(&self, id: &UserId, team: &str) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        entry(&mut users, id).team = team.to_owned();
        Ok(())
    }

    async fn add_bits(&self, ids: &[UserId], amount: i64) -> Result<u64, RepositoryError> {
        let mut users = self.users.write().await;
        let targets: BTreeSet<&UserId> = ids.iter().collect();
        let mut touched = 0;
        for id in targets {
            if let Some(user) = users.get_mut(id) {
                user.bits = clamp_add(user.bits, amount);
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn add_bits_to_team(&self, team: &str, amount: i64) -> Result<u64, RepositoryError> {
        let mut users = self.users.write().await;
        let mut touched = 0;
        for user in users.values_mut().filter(|user| user.team == team) {
            user.bits = clamp_add(user.bits, amount);
            touched += 1;
        }
        Ok(touched)
    }

    async fn record_checkin(
        &self,
        id: &UserId,
        token: &str,
    ) -> Result<Option<i64>, RepositoryError> {
        let mut users = self.users.write().await;
        let user = entry(&mut users, id);
        if user.is_checked_in(token) {
            return Ok(None);
        }
        user.bits = clamp_add(user.bits, 1);
        user.last_checkin_token = Some(token.to_owned());
        Ok(Some(user.bits))
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut ranked: Vec<User> = users.values().cloned().collect();
        ranked.sort_by(leaderboard_order);
        ranked.truncate(limit as usize);
        Ok(ranked)
    }
}

#[derive(Default)]
struct SettingsState {
    password: Option<PasswordDocument>,
    form: Option<FormDocument>,
    roster: Option<Roster>,
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
    state: RwLock<SettingsState>,
}

#[async_trait::async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn password(&self) -> Result<Option<PasswordDocument>, RepositoryError> {
        Ok(self.state.read().await.password.clone())
    }

    async fn replace_password(&self, document: PasswordDocument) -> Result<(), RepositoryError> {
        self.state.write().await.password = Some(document);
        Ok(())
    }

    async fn form(&self) -> Result<Option<FormDocument>, RepositoryError> {
        Ok(self.state.read().await.form.clone())
    }

    async fn replace_form(&self, document: FormDocument) -> Result<(), RepositoryError> {
        self.state.write().await.form = Some(document);
        Ok(())
    }

    async fn delete_form(&self) -> Result<bool, RepositoryError> {
        Ok(self.state.write().await.form.take().is_some())
    }

    async fn roster(&self) -> Result<Roster, RepositoryError> {
        Ok(self.state.read().await.roster.clone().unwrap_or_default())
    }

    async fn append_teams(&self, teams: &[String]) -> Result<Roster, RepositoryError> {
        let mut state = self.state.write().await;
        let roster = state.roster.get_or_insert_with(Roster::default);
        roster.append(teams.iter().cloned());
        Ok(roster.clone())
    }

    async fn remove_teams(&self, teams: &[String]) -> Result<Roster, RepositoryError> {
        let mut state = self.state.write().await;
        let roster = state.roster.get_or_insert_with(Roster::default);
        roster.remove_first_occurrences(teams);
        Ok(roster.clone())
    }
}

#[cfg(test)]
mod tests {
    use bogbot_core::domain::settings::Roster;
    use bogbot_core::domain::user::{User, UserId};

    use super::{InMemorySettingsRepository, InMemoryUserRepository};
    use crate::repositories::{SettingsRepository, UserRepository};

    #[tokio::test]
    async fn in_memory_users_mirror_sql_grant_semantics() {
        let repo = InMemoryUserRepository::default();
        let alice = UserId::new("U1");
        let bob = UserId::new("U2");
        repo.get_or_create_many(&[alice.clone(), bob.clone()]).await.expect("create");

        let touched =
            repo.add_bits(&[alice.clone(), alice.clone(), bob.clone()], 2).await.expect("grant");
        assert_eq!(touched, 2, "duplicate ids are credited once");

        repo.add_bits(&[bob.clone()], -10).await.expect("correction");
        let users = repo.get_or_create_many(&[alice, bob]).await.expect("reload");
        assert_eq!(users[0].bits, 2);
        assert_eq!(users[1].bits, 0);
    }

    #[tokio::test]
    async fn in_memory_grant_skips_unknown_users() {
        let repo = InMemoryUserRepository::default();
        let touched = repo.add_bits(&[UserId::new("ghost")], 1).await.expect("grant");
        assert_eq!(touched, 0);
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn in_memory_checkin_and_leaderboard() {
        let repo = InMemoryUserRepository::default();
        let mut seeded = User::new(UserId::new("U9"));
        seeded.bits = 7;
        repo.insert(seeded).await;

        let id = UserId::new("U1");
        assert_eq!(repo.record_checkin(&id, "h").await.expect("first"), Some(1));
        assert_eq!(repo.record_checkin(&id, "h").await.expect("second"), None);

        let board = repo.leaderboard(10).await.expect("leaderboard");
        let ids: Vec<_> = board.iter().map(|user| user.id.as_str()).collect();
        assert_eq!(ids, vec!["U9", "U1"]);
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn in_memory_roster_edits() {
        let repo = InMemorySettingsRepository::default();
        repo.append_teams(&["A".to_owned(), "B".to_owned(), "A".to_owned()])
            .await
            .expect("append");
        let roster = repo.remove_teams(&["A".to_owned()]).await.expect("remove");
        assert_eq!(roster, Roster::new(vec!["B".to_owned(), "A".to_owned()]));
    }
}
