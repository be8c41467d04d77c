use bogbot_core::domain::user::{Role, UserId};
use bogbot_db::{migrations, SqlUserRepository, UserRepository};

use crate::commands::{load_config, with_pool, CommandResult};

/// Assigns `role` to `user_id` straight in the store. Chat-side role changes
/// need an existing exec, so this is how the first one is created.
pub fn run(user_id: &str, role: &str) -> CommandResult {
    let Some(user_id) = normalize_user_id(user_id) else {
        return CommandResult::failure("role", "invalid_user", "user id must not be empty", 1);
    };
    let Some(role) = Role::parse(role) else {
        return CommandResult::failure(
            "role",
            "invalid_role",
            format!("unknown role `{}`. Available roles are {}.", role.trim(), Role::valid_values()),
            1,
        );
    };

    let config = match load_config("role") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let assigned = with_pool("role", &config, |pool| {
        let user_id = user_id.clone();
        async move {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;

            let users = SqlUserRepository::new(pool);
            users
                .get_or_create(&user_id)
                .await
                .map_err(|error| ("persistence", error.to_string(), 6u8))?;
            users
                .set_role(&user_id, role)
                .await
                .map_err(|error| ("persistence", error.to_string(), 6u8))?;
            Ok(())
        }
    });

    match assigned {
        Ok(()) => CommandResult::success(
            "role",
            format!("assigned role `{}` to {}", role.as_str(), user_id.as_str()),
        ),
        Err(failure) => failure,
    }
}

fn normalize_user_id(raw: &str) -> Option<UserId> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|rest| rest.split('|').next().unwrap_or(rest))
        .unwrap_or(trimmed)
        .trim_start_matches('@');

    (!inner.is_empty()).then(|| UserId::new(inner))
}

#[cfg(test)]
mod tests {
    use super::normalize_user_id;
    use bogbot_core::domain::user::UserId;

    #[test]
    fn accepts_raw_ids_and_mentions() {
        assert_eq!(normalize_user_id("U024BE7LH"), Some(UserId::new("U024BE7LH")));
        assert_eq!(normalize_user_id(" <@U024BE7LH> "), Some(UserId::new("U024BE7LH")));
        assert_eq!(normalize_user_id("<@U024BE7LH|bob>"), Some(UserId::new("U024BE7LH")));
        assert_eq!(normalize_user_id("@U024BE7LH"), Some(UserId::new("U024BE7LH")));
    }

    #[test]
    fn rejects_empty_ids() {
        assert_eq!(normalize_user_id("   "), None);
        assert_eq!(normalize_user_id("<@>"), None);
    }
}
