use crate::commands::{load_config, with_pool, CommandResult};
use bogbot_db::migrations;

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let applied = with_pool("migrate", &config, |pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        Ok(migrations::MIGRATOR
            .iter()
            .filter(|migration| !migration.migration_type.is_down_migration())
            .count())
    });

    match applied {
        Ok(count) => CommandResult::success(
            "migrate",
            format!("schema is at the latest of {count} migration(s) in `{}`", config.database.url),
        ),
        Err(failure) => failure,
    }
}
