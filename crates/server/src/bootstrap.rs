use std::sync::Arc;

use bogbot_core::config::{AppConfig, ConfigError};
use bogbot_core::secrets::Argon2Hasher;
use bogbot_db::{
    connect_with_settings, migrations, DbPool, SqlSettingsRepository, SqlUserRepository,
};
use bogbot_slack::events::command_dispatcher;
use bogbot_slack::handlers::{MembershipLookup, StoreCommandService};
use bogbot_slack::socket::{ReconnectPolicy, SocketModeRunner};
use bogbot_slack::transport::WebSocketTransport;
use bogbot_slack::web::SlackWebClient;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate()?;

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let web = SlackWebClient::new(config.slack.api_base_url.clone(), config.slack.bot_token.clone());
    let service = command_service(db_pool.clone(), Arc::new(web.clone()));
    let transport = WebSocketTransport::new(web.clone(), config.slack.app_token.clone());
    let slack_runner = SocketModeRunner::new(
        Arc::new(transport),
        command_dispatcher(Arc::new(service)),
        Arc::new(web),
        ReconnectPolicy::default(),
    );

    Ok(Application { config, db_pool, slack_runner })
}

/// Command service backed by the SQL stores and Argon2 password hashing.
pub fn command_service(
    db_pool: DbPool,
    membership: Arc<dyn MembershipLookup>,
) -> StoreCommandService {
    StoreCommandService::new(
        Arc::new(SqlUserRepository::new(db_pool.clone())),
        Arc::new(SqlSettingsRepository::new(db_pool)),
        Arc::new(Argon2Hasher::new()),
        membership,
    )
}
