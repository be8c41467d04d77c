use std::env;
use std::sync::{Mutex, OnceLock};

use bogbot_cli::commands::{config, doctor, migrate, role};
use bogbot_core::domain::user::{Role, UserId};
use bogbot_db::{connect_with_settings, SqlUserRepository, UserRepository};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir);
    with_env(&valid_env(&url), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_tokens() {
    with_env(&[], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn role_bootstraps_an_exec_in_the_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir);
    with_env(&valid_env(&url), || {
        let result = role::run("<@UFIRST>", "exec");
        assert_eq!(result.exit_code, 0, "expected role assignment to succeed: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "role");
        assert_eq!(payload["status"], "ok");
    });

    let user = stored_user(&url, "UFIRST");
    assert_eq!(user.role, Role::Exec);
    assert_eq!(user.bits, 0);
}

#[test]
fn role_can_demote_an_existing_user() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir);
    with_env(&valid_env(&url), || {
        assert_eq!(role::run("ULEAD", "leader").exit_code, 0);
        assert_eq!(role::run("ULEAD", "member").exit_code, 0);
    });

    assert_eq!(stored_user(&url, "ULEAD").role, Role::Member);
}

#[test]
fn role_rejects_unknown_roles_before_touching_config() {
    with_env(&[], || {
        let result = role::run("U1", "admin");
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_role");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("exec, leader, member"));
    });
}

#[test]
fn config_redacts_tokens_and_attributes_env_sources() {
    with_env(&valid_env("sqlite::memory:"), || {
        let result = config::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("- slack.bot_token = xoxb-*** (source: env (BOGBOT_SLACK_BOT_TOKEN))"));
        assert!(message.contains("- slack.app_token = xapp-*** (source: env (BOGBOT_SLACK_APP_TOKEN))"));
        assert!(message.contains("- server.health_check_port = 8080 (source: default)"));
        assert!(!message.contains("xoxb-test"));
    });
}

#[test]
fn doctor_reports_pending_migrations_until_migrate_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir);
    with_env(&valid_env(&url), || {
        let before: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        assert_eq!(before["overall_status"], "fail");
        assert_eq!(check_status(&before, "database_connectivity"), "pass");
        assert_eq!(check_status(&before, "database_schema"), "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        assert_eq!(after["overall_status"], "pass");
        assert_eq!(check_status(&after, "database_schema"), "pass");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[], || {
        let report: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check_status(&report, "config_validation"), "fail");
        assert_eq!(check_status(&report, "database_schema"), "skipped");

        let human = doctor::run(false);
        assert!(human.starts_with("doctor: one or more readiness checks failed"));
        assert!(human.contains("- [skip] slack_token_readiness"));
    });
}

fn check_status(report: &Value, name: &str) -> String {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or("missing")
        .to_string()
}

fn stored_user(url: &str, id: &str) -> bogbot_core::domain::user::User {
    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");
    runtime.block_on(async {
        let pool = connect_with_settings(url, 1, 5).await.expect("pool");
        let user = SqlUserRepository::new(pool.clone())
            .get_or_create(&UserId::new(id))
            .await
            .expect("stored user");
        pool.close().await;
        user
    })
}

fn database_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}", dir.path().join("bogbot.db").display())
}

fn valid_env(database_url: &str) -> Vec<(&'static str, String)> {
    vec![
        ("BOGBOT_SLACK_APP_TOKEN", "xapp-test".to_string()),
        ("BOGBOT_SLACK_BOT_TOKEN", "xoxb-test".to_string()),
        ("BOGBOT_DATABASE_URL", database_url.to_string()),
    ]
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, String)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "BOGBOT_DATABASE_URL",
        "BOGBOT_DATABASE_MAX_CONNECTIONS",
        "BOGBOT_DATABASE_TIMEOUT_SECS",
        "BOGBOT_SLACK_APP_TOKEN",
        "BOGBOT_SLACK_BOT_TOKEN",
        "BOGBOT_SLACK_API_BASE_URL",
        "BOGBOT_SERVER_BIND_ADDRESS",
        "BOGBOT_SERVER_HEALTH_CHECK_PORT",
        "BOGBOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "BOGBOT_LOGGING_LEVEL",
        "BOGBOT_LOGGING_FORMAT",
        "BOGBOT_LOG_LEVEL",
        "BOGBOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
