use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use bogbot_core::config::{env_key, locate_config_file, AppConfig};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{load_config, CommandResult};

struct ConfigFile {
    path: PathBuf,
    doc: Value,
}

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let file = locate_config_file(None).and_then(|path| load_config_file(&path));
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value) in effective_values(&config) {
        lines.push(render_line(key, &value, field_source(key, file.as_ref())));
    }

    CommandResult::success("config", lines.join("\n"))
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String)> {
    vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("slack.app_token", redact_token(config.slack.app_token.expose_secret())),
        ("slack.bot_token", redact_token(config.slack.bot_token.expose_secret())),
        ("slack.api_base_url", config.slack.api_base_url.clone()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.health_check_port", config.server.health_check_port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", config.logging.format.to_string()),
    ]
}

fn load_config_file(path: &Path) -> Option<ConfigFile> {
    let raw = fs::read_to_string(path).ok()?;
    let doc = raw.parse::<Value>().ok()?;
    Some(ConfigFile { path: path.to_path_buf(), doc })
}

fn field_source(key_path: &str, file: Option<&ConfigFile>) -> String {
    let env_key = env_key(key_path);
    if env::var_os(&env_key).is_some() {
        return format!("env ({env_key})");
    }

    match file {
        Some(file) if contains_path(&file.doc, key_path) => {
            format!("file ({})", file.path.display())
        }
        _ => "default".to_string(),
    }
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) => format!("{prefix}-***"),
        None => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use bogbot_core::config::{AppConfig, SETTING_KEYS};

    use super::{contains_path, effective_values, redact_token};

    #[test]
    fn every_setting_is_listed_once_in_order() {
        let keys: Vec<&str> =
            effective_values(&AppConfig::default()).into_iter().map(|(key, _)| key).collect();
        assert_eq!(keys, SETTING_KEYS);
    }

    #[test]
    fn tokens_keep_only_their_prefix() {
        assert_eq!(redact_token("xoxb-123-456"), "xoxb-***");
        assert_eq!(redact_token("  "), "<empty>");
        assert_eq!(redact_token("opaque"), "<redacted>");
    }

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: toml::Value = "[slack]\napi_base_url = \"http://localhost\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "slack.api_base_url"));
        assert!(!contains_path(&doc, "slack.bot_token"));
        assert!(!contains_path(&doc, "server.bind_address"));
    }
}
