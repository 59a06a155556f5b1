use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use shared::domain::{SessionId, DEFAULT_OVERS_LIMIT, DEFAULT_WICKETS_LIMIT};

pub const CONFIG_FILE: &str = "scorer.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub overs_limit: u32,
    pub wickets_limit: u32,
    /// Session to resume on startup. A new session is opened when unset or unknown.
    pub session_id: Option<SessionId>,
    pub command_queue_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8787".into(),
            database_url: "sqlite://./data/scorer.db".into(),
            overs_limit: DEFAULT_OVERS_LIMIT,
            wickets_limit: DEFAULT_WICKETS_LIMIT,
            session_id: None,
            command_queue_depth: 64,
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(CONFIG_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the flat `key = "value"` file, then the environment.
pub fn load_settings_from(
    config_path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_path) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            apply(&mut settings, |key| file_cfg.get(key).cloned());
        }
    }

    apply_env(&mut settings, &env);
    settings
}

fn apply(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("bind_addr") {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("database_url") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("overs_limit").and_then(|v| parse_limit(&v)) {
        settings.overs_limit = v;
    }
    if let Some(v) = lookup("wickets_limit").and_then(|v| parse_limit(&v)) {
        settings.wickets_limit = v;
    }
    if let Some(v) = lookup("session_id").and_then(|v| v.trim().parse::<i64>().ok()) {
        settings.session_id = Some(SessionId(v));
    }
    if let Some(v) = lookup("command_queue_depth").and_then(|v| parse_limit(&v)) {
        settings.command_queue_depth = v as usize;
    }
}

fn apply_env(settings: &mut Settings, env: &impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("SCORER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }

    apply(settings, |key| {
        env(&format!("APP__{}", key.to_ascii_uppercase()))
    });
}

fn parse_limit(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|limit| *limit >= 1)
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(parent) = sqlite_path(database_url)
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
    else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(&parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
