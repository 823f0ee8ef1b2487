use std::{collections::HashMap, fs};

use serde::Deserialize;
use tracing::warn;

pub const CONFIG_FILE: &str = "dashboard.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub completion_model: String,
    pub page_size: u32,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/sales.db".into(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".into(),
            completion_model: "gpt-3.5-turbo".into(),
            page_size: 10,
            log_filter: "info".into(),
        }
    }
}

/// Defaults, then `dashboard.toml` in the working directory, then the
/// process environment.
pub fn load_settings() -> Settings {
    let file = fs::read_to_string(CONFIG_FILE).ok();
    from_sources(file.as_deref(), |key| std::env::var(key).ok())
}

/// Later layers win. `APP__*` variables override their plain counterparts.
pub fn from_sources(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        match toml::from_str::<HashMap<String, toml::Value>>(raw) {
            Ok(file_cfg) => apply_file(&mut settings, &file_cfg),
            Err(err) => warn!(%err, file = CONFIG_FILE, "config: ignoring unreadable file"),
        }
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("OPENAI_API_KEY") {
        settings.openai_api_key = Some(v);
    }
    if let Some(v) = env("APP__OPENAI_API_KEY") {
        settings.openai_api_key = Some(v);
    }

    if let Some(v) = env("OPENAI_BASE_URL") {
        settings.openai_base_url = v;
    }
    if let Some(v) = env("APP__OPENAI_BASE_URL") {
        settings.openai_base_url = v;
    }

    if let Some(v) = env("APP__COMPLETION_MODEL") {
        settings.completion_model = v;
    }

    if let Some(v) = env("APP__PAGE_SIZE") {
        apply_page_size(&mut settings, &v);
    }

    if let Some(v) = env("RUST_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = env("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    settings.database_url = normalize_database_url(&settings.database_url);
    settings
}

fn apply_file(settings: &mut Settings, file_cfg: &HashMap<String, toml::Value>) {
    let text = |key: &str| match file_cfg.get(key) {
        Some(toml::Value::String(v)) => Some(v.clone()),
        Some(other) => Some(other.to_string()),
        None => None,
    };

    if let Some(v) = text("database_url") {
        settings.database_url = v;
    }
    if let Some(v) = text("openai_api_key") {
        settings.openai_api_key = Some(v);
    }
    if let Some(v) = text("openai_base_url") {
        settings.openai_base_url = v;
    }
    if let Some(v) = text("completion_model") {
        settings.completion_model = v;
    }
    if let Some(v) = text("page_size") {
        apply_page_size(settings, &v);
    }
    if let Some(v) = text("log_filter") {
        settings.log_filter = v;
    }
}

fn apply_page_size(settings: &mut Settings, raw: &str) {
    match raw.trim().parse::<u32>() {
        Ok(size) if size > 0 => settings.page_size = size,
        _ => warn!(
            value = raw,
            kept = settings.page_size,
            "config: page_size must be a positive integer"
        ),
    }
}

/// Normalizes the URL and makes sure a file database can be created.
pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    storage::ensure_sqlite_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

/// Accepts plain file paths and `sqlite:` shorthands as well as full URLs.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
