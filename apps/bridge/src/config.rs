use std::{fs, path::Path};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "bridge.toml";
pub const MIN_FEEDBACK_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_filter: String,
    pub feedback_capacity: usize,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: "info".into(),
            feedback_capacity: deck_core::DEFAULT_FEEDBACK_CAPACITY,
            user_agent: concat!("deck-bridge/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// Defaults, then the TOML file, then environment overrides. An explicit
/// `path` must exist; the default file is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = match path {
        Some(path) => read_settings_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            read_settings_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => Settings::default(),
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.feedback_capacity = settings.feedback_capacity.max(MIN_FEEDBACK_CAPACITY);
    Ok(settings)
}

fn read_settings_file(path: &Path) -> anyhow::Result<Settings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    parse_settings(&raw)
        .with_context(|| format!("failed to parse config file '{}'", path.display()))
}

fn parse_settings(raw: &str) -> anyhow::Result<Settings> {
    Ok(toml::from_str::<Settings>(raw)?)
}

fn apply_env_overrides(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("DECK_BRIDGE_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = var("DECK_BRIDGE_FEEDBACK_CAPACITY") {
        if let Ok(parsed) = v.trim().parse::<usize>() {
            settings.feedback_capacity = parsed;
        }
    }
    if let Some(v) = var("DECK_BRIDGE_USER_AGENT") {
        settings.user_agent = v;
    }
}
