use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use client_core::DEFAULT_GREETING;
use serde::Deserialize;
use shared::domain::SamplingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ollama_url: Option<String>,
    pub default_model: Option<String>,
    pub sampling: SamplingConfig,
    pub log_filter: String,
    pub greeting: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ollama_url: None,
            default_model: None,
            sampling: SamplingConfig::default(),
            log_filter: "info".into(),
            greeting: DEFAULT_GREETING.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    ollama_url: Option<String>,
    default_model: Option<String>,
    temperature: Option<f32>,
    top_k: Option<f32>,
    top_p: Option<f32>,
    log_filter: Option<String>,
    greeting: Option<String>,
}

/// Settings plus the overrides that had to be skipped. Logging is not set up
/// yet while settings load, so the caller reports them afterwards.
#[derive(Debug)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub ignored_overrides: Vec<String>,
}

/// Defaults, then the TOML file, then `APP__*` environment variables.
pub fn load_settings(explicit_path: Option<&Path>) -> anyhow::Result<LoadedSettings> {
    let mut settings = Settings::default();

    let path = match explicit_path {
        Some(path) => Some(path.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|path| path.exists()),
    };
    if let Some(path) = path {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        apply_file_settings(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?;
    }

    let ignored_overrides = apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(LoadedSettings {
        settings,
        ignored_overrides,
    })
}

fn apply_file_settings(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;

    if let Some(v) = file_cfg.ollama_url {
        settings.ollama_url = Some(v);
    }
    if let Some(v) = file_cfg.default_model {
        settings.default_model = Some(v);
    }
    if let Some(v) = file_cfg.temperature {
        settings.sampling.temperature = v;
    }
    if let Some(v) = file_cfg.top_k {
        settings.sampling.top_k = v;
    }
    if let Some(v) = file_cfg.top_p {
        settings.sampling.top_p = v;
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
    if let Some(v) = file_cfg.greeting {
        settings.greeting = v;
    }
    Ok(())
}

/// Returns the keys whose values could not be parsed.
fn apply_env_overrides<F>(settings: &mut Settings, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut ignored = Vec::new();

    if let Some(v) = lookup("APP__OLLAMA_URL") {
        settings.ollama_url = Some(v);
    }
    if let Some(v) = lookup("APP__DEFAULT_MODEL") {
        settings.default_model = Some(v);
    }
    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
    if let Some(v) = lookup("APP__GREETING") {
        settings.greeting = v;
    }

    let numeric: [(&str, &mut f32); 3] = [
        ("APP__TEMPERATURE", &mut settings.sampling.temperature),
        ("APP__TOP_K", &mut settings.sampling.top_k),
        ("APP__TOP_P", &mut settings.sampling.top_p),
    ];
    for (key, slot) in numeric {
        if let Some(v) = lookup(key) {
            match v.trim().parse::<f32>() {
                Ok(parsed) if parsed.is_finite() => *slot = parsed,
                _ => ignored.push(format!("{key}={v}")),
            }
        }
    }

    ignored
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
