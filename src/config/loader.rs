//! Configuration loading from disk.
//!
//! # Data Flow
//! ```text
//! .env.local / .env      (dotenvy, never overriding the real environment)
//!     → read file
//!     → expand ${VAR} / $VAR
//!     → parse (TOML by extension, YAML otherwise)
//!     → environment overrides
//!     → validate
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse TOML config {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value `{value}` for environment variable {name}")]
    Env { name: &'static str, value: String },

    #[error("invalid configuration: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Load `.env.local` then `.env` into the process environment.
///
/// Variables already set are kept; missing files are ignored.
pub fn load_dotenv() {
    for file in [".env.local", ".env"] {
        match dotenvy::from_filename(file) {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded environment file"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(file, error = %e, "Failed to load environment file"),
        }
    }
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("environment variable pattern is valid")
    })
}

/// Replace `${VAR}` and `$VAR` using `lookup`; unknown variables expand to
/// the empty string.
pub fn expand_env_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    env_pattern()
        .replace_all(input, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            lookup(name).unwrap_or_default()
        })
        .into_owned()
}

/// Expand variables from the process environment.
pub fn expand_env(input: &str) -> String {
    expand_env_with(input, |name| std::env::var(name).ok())
}

/// Parse configuration text. `path` selects the format and labels errors.
pub fn parse_config(content: &str, path: &Path) -> Result<GatewayConfig, ConfigError> {
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    if is_toml {
        toml::from_str(content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    } else if content.trim().is_empty() {
        Ok(GatewayConfig::default())
    } else {
        serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn parse_bool(name: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env { name, value }),
    }
}

/// Apply environment overrides read through `lookup`.
pub fn apply_overrides_with<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(addr) = var("LISTEN_ADDR") {
        config.listen_addr = addr;
    }
    if let Some(level) = var("LOG_LEVEL") {
        config.log_level = level;
    }
    if let Some(json) = var("JSON_LOG") {
        config.json_log = parse_bool("JSON_LOG", json)?;
    }
    if let Some(name) = var("FEDERATED_GRAPH_NAME") {
        config.graph.name = name;
    }
    if let Some(token) = var("GRAPH_API_TOKEN") {
        config.graph.token = token;
    }
    Ok(())
}

pub fn apply_env_overrides(config: &mut GatewayConfig) -> Result<(), ConfigError> {
    apply_overrides_with(config, |name| std::env::var(name).ok())
}

fn finish(mut config: GatewayConfig) -> Result<GatewayConfig, ConfigError> {
    apply_env_overrides(&mut config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load, expand, override and validate the configuration at `path`.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&expand_env(&content), path)?;
    finish(config)
}

/// Like [`load_config`], but a missing file at the default location falls
/// back to built-in defaults. An explicitly requested file must exist.
pub fn load_config_or_default(path: &Path, explicit: bool) -> Result<GatewayConfig, ConfigError> {
    if !explicit && !path.exists() {
        tracing::info!(path = %path.display(), "No config file found, using defaults");
        return finish(GatewayConfig::default());
    }
    load_config(path)
}
