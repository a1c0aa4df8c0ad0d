use super::types::*;
use crate::config::{expand_env_vars, expand_tilde, ENV_VAR_PATTERN};
use regex::Regex;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Validation(format!(
            "in file '{}': {}",
            path.display(),
            e
        )),
        other => other,
    })
}

/// Parse and validate a config from YAML text.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    // Comment lines may mention `$env{...}` as documentation; only expand values.
    let yaml = expand_env_vars(&strip_comment_lines(yaml));
    check_unexpanded_vars(&yaml)?;

    let mut config: Config = serde_yaml::from_str(&yaml)?;

    config.system.data_path = expand_tilde(&config.system.data_path);
    config.store.path = expand_tilde(&config.store.path);

    validate_config(&config)?;

    Ok(config)
}

fn strip_comment_lines(yaml: &str) -> String {
    yaml.lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml: &str) -> Result<(), ConfigError> {
    let re = Regex::new(ENV_VAR_PATTERN)
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    let mut unexpanded: Vec<String> = re
        .captures_iter(yaml)
        .map(|cap| cap[1].to_string())
        .collect();

    if unexpanded.is_empty() {
        return Ok(());
    }

    unexpanded.sort();
    unexpanded.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}\n\
         Set them (e.g. export {}=...) or replace them in the config file",
        unexpanded.join(", "),
        unexpanded[0]
    )))
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.system.data_path.as_os_str().is_empty() {
        errors.push("system.data_path cannot be empty".to_string());
    }
    for (i, ext) in config.system.extensions.iter().enumerate() {
        if ext.is_empty() || ext.starts_with('.') {
            errors.push(format!(
                "system.extensions[{}]: '{}' must be a bare extension like 'html'",
                i, ext
            ));
        }
    }

    if config.store.path.as_os_str().is_empty() {
        errors.push("store.path cannot be empty".to_string());
    }

    if config.pipeline.filenames_buffer == 0 {
        errors.push("pipeline.filenames_buffer must be at least 1".to_string());
    }
    if config.pipeline.messages_buffer == 0 {
        errors.push("pipeline.messages_buffer must be at least 1".to_string());
    }

    if config.writer.batch_size == 0 {
        errors.push("writer.batch_size must be at least 1".to_string());
    }
    if config.writer.queue_capacity == 0 {
        errors.push("writer.queue_capacity must be at least 1".to_string());
    }
    if config.writer.flush_period < Duration::from_millis(1) {
        errors.push("writer.flush_period must be at least 1ms".to_string());
    }

    if config.server.listen.parse::<std::net::SocketAddr>().is_err() {
        errors.push(format!(
            "server.listen: '{}' is not a valid socket address",
            config.server.listen
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
