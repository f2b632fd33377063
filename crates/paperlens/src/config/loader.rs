use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::schema::{CommandConfig, Config};
use crate::error::ConfigError;
use crate::secrets::has_secret_source;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Returns the canonical config path: `~/.paperlens/config.json`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".paperlens").join("config.json"))
        .ok_or(ConfigError::NoConfigLocation)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    if config.data_directory.trim().is_empty() {
        return Err(invalid("dataDirectory must not be empty"));
    }

    if config.worker_count == 0 {
        return Err(invalid("workerCount must be at least 1"));
    }

    if config.max_upload_bytes == 0 {
        return Err(invalid("maxUploadBytes must be greater than 0"));
    }

    validate_command("extraction", &config.extraction, &["{source}", "{output}"])?;
    validate_command("analysis", &config.analysis.command, &["{text}", "{output}"])?;
    if let Some(fallback) = &config.analysis.fallback {
        validate_command("analysis.fallback", fallback, &["{text}", "{output}"])?;
        // One deadline covers every analysis attempt.
        if fallback.timeout_secs.is_some() {
            return Err(invalid(
                "analysis.fallback.timeoutSecs is not supported; analysis.timeoutSecs covers the fallback too",
            ));
        }
    }

    let mut names = HashSet::new();
    for topic in &config.topics {
        let name = topic.name.trim();
        if name.is_empty() {
            return Err(invalid("Topic names must not be empty"));
        }
        if !names.insert(name.to_lowercase()) {
            return Err(invalid(format!("Duplicate topic name: {}", name)));
        }
    }

    if tracing_subscriber::EnvFilter::try_new(&config.log_level).is_err() {
        return Err(invalid(format!("Invalid logLevel: {}", config.log_level)));
    }

    Ok(())
}

/// A stage command must name a program, reference every artifact it is
/// expected to consume or produce, and give each env entry a value source.
fn validate_command(
    stage: &str,
    command: &CommandConfig,
    required_placeholders: &[&str],
) -> Result<(), ConfigError> {
    if command.program.trim().is_empty() {
        return Err(invalid(format!("{}.program must not be empty", stage)));
    }

    for placeholder in required_placeholders {
        if !command.args.iter().any(|arg| arg.contains(placeholder)) {
            return Err(invalid(format!(
                "{}.args must reference {}",
                stage, placeholder
            )));
        }
    }

    for entry in &command.env {
        if entry.name.trim().is_empty() {
            return Err(invalid(format!("{}.env entries need a name", stage)));
        }
        if !has_secret_source(
            entry.value.as_deref(),
            entry.value_file.as_deref(),
            entry.value_env_var.as_deref(),
        ) {
            return Err(invalid(format!(
                "{}.env '{}' needs one of value, valueFile or valueEnvVar",
                stage, entry.name
            )));
        }
    }

    Ok(())
}
