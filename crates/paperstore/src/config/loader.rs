use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::config::schema::{Config, StorageBackend};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Loads `explicit` if given, else `~/.paperstore/config.json` when it
/// exists, else the built-in defaults.
pub fn load_config_or_default(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match default_config_path() {
        Some(path) if path.exists() => load_config(path),
        _ => Ok(Config::default()),
    }
}

/// Returns `~/.paperstore/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".paperstore").join("config.json"))
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub(crate) fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.server.listen_addr.parse::<SocketAddr>().is_err() {
        return Err(ConfigError::Validation {
            message: format!("Invalid listen address: {}", config.server.listen_addr),
        });
    }

    if config.storage.backend == StorageBackend::Local
        && config
            .storage
            .local_directory
            .as_deref()
            .is_none_or(|d| d.trim().is_empty())
    {
        return Err(ConfigError::Validation {
            message: "storage.local_directory is required for the local backend".to_string(),
        });
    }

    let batch = &config.batch;
    if batch.chunk_size == 0 || batch.max_pages == 0 || batch.max_in_flight_jobs == 0 {
        return Err(ConfigError::Validation {
            message: "batch.chunk_size, batch.max_pages and batch.max_in_flight_jobs must be positive"
                .to_string(),
        });
    }
    if batch.poll_interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "batch.poll_interval_secs must be at least 1".to_string(),
        });
    }
    if !batch.cost_per_paper_usd.is_finite() || batch.cost_per_paper_usd < 0.0 {
        return Err(ConfigError::Validation {
            message: "batch.cost_per_paper_usd must be a non-negative number".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_minimal_config() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config.batch.chunk_size, 20);
        assert_eq!(config.batch.max_pages, 2);
        assert_eq!(config.batch.poll_interval_secs, 30);
        assert_eq!(config.batch.cost_per_paper_usd, 0.005);
        assert_eq!(config.storage.backend, StorageBackend::Drive);
        assert_eq!(
            config.gemini.api_key_env_var.as_deref(),
            Some("GEMINI_API_KEY")
        );
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "server": { "listen_addr": "0.0.0.0:9000", "cors_allow_any_origin": false },
            "database": { "path": "/tmp/papers.db" },
            "storage": { "backend": "local", "local_directory": "/tmp/pdfs" },
            "gemini": { "model": "gemini-2.5-flash" },
            "batch": { "chunk_size": 5, "poll_interval_secs": 2, "max_in_flight_jobs": 1 }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:9000");
        assert!(!config.server.cors_allow_any_origin);
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.batch.chunk_size, 5);
        assert_eq!(config.batch.max_pages, 2);
        assert_eq!(config.gemini.resolve_model().as_deref(), Some("gemini-2.5-flash"));
    }

    #[test]
    fn test_invalid_version() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unknown_field_rejected_by_schema() {
        let result = load_config_from_str(r#"{ "version": "1.0", "workers": 4 }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let result = load_config_from_str(r#"{ "version": "1.0", "batch": { "chunk_size": 0 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_local_backend_requires_directory() {
        let result =
            load_config_from_str(r#"{ "version": "1.0", "storage": { "backend": "local" } }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_listen_addr() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "server": { "listen_addr": "localhost" } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_json() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "version": "1.0", "batch": {{ "max_pages": 3 }} }}"#).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.batch.max_pages, 3);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/paperstore.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_defaults_are_valid() {
        validate_config(&Config::default()).unwrap();
    }
}
