use serde::{Deserialize, Serialize};

use crate::secrets::{resolve_secret, resolve_secret_optional, SecretError};
use secrecy::SecretString;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub arxiv: ArxivConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            gemini: GeminiConfig::default(),
            batch: BatchConfig::default(),
            arxiv: ArxivConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_true")]
    pub cors_allow_any_origin: bool,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cors_allow_any_origin: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Falls back to `~/.paperstore/data/paperstore.db` when unset.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Drive,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub local_directory: Option<String>,
    #[serde(default)]
    pub drive_folder_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_client_id_env_var")]
    pub client_id_env_var: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_secret_file: Option<String>,
    #[serde(default = "default_client_secret_env_var")]
    pub client_secret_env_var: Option<String>,
}

fn default_client_id_env_var() -> Option<String> {
    Some("GOOGLE_CLIENT_ID".to_string())
}

fn default_client_secret_env_var() -> Option<String> {
    Some("GOOGLE_CLIENT_SECRET".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Drive,
            local_directory: None,
            drive_folder_id: None,
            client_id: None,
            client_id_env_var: default_client_id_env_var(),
            client_secret: None,
            client_secret_file: None,
            client_secret_env_var: default_client_secret_env_var(),
        }
    }
}

impl StorageConfig {
    pub fn resolve_client_id(&self) -> Result<SecretString, SecretError> {
        resolve_secret(
            self.client_id.as_deref(),
            None,
            self.client_id_env_var.as_deref(),
        )
    }

    pub fn resolve_client_secret(&self) -> Result<SecretString, SecretError> {
        resolve_secret(
            self.client_secret.as_deref(),
            self.client_secret_file.as_deref(),
            self.client_secret_env_var.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_model_env_var")]
    pub model_env_var: Option<String>,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
}

fn default_api_key_env_var() -> Option<String> {
    Some("GEMINI_API_KEY".to_string())
}

fn default_model_env_var() -> Option<String> {
    Some("GEMINI_PDF_MODEL".to_string())
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
            model: None,
            model_env_var: default_model_env_var(),
            base_url: default_gemini_base_url(),
        }
    }
}

impl GeminiConfig {
    /// Resolves the API key; blank values count as missing.
    pub fn resolve_api_key(&self) -> Result<Option<SecretString>, SecretError> {
        use secrecy::ExposeSecret;

        match resolve_secret_optional(
            self.api_key.as_deref(),
            self.api_key_file.as_deref(),
            self.api_key_env_var.as_deref(),
        ) {
            Ok(Some(key)) if key.expose_secret().trim().is_empty() => Ok(None),
            Ok(key) => Ok(key),
            Err(SecretError::EnvVarNotSet { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolves the model name from the config value, then the env var.
    pub fn resolve_model(&self) -> Option<String> {
        let direct = self
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        direct.or_else(|| {
            self.model_env_var
                .as_deref()
                .and_then(|name| std::env::var(name).ok())
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_loop_interval_secs")]
    pub loop_interval_secs: u64,
    #[serde(default = "default_max_in_flight_jobs")]
    pub max_in_flight_jobs: usize,
    #[serde(default = "default_cost_per_paper_usd")]
    pub cost_per_paper_usd: f64,
}

fn default_chunk_size() -> usize {
    20
}

fn default_max_pages() -> usize {
    2
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_loop_interval_secs() -> u64 {
    10
}

fn default_max_in_flight_jobs() -> usize {
    4
}

fn default_cost_per_paper_usd() -> f64 {
    0.005
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_pages: default_max_pages(),
            poll_interval_secs: default_poll_interval_secs(),
            loop_interval_secs: default_loop_interval_secs(),
            max_in_flight_jobs: default_max_in_flight_jobs(),
            cost_per_paper_usd: default_cost_per_paper_usd(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArxivConfig {
    #[serde(default = "default_arxiv_api_url")]
    pub api_url: String,
    #[serde(default = "default_arxiv_pdf_base_url")]
    pub pdf_base_url: String,
}

fn default_arxiv_api_url() -> String {
    "https://export.arxiv.org/api/query".to_string()
}

fn default_arxiv_pdf_base_url() -> String {
    "https://arxiv.org/pdf".to_string()
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            api_url: default_arxiv_api_url(),
            pdf_base_url: default_arxiv_pdf_base_url(),
        }
    }
}
