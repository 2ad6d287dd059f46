//! Secret resolution and at-rest encryption for stored OAuth tokens.
//!
//! API keys and client credentials resolve from, in order: a direct config
//! value, a file (Docker secrets style), or an environment variable.
//! Drive refresh tokens are sealed with AES-256-GCM before they reach
//! the database.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use secrecy::SecretString;
use std::fs;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Decryption error: {0}")]
    DecryptionError(String),

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from the first non-empty source.
///
/// ```ignore
/// use paperstore::secrets::resolve_secret;
///
/// let key = resolve_secret(None, Some("~/.secrets/gemini"), Some("GEMINI_API_KEY"))?;
/// ```
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        return fs::read_to_string(&expanded)
            .map(|content| SecretString::from(content.trim().to_string()))
            .map_err(|e| SecretError::FileReadError {
                path: expanded,
                source: e,
            });
    }

    if let Some(name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(name) {
            Ok(value) => Ok(SecretString::from(value.trim())),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Like [`resolve_secret`], but a missing source is `Ok(None)`.
pub fn resolve_secret_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(direct, file_path, env_var) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Expands a leading `~` to the current user's home directory.
///
/// `~user/path` is not supported.
pub fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

// ============================================
// Token Encryption
// ============================================

pub const TOKEN_KEY_ENV_VAR: &str = "PAPERSTORE_TOKEN_KEY";

/// 96-bit nonce for AES-256-GCM.
const NONCE_SIZE: usize = 12;

/// Seals OAuth tokens with AES-256-GCM.
///
/// Output format is hex of `<nonce><ciphertext>`.
pub struct TokenEncryptor {
    cipher: Aes256Gcm,
}

impl TokenEncryptor {
    /// Reads a 64-character hex key from `PAPERSTORE_TOKEN_KEY`.
    pub fn from_env() -> Result<Self> {
        let key_hex = std::env::var(TOKEN_KEY_ENV_VAR).map_err(|_| {
            SecretError::InvalidKey(format!(
                "Environment variable {} not set",
                TOKEN_KEY_ENV_VAR
            ))
        })?;

        Self::from_hex_key(&key_hex)
    }

    pub fn from_hex_key(key_hex: &str) -> Result<Self> {
        let key_bytes = hex_decode(key_hex.trim())
            .map_err(|e| SecretError::InvalidKey(format!("Invalid hex key: {}", e)))?;

        if key_bytes.len() != 32 {
            return Err(SecretError::InvalidKey(format!(
                "Key must be 32 bytes (64 hex chars), got {} bytes",
                key_bytes.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| SecretError::InvalidKey(format!("Failed to create cipher: {}", e)))?;

        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce_bytes = rand_bytes::<NONCE_SIZE>()?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| SecretError::EncryptionError(e.to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);

        Ok(hex_encode(&combined))
    }

    pub fn decrypt(&self, ciphertext_hex: &str) -> Result<String> {
        let combined = hex_decode(ciphertext_hex)
            .map_err(|e| SecretError::DecryptionError(format!("Invalid hex: {}", e)))?;

        if combined.len() < NONCE_SIZE {
            return Err(SecretError::DecryptionError(
                "Ciphertext too short".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext_bytes = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| SecretError::DecryptionError(e.to_string()))?;

        String::from_utf8(plaintext_bytes)
            .map_err(|e| SecretError::DecryptionError(format!("Invalid UTF-8: {}", e)))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";
    let mut result = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        result.push(HEX_CHARS[(byte >> 4) as usize] as char);
        result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
    }
    result
}

fn hex_decode(hex: &str) -> std::result::Result<Vec<u8>, String> {
    if hex.len() % 2 != 0 {
        return Err("Hex string must have even length".to_string());
    }
    if !hex.is_ascii() {
        return Err("Hex string must be ASCII".to_string());
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| format!("Invalid hex at position {}: {}", i, e))
        })
        .collect()
}

fn rand_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    getrandom::fill(&mut bytes).map_err(|e| {
        SecretError::EncryptionError(format!("Failed to generate random bytes: {}", e))
    })?;
    Ok(bytes)
}
