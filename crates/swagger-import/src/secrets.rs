//! Secret references in task files.
//!
//! String settings may point at a secret instead of holding it:
//! - `env://VAR_NAME` - environment variable
//! - `file:///path/to/secret` - file content (trimmed)
//!
//! Anything else is taken literally.

use thiserror::Error;

/// Errors during secret resolution.
#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("environment variable not set: {0}")]
    EnvNotFound(String),

    #[error("secret file not found: {0}")]
    FileNotFound(String),

    #[error("failed to read secret file: {0}")]
    FileReadError(String),

    #[error("secret reference resolved to an empty value: {0}")]
    Empty(String),
}

/// Resolve a setting: secret references are looked up, literals pass through.
pub fn resolve_value(value: &str) -> Result<String, SecretsError> {
    let resolved = if let Some(var_name) = value.strip_prefix("env://") {
        std::env::var(var_name).map_err(|_| SecretsError::EnvNotFound(var_name.to_string()))?
    } else if let Some(path) = value.strip_prefix("file://") {
        std::fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SecretsError::FileNotFound(path.to_string())
                } else {
                    SecretsError::FileReadError(format!("{}: {}", path, e))
                }
            })?
    } else {
        return Ok(value.to_string());
    };

    if resolved.is_empty() {
        return Err(SecretsError::Empty(value.to_string()));
    }
    Ok(resolved)
}

/// Resolve an optional setting. Empty literals count as unset.
pub fn resolve_optional(value: Option<&str>) -> Result<Option<String>, SecretsError> {
    match value {
        None => Ok(None),
        Some(v) if v.trim().is_empty() => Ok(None),
        Some(v) => resolve_value(v).map(Some),
    }
}
