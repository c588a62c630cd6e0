//! Secret handling
//!
//! API keys and tokens are kept in `Zeroizing<String>` so they are wiped from
//! memory when dropped. Secrets come from the environment (a `.env` file is
//! loaded by `main`), and an empty value counts as missing.

use tracing::debug;
use zeroize::Zeroizing;

/// Error type for secret loading operations
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SecretError {
    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Secret validation failed: {0}")]
    ValidationFailed(String),
}

/// Wrap a looked-up value, rejecting absent or blank secrets
pub fn require(env_var_name: &str, value: Option<String>) -> Result<Zeroizing<String>, SecretError> {
    let value = Zeroizing::new(value.ok_or_else(|| SecretError::EnvVarNotSet(env_var_name.to_string()))?);

    if value.trim().is_empty() {
        return Err(SecretError::ValidationFailed(format!(
            "{} is set but empty",
            env_var_name
        )));
    }
    if value.trim().len() != value.len() {
        return Err(SecretError::ValidationFailed(format!(
            "{} has leading or trailing whitespace",
            env_var_name
        )));
    }

    debug!("Loaded secret {}", env_var_name);
    Ok(value)
}
