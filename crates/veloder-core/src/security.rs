use std::env;

use crate::VeloderError;

/// Wrapper around sensitive values to reduce accidental logging.
#[derive(Clone)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***redacted***")
    }
}

/// Require that a given environment variable is set and non-empty.
pub fn require_env(var: &str) -> Result<SecretValue, VeloderError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretValue(value)),
        _ => Err(VeloderError::MissingSecret(var.to_string())),
    }
}

/// Require every listed variable, reporting all missing ones at once.
pub fn require_all(vars: &[&str]) -> Result<Vec<SecretValue>, VeloderError> {
    let mut values = Vec::with_capacity(vars.len());
    let mut missing = Vec::new();
    for var in vars {
        match require_env(var) {
            Ok(value) => values.push(value),
            Err(_) => missing.push(*var),
        }
    }

    if missing.is_empty() {
        Ok(values)
    } else {
        Err(VeloderError::MissingSecret(missing.join(", ")))
    }
}
