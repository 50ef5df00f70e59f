//! Flat `key: value` descriptor files used to override agent personas and
//! task wording without recompiling.
//!
//! ```text
//! role: Pesquisador
//! backstory: Você é um pesquisador
//!   com anos de experiência.
//! ```
//!
//! A line containing `:` that does not start with a space opens a new key.
//! Every other line continues the current value.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

/// Parsed descriptor: key to trimmed, newline-joined value.
pub type Descriptor = HashMap<String, String>;

pub fn parse_descriptor(content: &str) -> Descriptor {
    let mut config = Descriptor::new();
    let mut current_key: Option<String> = None;
    let mut current_value: Vec<String> = Vec::new();

    for line in content.trim().lines() {
        match line.split_once(':') {
            Some((key, value)) if !line.starts_with(' ') => {
                // Lines seen before the first key fold into it.
                if let Some(previous) = current_key.take() {
                    config.insert(previous, current_value.join("\n").trim().to_string());
                    current_value.clear();
                }
                current_key = Some(key.trim().to_string());
                if !value.trim().is_empty() {
                    current_value.push(value.trim().to_string());
                }
            }
            _ => current_value.push(line.trim().to_string()),
        }
    }

    if let Some(key) = current_key {
        config.insert(key, current_value.join("\n").trim().to_string());
    }

    config
}

/// Load `<dir>/<name>.txt`; a missing or unreadable file is an empty descriptor.
pub fn load_descriptor(dir: impl AsRef<Path>, name: &str) -> Descriptor {
    let path = dir.as_ref().join(format!("{name}.txt"));
    match fs::read_to_string(&path) {
        Ok(content) => parse_descriptor(&content),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "descriptor not loaded; using defaults");
            Descriptor::new()
        }
    }
}
