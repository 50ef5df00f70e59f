use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use crate::VeloderError;
use crate::config::Config;

const RUST_LOG_ENV: &str = "RUST_LOG";

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Configuration options when initialising telemetry.
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    pub env_filter: Option<String>,
    pub with_ansi: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            env_filter: None,
            with_ansi: true,
        }
    }
}

impl TelemetryOptions {
    /// `debug` for verbose agents, else `logging.level`. `RUST_LOG` still wins.
    pub fn from_config(config: &Config) -> Self {
        let level = if config.agents.verbose {
            "debug".to_string()
        } else {
            config.logging.level.clone()
        };
        Self {
            env_filter: Some(format!("warn,veloder_core={level},veloder={level}")),
            with_ansi: true,
        }
    }
}

/// `RUST_LOG` when set, else the options' filter, else `info`.
fn effective_filter(rust_log: Option<String>, options: &TelemetryOptions) -> String {
    rust_log
        .filter(|value| !value.trim().is_empty())
        .or_else(|| options.env_filter.clone())
        .unwrap_or_else(|| "info".to_string())
}

fn rust_log() -> Option<String> {
    std::env::var(RUST_LOG_ENV).ok()
}

/// Initialise the global tracing subscriber.
///
/// Safe to call multiple times; only the first invocation installs the subscriber.
pub fn init_telemetry(options: TelemetryOptions) -> Result<(), VeloderError> {
    if FILTER_HANDLE.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::new(effective_filter(rust_log(), &options));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_ansi(options.with_ansi)
                .with_target(false),
        )
        .try_init()
        .map_err(|err| {
            VeloderError::InvalidConfiguration(format!("telemetry init failed: {err}"))
        })?;

    let _ = FILTER_HANDLE.set(handle);
    Ok(())
}

/// Swap the active filter once the configuration is known. `RUST_LOG` still
/// wins; installs the subscriber if nothing did yet.
pub fn reconfigure_telemetry(options: TelemetryOptions) -> Result<(), VeloderError> {
    let Some(handle) = FILTER_HANDLE.get() else {
        return init_telemetry(options);
    };
    if rust_log().is_some_and(|value| !value.trim().is_empty()) {
        return Ok(());
    }
    handle
        .reload(EnvFilter::new(effective_filter(None, &options)))
        .map_err(|err| {
            VeloderError::InvalidConfiguration(format!("telemetry reload failed: {err}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_agents_enable_debug() {
        let options = TelemetryOptions::from_config(&Config::default());
        assert_eq!(
            options.env_filter.as_deref(),
            Some("warn,veloder_core=debug,veloder=debug")
        );
    }

    #[test]
    fn quiet_agents_use_configured_level() {
        let mut config = Config::default();
        config.agents.verbose = false;
        config.logging.level = "warn".into();
        let options = TelemetryOptions::from_config(&config);
        assert_eq!(
            options.env_filter.as_deref(),
            Some("warn,veloder_core=warn,veloder=warn")
        );
    }

    #[test]
    fn rust_log_overrides_configured_filter() {
        let options = TelemetryOptions::from_config(&Config::default());
        assert_eq!(effective_filter(Some("trace".into()), &options), "trace");
        assert_eq!(
            effective_filter(Some("  ".into()), &options),
            "warn,veloder_core=debug,veloder=debug"
        );
        assert_eq!(effective_filter(None, &TelemetryOptions::default()), "info");
    }

    #[test]
    fn filter_can_be_replaced_after_install() {
        init_telemetry(TelemetryOptions::default()).unwrap();
        reconfigure_telemetry(TelemetryOptions::from_config(&Config::default())).unwrap();
        assert!(FILTER_HANDLE.get().is_some());
    }
}
