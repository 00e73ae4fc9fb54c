//! Structured logging setup shared by the toolmesh binaries.
//!
//! Libraries in the workspace only emit `tracing` events. Binaries call
//! [`init_tracing`] once at startup to install a `fmt` subscriber filtered by
//! `RUST_LOG`, falling back to [`TelemetryConfig::filter`].

#![warn(missing_docs, clippy::pedantic)]

use std::env;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the configured filter.
pub const FILTER_ENV: &str = "RUST_LOG";

/// Result alias for telemetry setup.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive could not be parsed.
    #[error("invalid log filter `{directive}`: {reason}")]
    InvalidFilter {
        /// Directive that was rejected.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("tracing subscriber already initialised: {0}")]
    AlreadyInitialised(String),

    /// Unrecognised output format name.
    #[error("unknown log format `{0}` (expected `compact` or `full`)")]
    UnknownFormat(String),
}

/// Line layout of emitted events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line output with fields inline.
    #[default]
    Compact,
    /// Default `fmt` layout including span context.
    Full,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "full" => Ok(Self::Full),
            _ => Err(TelemetryError::UnknownFormat(input.to_owned())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compact => "compact",
            Self::Full => "full",
        })
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Output layout.
    pub format: LogFormat,
    /// Whether to print the event target (module path).
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            format: LogFormat::Compact,
            with_target: false,
        }
    }
}

impl TelemetryConfig {
    /// Replaces the fallback filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Selects the output layout.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Toggles target printing.
    #[must_use]
    pub const fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Picks the directive in effect: the override when present and
    /// non-blank, otherwise the configured filter.
    #[must_use]
    pub fn effective_filter<'a>(&'a self, env_override: Option<&'a str>) -> &'a str {
        env_override
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(self.filter.as_str())
    }
}

fn build_filter(directive: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directive).map_err(|err| TelemetryError::InvalidFilter {
        directive: directive.to_owned(),
        reason: err.to_string(),
    })
}

/// Installs the global `fmt` subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for an unparsable directive and
/// [`TelemetryError::AlreadyInitialised`] when called twice.
pub fn init_tracing(config: &TelemetryConfig) -> TelemetryResult<()> {
    let env_override = env::var(FILTER_ENV).ok();
    let filter = build_filter(config.effective_filter(env_override.as_deref()))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);
    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Full => builder.try_init(),
    };
    installed.map_err(|err| TelemetryError::AlreadyInitialised(err.to_string()))?;
    tracing::debug!(format = %config.format, "tracing initialised");
    Ok(())
}
