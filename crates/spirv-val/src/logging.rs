//! Opt-in `tracing` output for hosts running the validator from a CLI.
//!
//! `SPIRV_VAL_LOG` takes an `EnvFilter` directive (e.g. `spirv_val=debug`),
//! `SPIRV_VAL_LOG_FORMAT` one of `tree`, `flat` or `json`, and
//! `SPIRV_VAL_LOG_COLOR` one of `always`, `never` or `auto`.

use std::env::{self, VarError};
use std::io::{self, IsTerminal};
use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;

pub const LOG_ENV: &str = "SPIRV_VAL_LOG";
pub const LOG_FORMAT_ENV: &str = "SPIRV_VAL_LOG_FORMAT";
pub const LOG_COLOR_ENV: &str = "SPIRV_VAL_LOG_COLOR";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid output format value '{0}': expected one of tree, flat, or json")]
    InvalidFormat(String),
    #[error("invalid log color value '{0}': expected one of always, never, or auto")]
    InvalidColor(String),
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] SetGlobalDefaultError),
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Tree,
    Flat,
    Json,
}

impl OutputFormat {
    fn parse(value: Result<&str, &VarError>) -> Result<Self, LoggingError> {
        match value {
            Ok("tree") | Err(VarError::NotPresent) => Ok(Self::Tree),
            Ok("flat") => Ok(Self::Flat),
            Ok("json") => Ok(Self::Json),
            Ok(value) => Err(LoggingError::InvalidFormat(value.to_string())),
            Err(VarError::NotUnicode(value)) => {
                Err(LoggingError::InvalidFormat(value.to_string_lossy().into_owned()))
            }
        }
    }
}

fn parse_color(value: Result<&str, &VarError>) -> Result<bool, LoggingError> {
    match value {
        Ok("always") => Ok(true),
        Ok("never") => Ok(false),
        Ok("auto") | Err(VarError::NotPresent) => Ok(io::stderr().is_terminal()),
        Ok(value) => Err(LoggingError::InvalidColor(value.to_string())),
        Err(VarError::NotUnicode(value)) => {
            Err(LoggingError::InvalidColor(value.to_string_lossy().into_owned()))
        }
    }
}

/// Installs the global subscriber. Fails on a bad env value, or if a
/// subscriber is already installed.
pub fn init_logging() -> Result<(), LoggingError> {
    let filter = tracing_subscriber::EnvFilter::from_env(LOG_ENV);
    let subscriber = tracing_subscriber::Registry::default().with(filter);

    let format = env::var(LOG_FORMAT_ENV);
    let output_format = OutputFormat::parse(format.as_deref())?;
    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = match output_format {
        OutputFormat::Tree => {
            let color = env::var(LOG_COLOR_ENV);
            let tree_layer = tracing_tree::HierarchicalLayer::default()
                .with_writer(io::stderr)
                .with_ansi(parse_color(color.as_deref())?)
                .with_targets(true)
                .with_wraparound(10)
                .with_verbose_exit(true)
                .with_verbose_entry(true)
                .with_indent_amount(2);
            Box::new(subscriber.with(tree_layer))
        }
        OutputFormat::Flat => {
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
            Box::new(subscriber.with(fmt_layer))
        }
        OutputFormat::Json => {
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr);
            Box::new(subscriber.with(json_layer))
        }
    };
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn formats() {
        assert_eq!(OutputFormat::parse(Err(&VarError::NotPresent)).unwrap(), OutputFormat::Tree);
        assert_eq!(OutputFormat::parse(Ok("json")).unwrap(), OutputFormat::Json);
        assert_eq!(
            OutputFormat::parse(Ok("yaml")).unwrap_err().to_string(),
            "invalid output format value 'yaml': expected one of tree, flat, or json"
        );
    }

    #[test]
    fn colors() {
        assert!(parse_color(Ok("always")).unwrap());
        assert!(!parse_color(Ok("never")).unwrap());
        assert!(matches!(
            parse_color(Ok("sometimes")),
            Err(LoggingError::InvalidColor(value)) if value == "sometimes"
        ));
    }
}
