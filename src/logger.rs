//! Setup logging subsystem.

use crate::config::{Log, LogFormat};
use tracing_subscriber::EnvFilter;

/// Directive used when neither `RUST_LOG` nor the configured level parses: warnings from
/// dependencies, the configured level for this crate.
fn directive(level: &str) -> String {
    format!("warn,novalnet_bridge={level}")
}

/// Installs the global subscriber. Output goes to stderr so replay CSV on stdout stays clean.
///
/// `RUST_LOG` overrides the configured level. Calling this twice is harmless.
pub fn setup(config: &Log) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive(&config.level)))
        .unwrap_or_else(|_| EnvFilter::new(directive("info")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = match config.format {
        LogFormat::Default => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
    };
    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_twice_is_harmless() {
        let config = Log {
            level: "debug".into(),
            format: LogFormat::Json,
        };
        setup(&config);
        setup(&config);
    }

    #[test]
    fn test_directive_scopes_crate_level() {
        assert_eq!(directive("trace"), "warn,novalnet_bridge=trace");
    }
}
