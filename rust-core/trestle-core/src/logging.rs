//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_DIRECTIVE: &str = "trestle=info";

/// Install the global `fmt` subscriber, optionally with JSON output
///
/// `RUST_LOG` takes precedence over [`DEFAULT_DIRECTIVE`]. Returns `false`
/// when a global subscriber was already installed, so calling this twice
/// is harmless.
pub fn init_tracing(json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing(false);
        assert!(!init_tracing(true));
    }

    #[test]
    fn test_default_directive_parses() {
        assert!(DEFAULT_DIRECTIVE.parse::<tracing_subscriber::filter::Directive>().is_ok());
    }
}
