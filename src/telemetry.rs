//! Tracing subscriber setup

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Install the global subscriber; `RUST_LOG` overrides the default filter.
/// Fails if a subscriber is already installed.
pub fn init_telemetry() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,structured_extract=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        // another test may already have installed it
        let _ = init_telemetry();
        assert!(init_telemetry().is_err());
    }
}
