//! Tracing initialization.
//!
//! [`init_tracing`] installs the global subscriber in one of two modes:
//! - **JSON** (`json = true`): one object per event with RFC 3339 UTC
//!   timestamps, for piping session logs into other tools.
//! - **Pretty** (`json = false`): human-readable output for the terminal.
//!
//! Both respect `RUST_LOG` (e.g. `RUST_LOG=solvault_core=debug`) and fall
//! back to `info`.

use std::fmt;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Install the global tracing subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(json: bool) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_timer(UtcTimer)
            .with_target(true)
            .with_current_span(false);
        registry.with(json_layer).try_init()
    } else {
        let pretty_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(false);
        registry.with(pretty_layer).try_init()
    }
}

/// Millisecond UTC timestamps via chrono.
#[derive(Debug, Clone, Copy)]
struct UtcTimer;

impl FormatTime for UtcTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_fails_instead_of_panicking() {
        let _ = init_tracing(false);
        assert!(init_tracing(true).is_err());
    }
}
