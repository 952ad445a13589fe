//! Tracing subscriber setup for hosts embedding the crate.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "orrery=info";

/// Install a formatted subscriber filtered by `RUST_LOG` plus
/// `default_directive`.
///
/// Fails if a global subscriber is already installed.
pub fn init(default_directive: &str) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(default_directive.parse()?))
        .try_init()?;
    Ok(())
}
