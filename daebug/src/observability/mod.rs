//! Observability.
//!
//! Structured logging only: this broker has no metrics/tracing-export
//! surface, but it still carries the teacher's `tracing`/`tracing-subscriber`
//! stack for structured, level-filtered logs instead of `println!`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Pretty formatting in debug builds, JSON in release, both driven by
/// `RUST_LOG` when set and falling back to a `daebug=trace` default
/// otherwise.
///
/// # Example
///
/// ```rust,no_run
/// # fn main() -> anyhow::Result<()> {
/// daebug::observability::init()?;
/// tracing::info!("broker starting");
/// # Ok(())
/// # }
/// ```
pub fn init() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("debug,daebug=trace")
        } else {
            EnvFilter::new("info")
        }
    });

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    }

    Ok(())
}
