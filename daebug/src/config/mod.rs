//! Configuration (`spec.md` §6, `SPEC_FULL.md` §4.I).
//!
//! Loaded the way `acton_htmx::config::ActonHtmxConfig` is loaded: defaults,
//! then `./daebug.toml` if present, then environment variables, with
//! explicit CLI flags overriding all of it.

use crate::error::{BrokerError, BrokerResult};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Broker configuration, merged from defaults, `daebug.toml`, `PORT`/env,
/// and CLI flags, in that precedence order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Directory the broker treats as its working root.
    pub root: PathBuf,
    /// TCP port the HTTP dispatcher binds to.
    pub port: u16,
    /// Shared path segment for the poll/result endpoints (e.g. `/daebug`).
    pub poll_path: String,
    /// Subdirectory under `root` holding per-page Markdown files.
    pub page_dir: String,
    /// Master index filename, directly under `root`.
    pub master_file: String,
    /// Filesystem-event debounce window (`spec.md` §4.D).
    pub debounce_ms: u64,
    /// Job execution deadline (`spec.md` §4.E).
    pub job_timeout_ms: u64,
    /// Long-poll randomized deadline, lower bound.
    pub long_poll_min_ms: u64,
    /// Long-poll randomized deadline, upper bound.
    pub long_poll_max_ms: u64,
    /// Executing-placeholder refresh cadence (`spec.md` §4.B).
    pub placeholder_refresh_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            port: derive_default_port(&PathBuf::from(".")),
            poll_path: "daebug".to_string(),
            page_dir: "daebug-pages".to_string(),
            master_file: "daebug.md".to_string(),
            debounce_ms: 150,
            job_timeout_ms: 60_000,
            long_poll_min_ms: 10_000,
            long_poll_max_ms: 15_000,
            placeholder_refresh_ms: 5_000,
        }
    }
}

/// Deterministic port derived from the root directory's basename
/// (`spec.md` §6: `--port` default is "a deterministic function of the
/// basename"), landing in the unprivileged, rarely-squatted 20000-29999
/// range.
#[must_use]
pub fn derive_default_port(root: &std::path::Path) -> u16 {
    let basename = root
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("daebug");
    let hash = basename.bytes().fold(0u32, |acc, b| {
        acc.wrapping_mul(31).wrapping_add(u32::from(b))
    });
    20000 + (hash % 10000) as u16
}

/// CLI-level overrides, applied last (`spec.md` §6).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root: Option<PathBuf>,
    pub port: Option<u16>,
}

impl BrokerConfig {
    /// Load configuration: defaults, then `<root-guess>/daebug.toml`, then
    /// `PORT`/`DAEBUG_*` environment variables, then explicit CLI flags.
    pub fn load(overrides: CliOverrides) -> BrokerResult<Self> {
        let root_guess = overrides
            .root
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let defaults = Self {
            root: root_guess.clone(),
            port: derive_default_port(&root_guess),
            ..Self::default()
        };

        let mut figment = Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(root_guess.join("daebug.toml")))
            .merge(Env::prefixed("DAEBUG_"));

        // `PORT` overrides the derived default, but not an explicit `--port`
        // flag (spec.md §6).
        if overrides.port.is_none() {
            figment = figment.merge(Env::raw().only(&["PORT"]).map(|_| "port".into()));
        }

        let mut config: Self = figment
            .extract()
            .map_err(|e| BrokerError::Config(e.to_string()))?;

        if let Some(root) = overrides.root {
            config.root = root;
        }
        if let Some(port) = overrides.port {
            config.port = port;
        }

        Ok(config)
    }
}
