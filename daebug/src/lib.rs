//! daebug: a file-mediated REPL broker.
//!
//! An external editor or agent drives JavaScript execution in live browser
//! pages and workers by writing fenced code blocks into Markdown files;
//! daebug watches those files, dispatches the code to the page's injected
//! client over a long-poll HTTP endpoint, and writes the result back into
//! the same file. The Markdown file is simultaneously the request queue and
//! the reply log.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use daebug::{broker::Broker, config::{BrokerConfig, CliOverrides}, http};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     daebug::observability::init()?;
//!     let config = BrokerConfig::load(CliOverrides::default())?;
//!     let port = config.port;
//!     let (handle, broker) = Broker::spawn(config.clone())?;
//!     let app = http::router(&config, handle);
//!     let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
//!     tokio::select! {
//!         () = broker.run() => {}
//!         result = axum::serve(listener, app) => { result?; }
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(clippy::cargo)]
#![allow(clippy::module_name_repetitions)]

pub mod broker;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod jobs;
pub mod observability;
pub mod registry;
pub mod shutdown;
pub mod watcher;

#[cfg(test)]
pub mod testing;
