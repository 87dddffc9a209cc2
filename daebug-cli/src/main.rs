//! daebug CLI entry point.

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(clippy::cargo)]

use clap::Parser;
use console::style;
use daebug::{
    broker::Broker,
    config::{BrokerConfig, CliOverrides},
    http,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// File-mediated REPL broker: drive JS in live browser pages via Markdown.
#[derive(Parser, Debug)]
#[command(name = "daebug", version, about, long_about = None)]
struct Cli {
    /// Working directory the broker treats as its root.
    #[arg(long, value_name = "PATH")]
    root: Option<PathBuf>,

    /// Port to bind the HTTP dispatcher to. Defaults to a deterministic
    /// function of the root's basename; the `PORT` environment variable
    /// overrides the default but never an explicit `--port`.
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = daebug::observability::init() {
        eprintln!("{} failed to initialize logging: {e}", style("error:").red().bold());
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{} failed to start async runtime: {e}", style("error:").red().bold());
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = CliOverrides {
        root: cli.root,
        port: cli.port,
    };
    let config = BrokerConfig::load(overrides)?;
    let port = config.port;

    let (handle, broker) = Broker::spawn(config.clone())?;
    let app = http::router(&config, handle);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| anyhow::anyhow!("could not bind port {port}: {e}"))?;

    println!(
        "{} listening on {} (root: {})",
        style("daebug").green().bold(),
        style(format!("http://localhost:{port}")).cyan(),
        config.root.display()
    );

    tokio::select! {
        () = broker.run() => {}
        result = axum::serve(listener, app) => { result?; }
    }

    Ok(())
}
