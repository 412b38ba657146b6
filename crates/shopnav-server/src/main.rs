// Copyright 2026 Shopnav Contributors
// SPDX-License-Identifier: Apache-2.0

//! shopnav — command-line entry point and REST server.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde::Serialize;
use shopnav::renderer::fixture::{FixtureLauncher, FixtureRenderer};
use shopnav::renderer::WaitUntil;
use shopnav::{RuleSet, ScrapeConfig, Scraper};
use shopnav_server::AppState;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "shopnav",
    about = "shopnav — infer category trees and listing facets from e-commerce sites",
    version,
    after_help = "Run 'shopnav <command> --help' for details on each command."
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// JSON file overriding selectors and thresholds.
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP REST API.
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,
        /// Port to listen on.
        #[arg(long, default_value_t = 4000)]
        port: u16,
    },
    /// Print the category tree of a site as JSON.
    Categories {
        /// Home page URL.
        url: String,
        /// Replay a saved HTML snapshot instead of launching Chromium.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Print the filter facets of a listing page as JSON.
    Facets {
        /// Listing page URL.
        url: String,
        /// Replay a saved HTML snapshot instead of launching Chromium.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Save the rendered HTML of a page for later replay.
    Snapshot {
        /// Page URL.
        url: String,
        /// Destination file.
        #[arg(long, short)]
        output: PathBuf,
        /// Wait for network activity to settle (as the facet pipeline does).
        #[arg(long)]
        network_idle: bool,
    },
    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   shopnav completions bash > ~/.local/share/bash-completion/completions/shopnav
    ///   shopnav completions zsh > ~/.zfunc/_shopnav
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    let result = run(cli).await;

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "shopnav", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.rules.as_deref())?;
    match cli.command {
        Commands::Serve { host, port } => serve(SocketAddr::new(host, port), config).await,
        Commands::Categories { url, snapshot } => {
            let scraper = scraper_for(snapshot.as_deref(), config)?;
            let tree = scraper.categories(&url).await?;
            print_json(&tree)
        }
        Commands::Facets { url, snapshot } => {
            let scraper = scraper_for(snapshot.as_deref(), config)?;
            let groups = scraper.facets(&url).await;
            scraper.shutdown().await;
            print_json(&groups?)
        }
        Commands::Snapshot {
            url,
            output,
            network_idle,
        } => {
            let wait = if network_idle {
                WaitUntil::NetworkIdle
            } else {
                WaitUntil::DomContentLoaded
            };
            let html = Scraper::chromium(config).capture_html(&url, wait).await?;
            std::fs::write(&output, html)
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!("saved snapshot of {url} to {}", output.display());
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Environment configuration, with `--rules` taking precedence over
/// `SHOPNAV_RULES`.
fn load_config(rules: Option<&Path>) -> Result<ScrapeConfig> {
    let config = ScrapeConfig::from_env();
    match rules {
        Some(path) => Ok(config.with_rules(RuleSet::load(path)?)),
        None => Ok(config),
    }
}

fn scraper_for(snapshot: Option<&Path>, config: ScrapeConfig) -> Result<Scraper> {
    let Some(path) = snapshot else {
        return Ok(Scraper::chromium(config));
    };
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    info!("replaying snapshot {}", path.display());
    let launcher = FixtureLauncher::new(FixtureRenderer::new().with_fallback(html));
    Ok(Scraper::new(Arc::new(launcher), config))
}

async fn serve(addr: SocketAddr, config: ScrapeConfig) -> Result<()> {
    info!("starting shopnav v{}", env!("CARGO_PKG_VERSION"));
    let state = Arc::new(AppState::new(Scraper::chromium(config)));

    let result = shopnav_server::start(addr, Arc::clone(&state), shutdown_signal()).await;

    state.scraper.shutdown().await;
    info!("shopnav stopped");
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("received shutdown signal");
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
