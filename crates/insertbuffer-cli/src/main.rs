//! insertbufferd - statement buffering daemon.
//!
//! Accepts SQL statements on a Unix socket, acknowledges them as soon as
//! they are buffered, and replays them in order against the database.
//!
//! # Quick Start
//!
//! ```bash
//! # Buffer statements for the SQLite database at /var/lib/shop.db
//! insertbufferd "db=shop path=/var/lib/shop.db"
//!
//! # Bigger buffer, custom socket, counters on http://127.0.0.1:8080/
//! insertbufferd "db=shop" --bufsize 100000 --socket /run/ib.sock --status 127.0.0.1:8080
//! ```
//!
//! SIGINT or SIGTERM stops accepting and drains the buffer. A second signal
//! while the database is unreachable discards what is left.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use insertbuffer_config::{ConfigLoader, DaemonConfig};

/// Buffers SQL statements from clients and replays them against a database.
#[derive(Parser)]
#[command(name = "insertbufferd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database connection parameters, e.g. "db=shop path=/var/lib/shop.db".
    params: Option<String>,

    /// Number of statements to buffer before throttling clients.
    #[arg(long, value_name = "N")]
    bufsize: Option<usize>,

    /// Path of the listening Unix socket.
    #[arg(long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Serve counters over HTTP on this address.
    #[arg(long, value_name = "IP:PORT")]
    status: Option<String>,

    /// Configuration file layered over the user configuration.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Command-line flags take precedence over every other source.
    fn apply(&self, config: &mut DaemonConfig) {
        if let Some(params) = &self.params {
            config.database = Some(params.clone());
        }
        if let Some(bufsize) = self.bufsize {
            config.buffer_size = bufsize;
        }
        if let Some(socket) = &self.socket {
            config.socket_path.clone_from(socket);
        }
        if let Some(status) = &self.status {
            config.status_address = Some(status.clone());
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let mut config = loader.load()?;
    cli.apply(&mut config);

    if cli.print_config {
        commands::print_config::run(&config)
    } else {
        commands::serve::run(&config)
    }
}
