//! Serve command - runs the daemon until shutdown.

use anyhow::{Context, Result};
use insertbuffer_config::DaemonConfig;
use insertbuffer_server::{ConnectionParams, Daemon, ServerConfig, SqliteBackend, WorkerConfig};
use tracing::info;

pub fn run(config: &DaemonConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let params: ConnectionParams = config
        .database
        .as_deref()
        .unwrap_or_default()
        .parse()
        .context("Invalid database parameters")?;
    let backend = SqliteBackend::from_params(&params).context("Invalid database parameters")?;

    let server_config = ServerConfig::new(&config.socket_path)
        .with_queue_capacity(config.buffer_size)
        .with_max_connections(config.max_connections)
        .with_max_payload_size(config.max_payload_size);
    let worker_config = WorkerConfig::new(params.database())
        .with_retry_interval(config.retry_interval())
        .with_max_attempts(config.worker.max_attempts);

    info!(
        socket = %config.socket_path.display(),
        buffer_size = config.buffer_size,
        database = %params,
        "starting"
    );

    let mut daemon = Daemon::new(server_config, worker_config, backend)
        .context("Failed to start listener")?
        .with_signal_handling()
        .context("Failed to install signal handlers")?;

    if let Some(addr) = config.status_addr()? {
        daemon = daemon
            .with_status(addr)
            .context("Failed to start status endpoint")?;
    }

    daemon.run().context("Daemon stopped abnormally")?;
    Ok(())
}
