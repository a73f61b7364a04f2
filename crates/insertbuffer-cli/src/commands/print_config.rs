//! Print the effective configuration.

use anyhow::Result;
use insertbuffer_config::DaemonConfig;

pub fn run(config: &DaemonConfig) -> Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
