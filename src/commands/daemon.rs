use std::path::Path;

use anyhow::Result;

use crate::config::Config;

pub struct Overrides {
    pub puppetdb_url: Option<String>,
    pub listen_addr: Option<String>,
    pub log_level: Option<String>,
    pub scrape_interval_secs: Option<u64>,
}

pub fn run(config_path: Option<&Path>, overrides: Overrides) -> Result<()> {
    let mut config = Config::load(config_path)?;

    // CLI flags override config values
    if let Some(url) = overrides.puppetdb_url {
        config.puppetdb_url = url;
    }
    if let Some(addr) = overrides.listen_addr {
        config.listen_addr = addr;
    }
    if let Some(level) = overrides.log_level {
        config.log_level = level;
    }
    if let Some(secs) = overrides.scrape_interval_secs {
        config.scrape_interval_secs = secs;
    }
    config.validate()?;

    // Build tokio runtime explicitly (no #[tokio::main] on fn main)
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(crate::server::run(config))
}
