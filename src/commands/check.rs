use std::path::Path;

use colored::Colorize;

use crate::config::Config;
use crate::puppetdb::PuppetDbClient;

/// Validate configuration and TLS material without contacting PuppetDB.
pub fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "puppetdb-exporter check".bold());

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("  config:   {}", "invalid".red());
            println!("  error:    {:#}", e);
            std::process::exit(1);
        }
    };
    println!("  config:   {}", "ok".green());
    println!("  url:      {}", config.puppetdb_url);
    println!("  listen:   {}{}", config.listen_addr, config.metrics_path);

    match PuppetDbClient::new(&config.client_options()) {
        Ok(_) => {
            println!("  client:   {}", "ok".green());
            std::process::exit(0);
        }
        Err(e) => {
            println!("  client:   {}", "invalid".red());
            println!("  error:    {}", e);
            std::process::exit(1);
        }
    }
}
