mod commands;
mod config;
mod exporter;
mod puppetdb;
mod server;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "puppetdb-exporter",
    version,
    about = "Prometheus exporter for PuppetDB node report status"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll PuppetDB and serve metrics for Prometheus
    Daemon {
        /// Path to config file (default: ~/.config/puppetdb-exporter/config.yaml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// PuppetDB base URL (overrides config)
        #[arg(long)]
        puppetdb_url: Option<String>,

        /// HTTP listen address (overrides config)
        #[arg(long)]
        listen_addr: Option<String>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,

        /// Seconds between PuppetDB polls (overrides config)
        #[arg(long)]
        scrape_interval: Option<u64>,
    },

    /// Fetch nodes once and print report status counts
    Nodes {
        /// Path to config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Validate configuration and TLS material
    Check {
        /// Path to config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            config,
            puppetdb_url,
            listen_addr,
            log_level,
            scrape_interval,
        } => commands::daemon::run(
            config.as_deref(),
            commands::daemon::Overrides {
                puppetdb_url,
                listen_addr,
                log_level,
                scrape_interval_secs: scrape_interval,
            },
        ),
        Commands::Nodes { config, format } => commands::nodes::run(config.as_deref(), &format),
        Commands::Check { config } => commands::check::run(config.as_deref()),
    }
}
