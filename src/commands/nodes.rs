//! `puppetdb-exporter nodes` — one-shot fetch of node report statuses.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use crate::config::Config;
use crate::exporter::{count_statuses, StatusCounts};
use crate::puppetdb::{Node, PuppetDbClient};

#[derive(Debug, Serialize)]
struct NodesSummary {
    url: String,
    total: usize,
    /// Nodes that have never submitted a report.
    unreported: usize,
    statuses: StatusCounts,
}

impl NodesSummary {
    fn new(url: &str, nodes: &[Node]) -> Self {
        Self {
            url: url.to_string(),
            total: nodes.len(),
            unreported: nodes
                .iter()
                .filter(|n| n.latest_report_status.is_none())
                .count(),
            statuses: count_statuses(nodes),
        }
    }
}

pub fn run(config_path: Option<&Path>, format: &str) -> Result<()> {
    let config = Config::load(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(&config, format))
}

async fn run_async(config: &Config, format: &str) -> Result<()> {
    let client =
        PuppetDbClient::new(&config.client_options()).context("creating PuppetDB client")?;
    let nodes = client
        .nodes()
        .await
        .with_context(|| format!("fetching nodes from {}", client.base_url()))?;

    let summary = NodesSummary::new(client.base_url(), &nodes);

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&summary)?;
            println!("{}", json);
        }
        _ => print_table(&summary),
    }
    Ok(())
}

fn print_table(summary: &NodesSummary) {
    println!("{}", "PuppetDB node report status".bold());
    println!("  {} {}", "PuppetDB:".dimmed(), summary.url);
    println!();

    if summary.statuses.is_empty() {
        println!("  {} no reported nodes", "::".blue().bold());
    }
    for (status, count) in &summary.statuses {
        let label = match status.as_str() {
            "failed" => status.red().bold(),
            "changed" => status.yellow(),
            "unchanged" => status.green(),
            _ => status.normal(),
        };
        println!("  {:<12} {:>6}", label, count);
    }

    println!();
    println!("  {:<12} {:>6}", "total".bold(), summary.total);
    if summary.unreported > 0 {
        println!("  {:<12} {:>6}", "unreported".dimmed(), summary.unreported);
    }
}
