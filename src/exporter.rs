//! Node report status metrics and the PuppetDB poll loop.
//!
//! Each poll cycle: fetch nodes → count by `latest_report_status` → set
//! the `<namespace>_node_report_status_count{status}` gauges. The poll loop
//! is the only writer; the scrape endpoint reads through the registry.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{IntGaugeVec, Opts, Registry};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::puppetdb::{Node, PuppetDbClient};

pub const DEFAULT_NAMESPACE: &str = "puppetdb";

const STATUS_COUNT_NAME: &str = "node_report_status_count";
const STATUS_COUNT_HELP: &str = "Total count of reports status by type";
const STATUS_LABEL: &str = "status";

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("failed to register metrics: {0}")]
    Registration(#[from] prometheus::Error),
}

/// Node count per report status for one poll cycle.
pub type StatusCounts = BTreeMap<String, i64>;

/// The `node_report_status_count` gauge family.
///
/// Clones share the same underlying gauges, so the registry and the poll
/// loop can each hold one.
#[derive(Clone)]
pub struct NodeStatusMetrics {
    status_count: IntGaugeVec,
}

impl NodeStatusMetrics {
    pub fn new(namespace: &str) -> prometheus::Result<Self> {
        let opts = Opts::new(STATUS_COUNT_NAME, STATUS_COUNT_HELP).namespace(namespace);
        Ok(Self {
            status_count: IntGaugeVec::new(opts, &[STATUS_LABEL])?,
        })
    }

    pub fn set(&self, status: &str, count: i64) {
        self.status_count.with_label_values(&[status]).set(count);
    }
}

impl Collector for NodeStatusMetrics {
    fn desc(&self) -> Vec<&Desc> {
        self.status_count.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.status_count.collect()
    }
}

pub struct Exporter {
    client: PuppetDbClient,
    metrics: NodeStatusMetrics,
    /// Every status label written so far.
    known_statuses: BTreeSet<String>,
}

impl Exporter {
    /// Create the gauge family and register it with `registry`.
    ///
    /// Registration fails if the registry already holds a metric with the
    /// same fully-qualified name or if `namespace` is not a valid metric
    /// name prefix.
    pub fn new(
        client: PuppetDbClient,
        namespace: &str,
        registry: &Registry,
    ) -> Result<Self, ExporterError> {
        let metrics = NodeStatusMetrics::new(namespace)?;
        registry.register(Box::new(metrics.clone()))?;

        Ok(Self {
            client,
            metrics,
            known_statuses: BTreeSet::new(),
        })
    }

    /// Run one fetch → aggregate → update cycle.
    ///
    /// A failed fetch is logged and treated as an empty node list, so every
    /// previously reported status drops to zero.
    pub async fn poll_once(&mut self) -> StatusCounts {
        let nodes = match self.client.nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(error = %e, url = %self.client.base_url(), "failed to get nodes");
                Vec::new()
            }
        };

        let counts = count_statuses(&nodes);
        self.apply(&counts);

        debug!(
            nodes = nodes.len(),
            statuses = counts.len(),
            "poll cycle completed"
        );
        counts
    }

    /// Poll every `interval` until `shutdown` flips to `true` or its sender
    /// is dropped. Shutdown also interrupts a fetch that is still waiting on
    /// PuppetDB.
    pub async fn run(&mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            url = %self.client.base_url(),
            interval_secs = interval.as_secs_f64(),
            "starting PuppetDB poll loop"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            // An in-flight fetch is abandoned on shutdown
            tokio::select! {
                _ = self.poll_once() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("PuppetDB poll loop stopped");
    }

    fn apply(&mut self, counts: &StatusCounts) {
        for status in &self.known_statuses {
            if !counts.contains_key(status) {
                self.metrics.set(status, 0);
            }
        }
        for (status, count) in counts {
            self.metrics.set(status, *count);
            self.known_statuses.insert(status.clone());
        }
    }
}

/// Count nodes per report status. Nodes without a report are skipped
/// rather than counted under an empty `status=""` label.
pub fn count_statuses(nodes: &[Node]) -> StatusCounts {
    let mut counts = StatusCounts::new();
    for status in nodes
        .iter()
        .filter_map(|node| node.latest_report_status.as_deref())
    {
        *counts.entry(status.to_string()).or_insert(0) += 1;
    }
    counts
}
