use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::exporter::DEFAULT_NAMESPACE;
use crate::puppetdb::Options;

/// Environment variables with this prefix override file values,
/// e.g. `PUPPETDB_EXPORTER_PUPPETDB_URL`.
pub const ENV_PREFIX: &str = "PUPPETDB_EXPORTER_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub puppetdb_url: String,
    pub cert_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub ssl_verify: bool,
    pub scrape_interval_secs: u64,
    pub request_timeout_secs: Option<u64>,
    pub namespace: String,
    pub listen_addr: String,
    pub metrics_path: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            puppetdb_url: "https://puppetdb:8081/pdb/query".to_string(),
            cert_file: Some(PathBuf::from("certs/client.pem")),
            ca_file: Some(PathBuf::from("certs/cacert.pem")),
            key_file: Some(PathBuf::from("certs/client.key")),
            ssl_verify: true,
            scrape_interval_secs: 5,
            request_timeout_secs: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            listen_addr: "0.0.0.0:9635".to_string(),
            metrics_path: "/metrics".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("puppetdb-exporter").join("config.yaml"))
    }

    /// Load defaults → YAML file → `PUPPETDB_EXPORTER_*` environment.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        match path {
            Some(path) => {
                if !path.exists() {
                    bail!("config file {} not found", path.display());
                }
                figment = figment.merge(Yaml::file(path));
            }
            None => {
                if let Some(default) = Self::default_path().filter(|p| p.exists()) {
                    figment = figment.merge(Yaml::file(default));
                }
            }
        }

        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .context("loading configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scrape_interval_secs == 0 {
            bail!("scrape_interval_secs must be greater than zero");
        }
        if !self.metrics_path.starts_with('/') {
            bail!("metrics_path must start with '/', got {}", self.metrics_path);
        }
        if self.metrics_path.contains(|c| c == '{' || c == '}')
            || self.metrics_path.split('/').any(|segment| segment.starts_with('*'))
        {
            bail!(
                "metrics_path {} must be a literal path without captures or wildcards",
                self.metrics_path
            );
        }
        if self.metrics_path == "/" || self.metrics_path == "/health" {
            bail!("metrics_path {} collides with a built-in route", self.metrics_path);
        }
        Ok(())
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval_secs)
    }

    pub fn client_options(&self) -> Options {
        Options {
            url: self.puppetdb_url.clone(),
            cert_path: self.cert_file.clone(),
            ca_cert_path: self.ca_file.clone(),
            key_path: self.key_file.clone(),
            ssl_verify: self.ssl_verify,
            timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }
}
