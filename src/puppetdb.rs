//! Typed HTTP client for the PuppetDB query API.
//!
//! The client is bound to one base URL and one transport configuration.
//! For `https` URLs it presents a client certificate and trusts only the
//! configured CA bundle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Certificate, Client, ClientBuilder, Identity, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PuppetDbError {
    /// Bad URL, unsupported scheme or unusable TLS material.
    #[error("invalid PuppetDB configuration: {0}")]
    Config(String),

    /// DNS, connection, TLS handshake, timeout or body read failure.
    #[error("failed to call PuppetDB API: {0}")]
    Network(#[source] reqwest::Error),

    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error("failed to decode PuppetDB response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Connection options for a PuppetDB instance.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub url: String,
    pub cert_path: Option<PathBuf>,
    pub ca_cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub ssl_verify: bool,
    /// Per-request timeout. `None` keeps the transport default.
    pub timeout: Option<Duration>,
}

/// A node as returned by `/v4/nodes`. Fields we don't use are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub certname: String,
    /// `null` for nodes that have never submitted a report.
    #[serde(default)]
    pub latest_report_status: Option<String>,
}

pub struct PuppetDbClient {
    base_url: String,
    http: Client,
}

impl PuppetDbClient {
    /// Build a client from `options`. No connection is opened here.
    ///
    /// Fails with [`PuppetDbError::Config`] if the URL is not `http` or
    /// `https`, or if an `https` URL comes without readable certificate,
    /// key and CA files.
    pub fn new(options: &Options) -> Result<Self, PuppetDbError> {
        let url = Url::parse(&options.url).map_err(|e| {
            PuppetDbError::Config(format!("failed to parse PuppetDB URL {}: {}", options.url, e))
        })?;

        let mut builder = Client::builder();
        match url.scheme() {
            "http" => {}
            "https" => builder = configure_tls(builder, options)?,
            other => {
                return Err(PuppetDbError::Config(format!(
                    "{} is not a valid http scheme",
                    other
                )))
            }
        }

        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|e| PuppetDbError::Config(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            base_url: options.url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch every node known to PuppetDB.
    pub async fn nodes(&self) -> Result<Vec<Node>, PuppetDbError> {
        self.get("nodes").await
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, PuppetDbError> {
        let url = format!("{}/v4/{}", self.base_url, endpoint);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(PuppetDbError::Network)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PuppetDbError::Status { url, status });
        }

        let body = resp.bytes().await.map_err(PuppetDbError::Network)?;
        serde_json::from_slice(&body).map_err(PuppetDbError::Decode)
    }
}

fn configure_tls(builder: ClientBuilder, options: &Options) -> Result<ClientBuilder, PuppetDbError> {
    let cert = read_pem("client certificate", options.cert_path.as_deref())?;
    let key = read_pem("client key", options.key_path.as_deref())?;
    let ca = read_pem("CA certificate", options.ca_cert_path.as_deref())?;

    // rustls wants the certificate chain and private key in one PEM buffer
    let mut identity_pem = cert;
    identity_pem.push(b'\n');
    identity_pem.extend_from_slice(&key);
    let identity = Identity::from_pem(&identity_pem)
        .map_err(|e| PuppetDbError::Config(format!("failed to load keypair: {}", e)))?;

    let roots = Certificate::from_pem_bundle(&ca)
        .map_err(|e| PuppetDbError::Config(format!("failed to load ca certificate: {}", e)))?;
    if roots.is_empty() {
        return Err(PuppetDbError::Config(
            "failed to load ca certificate: no certificates found".to_string(),
        ));
    }

    let mut builder = builder
        .use_rustls_tls()
        .tls_built_in_root_certs(false)
        .identity(identity)
        .danger_accept_invalid_certs(!options.ssl_verify);
    for root in roots {
        builder = builder.add_root_certificate(root);
    }
    Ok(builder)
}

fn read_pem(what: &str, path: Option<&Path>) -> Result<Vec<u8>, PuppetDbError> {
    let path = path
        .ok_or_else(|| PuppetDbError::Config(format!("{} path is required for https", what)))?;
    std::fs::read(path).map_err(|e| {
        PuppetDbError::Config(format!("failed to read {} {}: {}", what, path.display(), e))
    })
}
