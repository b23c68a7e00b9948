//! Environment probes used by the gating phases

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::net::TcpStream;
use url::Url;

use crate::errors::AgentError;

/// Checks against the environment a deployment lands in
#[async_trait]
pub trait EnvironmentProbe: Send + Sync {
    /// `Ok` when `url` answers with a 2xx status
    async fn http_healthy(&self, url: &str) -> Result<(), String>;

    /// `Ok` when `address` (`host:port`) accepts a TCP connection
    async fn tcp_reachable(&self, address: &str) -> Result<(), String>;

    /// `Ok` when an HTTPS endpoint presents a certificate that validates
    async fn certificate_valid(&self, url: &str) -> Result<(), String>;

    /// Whether an environment variable is set and non-empty on this host
    fn env_present(&self, name: &str) -> bool;
}

/// Probes the real host and network
pub struct SystemProbe {
    client: Client,
    timeout: Duration,
}

impl SystemProbe {
    pub fn new(timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl EnvironmentProbe for SystemProbe {
    async fn http_healthy(&self, url: &str) -> Result<(), String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("status {}", response.status()))
        }
    }

    async fn tcp_reachable(&self, address: &str) -> Result<(), String> {
        match tokio::time::timeout(self.timeout, TcpStream::connect(address)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("connect timed out after {:?}", self.timeout)),
        }
    }

    async fn certificate_valid(&self, url: &str) -> Result<(), String> {
        let parsed = Url::parse(url).map_err(|e| e.to_string())?;
        if parsed.scheme() != "https" {
            return Err(format!("{} is not an https url", url));
        }
        // Any HTTP response means the TLS handshake, and so chain and
        // hostname verification, succeeded
        self.client
            .head(parsed)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn env_present(&self, name: &str) -> bool {
        std::env::var_os(name).is_some_and(|v| !v.is_empty())
    }
}
