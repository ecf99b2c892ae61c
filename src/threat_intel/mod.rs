//! External threat-intelligence sources for URLs.
//!
//! Each source is independently pluggable. A source without credentials
//! answers `Ok(None)` without touching the network; transport and parse
//! errors are returned to the caller, which treats them as "no signal".

pub mod phishtank;
pub mod safe_browsing;
pub mod virustotal;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ExternalConfig;
use crate::url_threat::ThreatSource;

pub use phishtank::PhishTank;
pub use safe_browsing::SafeBrowsing;
pub use virustotal::VirusTotal;

/// One source's opinion about a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalVerdict {
    pub is_malicious: bool,
    pub confidence: u32,
    pub details: String,
}

#[async_trait]
pub trait ThreatIntelProvider: Send + Sync {
    fn source(&self) -> ThreatSource;

    /// Whether the provider holds what it needs to answer queries.
    fn is_configured(&self) -> bool;

    async fn query(&self, url: &str) -> Result<Option<ExternalVerdict>>;
}

pub fn http_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(concat!("sms-guardian/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// The three bundled providers, configured from `config`. Unconfigured
/// providers are still returned; they answer `None`.
pub fn providers_from_config(config: &ExternalConfig) -> Result<Vec<Arc<dyn ThreatIntelProvider>>> {
    let client = http_client(config.timeout())?;

    let providers: Vec<Arc<dyn ThreatIntelProvider>> = vec![
        Arc::new(VirusTotal::new(
            client.clone(),
            config.virustotal_key().map(str::to_string),
        )),
        Arc::new(SafeBrowsing::new(
            client.clone(),
            config.safe_browsing_key().map(str::to_string),
        )),
        Arc::new(PhishTank::new(
            client,
            config.phishtank_enabled,
            config.phishtank_key().map(str::to_string),
        )),
    ];

    let configured: Vec<String> = providers
        .iter()
        .filter(|p| p.is_configured())
        .map(|p| p.source().to_string())
        .collect();
    if configured.is_empty() {
        log::info!("No online URL verification configured; using local heuristics only");
    } else {
        log::info!("Online URL verification via: {}", configured.join(", "));
    }

    Ok(providers)
}
