use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ExternalVerdict, ThreatIntelProvider};
use crate::url_threat::ThreatSource;

const CHECK_URL: &str = "https://checkurl.phishtank.com/checkurl/";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckResponse {
    #[serde(default)]
    pub results: Option<CheckResults>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckResults {
    #[serde(default)]
    pub in_database: bool,
}

/// PhishTank does not require a key, so it is opt-in through config.
pub struct PhishTank {
    client: Client,
    enabled: bool,
    app_key: Option<String>,
}

impl PhishTank {
    pub fn new(client: Client, enabled: bool, app_key: Option<String>) -> Self {
        Self {
            client,
            enabled,
            app_key,
        }
    }

    pub fn verdict_from_response(response: &CheckResponse) -> ExternalVerdict {
        let in_database = response
            .results
            .as_ref()
            .map(|r| r.in_database)
            .unwrap_or(false);

        if in_database {
            ExternalVerdict {
                is_malicious: true,
                confidence: 90,
                details: "Found in PhishTank phishing database".to_string(),
            }
        } else {
            ExternalVerdict {
                is_malicious: false,
                confidence: 75,
                details: "Not found in PhishTank database".to_string(),
            }
        }
    }
}

#[async_trait]
impl ThreatIntelProvider for PhishTank {
    fn source(&self) -> ThreatSource {
        ThreatSource::PhishTank
    }

    fn is_configured(&self) -> bool {
        self.enabled
    }

    async fn query(&self, url: &str) -> Result<Option<ExternalVerdict>> {
        if !self.enabled {
            return Ok(None);
        }

        let mut form = vec![("url", url), ("format", "json")];
        if let Some(key) = &self.app_key {
            form.push(("app_key", key.as_str()));
        }

        let response = self.client.post(CHECK_URL).form(&form).send().await?;

        if !response.status().is_success() {
            log::debug!("PhishTank API error: {}", response.status());
            return Ok(None);
        }

        let checked: CheckResponse = response.json().await?;
        let verdict = Self::verdict_from_response(&checked);
        log::debug!(
            "PhishTank: {} - {}",
            if verdict.is_malicious { "PHISHING" } else { "CLEAN" },
            verdict.details
        );
        Ok(Some(verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_database() {
        let response: CheckResponse = serde_json::from_str(
            r#"{"meta": {"status": "success"}, "results": {"url": "http://x", "in_database": true}}"#,
        )
        .unwrap();
        let verdict = PhishTank::verdict_from_response(&response);
        assert!(verdict.is_malicious);
        assert_eq!(verdict.confidence, 90);
    }

    #[test]
    fn test_missing_results_is_clean() {
        let verdict = PhishTank::verdict_from_response(&CheckResponse::default());
        assert!(!verdict.is_malicious);
        assert_eq!(verdict.confidence, 75);
    }

    #[tokio::test]
    async fn test_disabled_is_none() {
        let provider = PhishTank::new(Client::new(), false, None);
        assert_eq!(provider.query("http://x").await.unwrap(), None);
    }
}
