use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ExternalVerdict, ThreatIntelProvider};
use crate::url_threat::ThreatSource;

const FIND_URL: &str = "https://safebrowsing.googleapis.com/v4/threatMatches:find";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FindResponse {
    #[serde(default)]
    pub matches: Vec<ThreatMatch>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatMatch {
    pub threat_type: String,
}

/// Google Safe Browsing v4 lookup API.
pub struct SafeBrowsing {
    client: Client,
    api_key: Option<String>,
}

impl SafeBrowsing {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }

    pub fn verdict_from_response(response: &FindResponse) -> ExternalVerdict {
        match response.matches.first() {
            Some(threat) => ExternalVerdict {
                is_malicious: true,
                confidence: 95,
                details: format!("Threat type: {}", threat.threat_type),
            },
            None => ExternalVerdict {
                is_malicious: false,
                confidence: 85,
                details: "Clean according to Google Safe Browsing".to_string(),
            },
        }
    }
}

#[async_trait]
impl ThreatIntelProvider for SafeBrowsing {
    fn source(&self) -> ThreatSource {
        ThreatSource::GoogleSafeBrowsing
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn query(&self, url: &str) -> Result<Option<ExternalVerdict>> {
        let api_key = match &self.api_key {
            Some(key) => key,
            None => return Ok(None),
        };

        let body = json!({
            "client": {
                "clientId": "sms-guardian",
                "clientVersion": env!("CARGO_PKG_VERSION"),
            },
            "threatInfo": {
                "threatTypes": ["MALWARE", "SOCIAL_ENGINEERING", "UNWANTED_SOFTWARE"],
                "platformTypes": ["ANY_PLATFORM"],
                "threatEntryTypes": ["URL"],
                "threatEntries": [{ "url": url }],
            }
        });

        let response = self
            .client
            .post(FIND_URL)
            .query(&[("key", api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            log::debug!("Google Safe Browsing API error: {}", response.status());
            return Ok(None);
        }

        // An empty object means no match
        let found: FindResponse = response.json().await?;
        let verdict = Self::verdict_from_response(&found);
        log::debug!(
            "Safe Browsing: {} - {}",
            if verdict.is_malicious { "THREAT" } else { "CLEAN" },
            verdict.details
        );
        Ok(Some(verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_is_malicious() {
        let response: FindResponse = serde_json::from_str(
            r#"{"matches": [{"threatType": "SOCIAL_ENGINEERING", "platformType": "ANY_PLATFORM"}]}"#,
        )
        .unwrap();
        let verdict = SafeBrowsing::verdict_from_response(&response);
        assert!(verdict.is_malicious);
        assert_eq!(verdict.confidence, 95);
        assert_eq!(verdict.details, "Threat type: SOCIAL_ENGINEERING");
    }

    #[test]
    fn test_empty_response_is_clean() {
        let response: FindResponse = serde_json::from_str("{}").unwrap();
        let verdict = SafeBrowsing::verdict_from_response(&response);
        assert!(!verdict.is_malicious);
        assert_eq!(verdict.confidence, 85);
    }
}
