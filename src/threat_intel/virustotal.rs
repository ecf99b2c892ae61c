use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ExternalVerdict, ThreatIntelProvider};
use crate::url_threat::ThreatSource;

const REPORT_URL: &str = "https://www.virustotal.com/vtapi/v2/url/report";

/// Share of engines (percent) above which a URL counts as malicious.
const MALICIOUS_PERCENT: f64 = 8.0;

#[derive(Debug, Clone, Deserialize)]
pub struct UrlReport {
    pub response_code: i32,
    #[serde(default)]
    pub positives: u32,
    #[serde(default)]
    pub total: u32,
}

pub struct VirusTotal {
    client: Client,
    api_key: Option<String>,
}

impl VirusTotal {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }

    pub fn verdict_from_report(report: &UrlReport) -> ExternalVerdict {
        if report.response_code != 1 {
            return ExternalVerdict {
                is_malicious: false,
                confidence: 70,
                details: "URL not found in VirusTotal database".to_string(),
            };
        }

        let total = report.total.max(1);
        let percent = f64::from(report.positives) / f64::from(total) * 100.0;

        ExternalVerdict {
            is_malicious: percent > MALICIOUS_PERCENT,
            confidence: (percent * 4.0).min(100.0).round() as u32,
            details: format!(
                "{}/{} engines flagged as malicious ({:.1}%)",
                report.positives, total, percent
            ),
        }
    }
}

#[async_trait]
impl ThreatIntelProvider for VirusTotal {
    fn source(&self) -> ThreatSource {
        ThreatSource::VirusTotal
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn query(&self, url: &str) -> Result<Option<ExternalVerdict>> {
        let api_key = match &self.api_key {
            Some(key) => key,
            None => return Ok(None),
        };

        let response = self
            .client
            .get(REPORT_URL)
            .query(&[("apikey", api_key.as_str()), ("resource", url)])
            .send()
            .await?;

        if !response.status().is_success() {
            log::debug!("VirusTotal API error: {}", response.status());
            return Ok(None);
        }

        let report: UrlReport = response.json().await?;
        let verdict = Self::verdict_from_report(&report);
        log::debug!(
            "VirusTotal: {} - {}",
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
    fn test_flagged_report() {
        let report: UrlReport =
            serde_json::from_str(r#"{"response_code": 1, "positives": 7, "total": 70}"#).unwrap();
        let verdict = VirusTotal::verdict_from_report(&report);
        assert!(verdict.is_malicious);
        assert_eq!(verdict.confidence, 40);
        assert_eq!(verdict.details, "7/70 engines flagged as malicious (10.0%)");
    }

    #[test]
    fn test_mostly_clean_report() {
        let report = UrlReport {
            response_code: 1,
            positives: 2,
            total: 80,
        };
        let verdict = VirusTotal::verdict_from_report(&report);
        assert!(!verdict.is_malicious);
        assert_eq!(verdict.confidence, 10);
    }

    #[test]
    fn test_confidence_saturates() {
        let report = UrlReport {
            response_code: 1,
            positives: 60,
            total: 70,
        };
        assert_eq!(VirusTotal::verdict_from_report(&report).confidence, 100);
    }

    #[test]
    fn test_unknown_url() {
        let report: UrlReport = serde_json::from_str(r#"{"response_code": 0}"#).unwrap();
        let verdict = VirusTotal::verdict_from_report(&report);
        assert!(!verdict.is_malicious);
        assert_eq!(verdict.confidence, 70);
    }

    #[tokio::test]
    async fn test_query_without_key_is_none() {
        let provider = VirusTotal::new(Client::new(), None);
        assert!(!provider.is_configured());
        assert_eq!(provider.query("http://bit.ly/x").await.unwrap(), None);
    }
}
