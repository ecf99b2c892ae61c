//! URL threat analysis
//!
//! Local heuristics first; official brand domains end the analysis there.
//! Anything else may be sent to the configured threat-intelligence
//! providers, queried concurrently, and the verdicts reconciled so that any
//! malicious opinion wins.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::domain_utils::DomainUtils;
use crate::patterns::CompiledPatterns;
use crate::threat_intel::{ExternalVerdict, ThreatIntelProvider};

const SHORTENER_SCORE: u32 = 50;
const SUSPICIOUS_TLD_SCORE: u32 = 40;
const IMPERSONATION_SCORE: u32 = 60;
const KEYWORD_SCORE: u32 = 12;
const LONG_DOMAIN_SCORE: u32 = 20;
const LONG_DOMAIN_LENGTH: usize = 25;
const IP_LITERAL_SCORE: u32 = 50;
const MALICIOUS_SCORE: u32 = 50;

/// Provenance of a URL verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatSource {
    LocalAnalysis,
    LocalWhitelist,
    #[serde(rename = "virustotal")]
    VirusTotal,
    GoogleSafeBrowsing,
    #[serde(rename = "phishtank")]
    PhishTank,
    /// Every source that contributed to a reconciled verdict.
    Combined(Vec<ThreatSource>),
}

impl fmt::Display for ThreatSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreatSource::LocalAnalysis => write!(f, "local_analysis"),
            ThreatSource::LocalWhitelist => write!(f, "local_whitelist"),
            ThreatSource::VirusTotal => write!(f, "virustotal"),
            ThreatSource::GoogleSafeBrowsing => write!(f, "google_safe_browsing"),
            ThreatSource::PhishTank => write!(f, "phishtank"),
            ThreatSource::Combined(sources) => {
                let names: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
                write!(f, "combined:{}", names.join("+"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlThreatResult {
    pub url: String,
    pub is_malicious: bool,
    pub confidence: u32,
    pub source: ThreatSource,
    pub details: String,
}

pub struct UrlThreatAnalyzer {
    patterns: Arc<CompiledPatterns>,
    providers: Vec<Arc<dyn ThreatIntelProvider>>,
    timeout: Duration,
}

impl UrlThreatAnalyzer {
    pub fn new(patterns: Arc<CompiledPatterns>) -> Self {
        Self {
            patterns,
            providers: Vec::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_providers(mut self, providers: Vec<Arc<dyn ThreatIntelProvider>>) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_configured_provider(&self) -> bool {
        self.providers.iter().any(|p| p.is_configured())
    }

    /// Local heuristics only. Signals are additive; an official domain of a
    /// brand whose pattern matched returns a terminal safe verdict.
    pub fn quick_local_analysis(&self, url: &str) -> UrlThreatResult {
        let domain = DomainUtils::domain_from_url(url);
        let lower_url = url.to_lowercase();
        let mut score = 0;
        let mut reasons = Vec::new();

        if self.patterns.is_shortener(&domain) {
            score += SHORTENER_SCORE;
            reasons.push(format!("URL shortener: {}", domain));
        }

        if let Some(tld) = DomainUtils::matching_suffix(&domain, &self.patterns.suspicious_tlds) {
            score += SUSPICIOUS_TLD_SCORE;
            reasons.push(format!("Suspicious TLD: {}", tld));
        }

        let matched_brands: Vec<_> = self
            .patterns
            .brands
            .iter()
            .filter(|brand| brand.pattern.is_match(&lower_url))
            .collect();

        if let Some(brand) = matched_brands.iter().find(|b| b.is_official(&domain)) {
            return UrlThreatResult {
                url: url.to_string(),
                is_malicious: false,
                confidence: 100,
                source: ThreatSource::LocalWhitelist,
                details: format!("Verified official domain for {}", brand.name),
            };
        }

        if !matched_brands.is_empty() {
            score += IMPERSONATION_SCORE;
            let names: Vec<&str> = matched_brands.iter().map(|b| b.name.as_str()).collect();
            reasons.push(format!("Possible Brand Impersonation: {}", names.join(", ")));
        }

        let keywords: Vec<&str> = self
            .patterns
            .url_keywords
            .iter()
            .filter(|k| lower_url.contains(k.as_str()))
            .map(|k| k.as_str())
            .collect();
        if !keywords.is_empty() {
            score += KEYWORD_SCORE * keywords.len() as u32;
            reasons.push(format!("Suspicious keywords: {}", keywords.join(", ")));
        }

        if domain.len() > LONG_DOMAIN_LENGTH {
            score += LONG_DOMAIN_SCORE;
            reasons.push("Long domain".to_string());
        }

        if DomainUtils::is_ipv4_literal(&domain) {
            score += IP_LITERAL_SCORE;
            reasons.push("IP address used".to_string());
        }

        let details = if reasons.is_empty() {
            format!("No suspicious patterns found (Score: {})", score)
        } else {
            format!("{} (Score: {})", reasons.join(", "), score)
        };

        UrlThreatResult {
            url: url.to_string(),
            is_malicious: score >= MALICIOUS_SCORE,
            confidence: score.min(100),
            source: ThreatSource::LocalAnalysis,
            details,
        }
    }

    pub async fn analyze(&self, url: &str) -> UrlThreatResult {
        let mut local = self.quick_local_analysis(url);

        if local.source == ThreatSource::LocalWhitelist {
            log::debug!("Official domain detected ({}), skipping online scan", url);
            return local;
        }

        log::debug!(
            "Local analysis for {}: {} ({}%)",
            url,
            if local.is_malicious { "SUSPICIOUS" } else { "CLEAN" },
            local.confidence
        );

        if !local.is_malicious && !self.has_configured_provider() {
            local.details.push_str(" (online APIs not configured)");
            return local;
        }

        let answers = join_all(
            self.providers
                .iter()
                .map(|provider| self.query_provider(provider.as_ref(), url)),
        )
        .await;
        let external: Vec<(ThreatSource, ExternalVerdict)> = answers.into_iter().flatten().collect();

        let combined = Self::combine(local, external);
        log::debug!(
            "URL verdict for {}: {} ({}%, {})",
            url,
            if combined.is_malicious { "MALICIOUS" } else { "SAFE" },
            combined.confidence,
            combined.source
        );
        combined
    }

    /// One provider, bounded by the per-call timeout. Errors and timeouts
    /// count as "no answer".
    async fn query_provider(
        &self,
        provider: &dyn ThreatIntelProvider,
        url: &str,
    ) -> Option<(ThreatSource, ExternalVerdict)> {
        let source = provider.source();
        match tokio::time::timeout(self.timeout, provider.query(url)).await {
            Ok(Ok(Some(verdict))) => Some((source, verdict)),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                log::warn!("{} lookup failed for {}: {}", source, url, e);
                None
            }
            Err(_) => {
                log::warn!("{} lookup timed out for {} after {:?}", source, url, self.timeout);
                None
            }
        }
    }

    /// Reconcile the local verdict with whatever the providers answered.
    /// Malicious if any source says so; confidence is the highest reported.
    /// With no external answers the local verdict stands unchanged apart
    /// from a note.
    pub fn combine(
        mut local: UrlThreatResult,
        external: Vec<(ThreatSource, ExternalVerdict)>,
    ) -> UrlThreatResult {
        if external.is_empty() {
            local
                .details
                .push_str(" (online verification unavailable)");
            return local;
        }

        let is_malicious = local.is_malicious || external.iter().any(|(_, v)| v.is_malicious);
        let confidence = external
            .iter()
            .map(|(_, v)| v.confidence)
            .fold(local.confidence, u32::max)
            .min(100);

        let mut details = vec![format!("{}: {}", local.source, local.details)];
        let mut sources = vec![local.source];
        for (source, verdict) in external {
            details.push(format!("{}: {}", source, verdict.details));
            sources.push(source);
        }

        UrlThreatResult {
            url: local.url,
            is_malicious,
            confidence,
            source: ThreatSource::Combined(sources),
            details: details.join("; "),
        }
    }
}
