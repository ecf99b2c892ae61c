//! SMS analysis orchestrator
//!
//! Runs the per-message pipeline: contact whitelist, sender reputation,
//! spam registry, content, in-body numbers, URLs, then the threshold
//! decision. Every step after the whitelist is sequential; only the
//! threat-intel queries for a single URL and the in-body number lookups
//! run concurrently.
//!
//! The public entry point never fails. Collaborator errors are absorbed
//! where they happen and any fault inside the scoring itself is turned into
//! a safe result so that a message is never lost because analysis broke.

use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::content::ContentAnalyzer;
use crate::decision::{Decision, DecisionEngine, ScoreBreakdown, ThreatLevel, Thresholds};
use crate::domain_utils::DomainUtils;
use crate::errors::AnalysisFailure;
use crate::patterns::CompiledPatterns;
use crate::phone_reputation::{
    national_number, KnownNumberLookup, PhoneReputationAnalyzer, ReputationResult, RiskLevel,
    WebSpamLookup,
};
use crate::store::{SpamRecord, SpamRegistry, WhitelistRegistry};
use crate::threat_intel::{providers_from_config, ThreatIntelProvider};
use crate::url_threat::UrlThreatAnalyzer;

const SHORTENER_URL_SCORE: u32 = 30;
const CLEAN_URL_RESIDUAL_CAP: u32 = 15;
const MAX_URL_SCORE: u32 = 80;
const DEFAULT_PATTERN_WEIGHT: u32 = 20;
const DEFAULT_MAX_URLS: usize = 10;
const LOG_BODY_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationDetails {
    pub sender: ReputationResult,
    pub body_numbers: Vec<ReputationResult>,
}

/// Disposition for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub should_block: bool,
    pub should_quarantine: bool,
    pub reason: String,
    pub threat_level: ThreatLevel,
    pub suspicious_score: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reputation_details: Option<ReputationDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
}

impl AnalysisResult {
    /// The block/quarantine flags always follow from the threat level.
    fn with_level(threat_level: ThreatLevel, reason: String, suspicious_score: u32) -> Self {
        Self {
            should_block: threat_level == ThreatLevel::Malicious,
            should_quarantine: threat_level != ThreatLevel::Safe,
            reason,
            threat_level,
            suspicious_score,
            reputation_details: None,
            breakdown: None,
        }
    }

    pub fn whitelisted() -> Self {
        Self::with_level(ThreatLevel::Safe, "Contact whitelist".to_string(), 0)
    }

    pub fn known_spammer(record: &SpamRecord, sender: ReputationResult) -> Self {
        let score = record.confidence_score.max(sender.score);
        let mut result = Self::with_level(
            ThreatLevel::Malicious,
            format!("Spam database: {}", record.spam_type),
            score,
        );
        result.reputation_details = Some(ReputationDetails {
            sender,
            body_numbers: Vec::new(),
        });
        result
    }

    pub fn fail_open() -> Self {
        Self::with_level(ThreatLevel::Safe, "Analysis error - safe fallback".to_string(), 0)
    }

    fn from_decision(
        decision: Decision,
        breakdown: ScoreBreakdown,
        reputation_details: ReputationDetails,
    ) -> Self {
        let mut result =
            Self::with_level(decision.threat_level, decision.reason, decision.total_score);
        result.reputation_details = Some(reputation_details);
        result.breakdown = Some(breakdown);
        result
    }

    pub fn validate(&self) -> Result<(), AnalysisFailure> {
        if self.should_block && !self.should_quarantine {
            return Err(AnalysisFailure::InvariantViolation(
                "blocked message is not quarantined".to_string(),
            ));
        }
        if self.threat_level == ThreatLevel::Malicious && !self.should_block {
            return Err(AnalysisFailure::InvariantViolation(
                "malicious message is not blocked".to_string(),
            ));
        }
        if self.threat_level == ThreatLevel::Safe && (self.should_block || self.should_quarantine) {
            return Err(AnalysisFailure::InvariantViolation(
                "safe message is held back".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct SmsAnalyzer {
    patterns: Arc<CompiledPatterns>,
    content: ContentAnalyzer,
    reputation: PhoneReputationAnalyzer,
    urls: UrlThreatAnalyzer,
    decision: DecisionEngine,
    whitelist: Arc<dyn WhitelistRegistry>,
    spam: Arc<dyn SpamRegistry>,
    max_urls: usize,
    timeout: Duration,
}

impl SmsAnalyzer {
    pub fn new(
        patterns: Arc<CompiledPatterns>,
        whitelist: Arc<dyn WhitelistRegistry>,
        spam: Arc<dyn SpamRegistry>,
    ) -> Self {
        Self {
            content: ContentAnalyzer::new(patterns.clone(), DEFAULT_PATTERN_WEIGHT),
            reputation: PhoneReputationAnalyzer::new(patterns.clone()),
            urls: UrlThreatAnalyzer::new(patterns.clone()),
            decision: DecisionEngine::new(Thresholds::default()),
            patterns,
            whitelist,
            spam,
            max_urls: DEFAULT_MAX_URLS,
            timeout: Duration::from_secs(5),
        }
    }

    /// Build the full pipeline from configuration: pattern library,
    /// thresholds, web spam list and threat-intel providers.
    pub fn from_config(
        config: &Config,
        whitelist: Arc<dyn WhitelistRegistry>,
        spam: Arc<dyn SpamRegistry>,
    ) -> anyhow::Result<Self> {
        let patterns = Arc::new(config.load_patterns()?);
        let providers = providers_from_config(&config.external)?;

        let mut analyzer = Self::new(patterns.clone(), whitelist, spam)
            .with_thresholds(Thresholds::from(&config.security))
            .with_pattern_weight(config.security.content_pattern_weight)
            .with_max_urls(config.security.max_urls_per_sms)
            .with_timeout(config.external.timeout())
            .with_providers(providers);

        if !config.web_spam.known_numbers.is_empty() {
            let lookup = KnownNumberLookup::new(
                config.web_spam.known_numbers.clone(),
                &patterns.local_prefix,
            );
            analyzer = analyzer.with_web_lookup(Arc::new(lookup));
        }

        Ok(analyzer)
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.decision = DecisionEngine::new(thresholds);
        self
    }

    pub fn with_pattern_weight(mut self, weight: u32) -> Self {
        self.content = ContentAnalyzer::new(self.patterns.clone(), weight);
        self
    }

    pub fn with_max_urls(mut self, max_urls: usize) -> Self {
        self.max_urls = max_urls;
        self
    }

    pub fn with_web_lookup(mut self, lookup: Arc<dyn WebSpamLookup>) -> Self {
        self.reputation = self.reputation.with_web_lookup(lookup);
        self
    }

    pub fn with_providers(mut self, providers: Vec<Arc<dyn ThreatIntelProvider>>) -> Self {
        self.urls = self.urls.with_providers(providers);
        self
    }

    /// Per-call bound for every collaborator: registries, web lookup and
    /// threat-intel providers.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.reputation = self.reputation.with_timeout(timeout);
        self.urls = self.urls.with_timeout(timeout);
        self
    }

    pub fn thresholds(&self) -> Thresholds {
        self.decision.thresholds()
    }

    pub fn extract_phone_numbers(&self, text: &str) -> Vec<String> {
        self.patterns.extract_phone_numbers(text)
    }

    pub fn extract_urls(&self, text: &str) -> Vec<String> {
        self.patterns.extract_urls(text)
    }

    /// Analyze one message. Never fails: any internal fault yields the
    /// fail-open safe result.
    pub async fn analyze(&self, sender: &str, body: &str) -> AnalysisResult {
        match self.try_analyze(sender, body).await {
            Ok(result) => {
                log::info!(
                    "SMS from {}: {} (score {}, reason: {})",
                    sender,
                    result.threat_level,
                    result.suspicious_score,
                    result.reason
                );
                result
            }
            Err(e) => {
                log::error!("Analysis of SMS from {} failed, delivering as safe: {}", sender, e);
                AnalysisResult::fail_open()
            }
        }
    }

    /// Same pipeline as [`SmsAnalyzer::analyze`] but exposes internal
    /// failures instead of mapping them to the safe fallback.
    pub async fn try_analyze(&self, sender: &str, body: &str) -> Result<AnalysisResult, AnalysisFailure> {
        let result = AssertUnwindSafe(self.run_pipeline(sender, body))
            .catch_unwind()
            .await
            .map_err(AnalysisFailure::from_panic)?;
        result.validate()?;
        Ok(result)
    }

    async fn run_pipeline(&self, sender: &str, body: &str) -> AnalysisResult {
        log::debug!("Analyzing SMS from {}: {}", sender, preview(body));

        if self.is_whitelisted(sender).await {
            log::debug!("Sender {} is a known contact", sender);
            return AnalysisResult::whitelisted();
        }

        let sender_reputation = self.reputation.analyze_async(sender).await;
        log::debug!(
            "Sender reputation for {}: {} ({})",
            sender,
            sender_reputation.risk_level,
            sender_reputation.score
        );

        if let Some(record) = self.spam_record(sender).await {
            return AnalysisResult::known_spammer(&record, sender_reputation);
        }

        let content_score = self.content.score(body);
        let body_numbers = self.analyze_body_numbers(sender, body).await;
        let body_phone_score: u32 = body_numbers
            .iter()
            .filter(|r| r.risk_level > RiskLevel::Neutral)
            .map(|r| r.score)
            .sum();
        let url_score = self.score_urls(body).await;

        let breakdown = ScoreBreakdown {
            content_score,
            url_score,
            reputation_score: sender_reputation.score,
            body_phone_score,
        };
        log::debug!(
            "Final analysis: content({}) + url({}) + reputation({}) + body numbers({}) = {}",
            breakdown.content_score,
            breakdown.url_score,
            breakdown.reputation_score,
            breakdown.body_phone_score,
            breakdown.total()
        );

        let decision = self
            .decision
            .decide(&breakdown, &sender_reputation, &body_numbers);

        AnalysisResult::from_decision(
            decision,
            breakdown,
            ReputationDetails {
                sender: sender_reputation,
                body_numbers,
            },
        )
    }

    async fn is_whitelisted(&self, sender: &str) -> bool {
        match tokio::time::timeout(self.timeout, self.whitelist.is_whitelisted(sender)).await {
            Ok(Ok(whitelisted)) => whitelisted,
            Ok(Err(e)) => {
                log::warn!("Contacts check failed for {}, proceeding: {}", sender, e);
                false
            }
            Err(_) => {
                log::warn!("Contacts check timed out for {}, proceeding", sender);
                false
            }
        }
    }

    async fn spam_record(&self, sender: &str) -> Option<SpamRecord> {
        match tokio::time::timeout(self.timeout, self.spam.lookup(sender)).await {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => {
                log::warn!("Spam registry lookup failed for {}: {}", sender, e);
                None
            }
            Err(_) => {
                log::warn!("Spam registry lookup timed out for {}", sender);
                None
            }
        }
    }

    /// Reputation of every number in the body except the sender's own.
    async fn analyze_body_numbers(&self, sender: &str, body: &str) -> Vec<ReputationResult> {
        let local_prefix = &self.patterns.local_prefix;
        let sender_national = national_number(sender, local_prefix);

        let numbers: Vec<String> = self
            .patterns
            .extract_phone_numbers(body)
            .into_iter()
            .filter(|n| national_number(n, local_prefix) != sender_national)
            .collect();

        let results = join_all(numbers.iter().map(|n| self.reputation.analyze_async(n))).await;
        for result in results.iter().filter(|r| r.risk_level > RiskLevel::Neutral) {
            log::debug!(
                "Number in body {} flagged: {} ({})",
                result.phone_number,
                result.risk_level,
                result.score
            );
        }
        results
    }

    async fn score_urls(&self, body: &str) -> u32 {
        let urls = self.patterns.extract_urls(body);
        if urls.len() > self.max_urls {
            log::debug!(
                "Message has {} URLs, analyzing the first {}",
                urls.len(),
                self.max_urls
            );
        }

        let mut score = 0;
        for url in urls.iter().take(self.max_urls) {
            let domain = DomainUtils::domain_from_url(url);
            if self.patterns.is_shortener(&domain) {
                log::debug!("URL shortener detected ({})", domain);
                score += SHORTENER_URL_SCORE;
            }

            let analysis = self.urls.analyze(url).await;
            score += if analysis.is_malicious {
                analysis.confidence
            } else {
                (analysis.confidence / 4).min(CLEAN_URL_RESIDUAL_CAP)
            };
        }

        score.min(MAX_URL_SCORE)
    }
}

fn preview(body: &str) -> String {
    let mut preview: String = body.chars().take(LOG_BODY_CHARS).collect();
    if body.chars().count() > LOG_BODY_CHARS {
        preview.push_str("...");
    }
    preview
}
