//! Phone number reputation
//!
//! Static scoring of a single number (shortcodes, high-risk country
//! prefixes, premium-rate formats) plus an optional best-effort lookup
//! against numbers reported as spam on the web.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::patterns::CompiledPatterns;

const HIGH_RISK_COUNTRY_SCORE: u32 = 70;
const PREMIUM_RATE_SCORE: u32 = 90;
const SHORTCODE_SCORE: u32 = 10;
const WEB_REPORTED_SCORE: u32 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Safe,
    Neutral,
    Suspicious,
    Dangerous,
}

impl RiskLevel {
    /// The bands overlap on purpose: later checks overwrite earlier ones, so
    /// only a zero score is SAFE.
    pub fn from_score(score: u32) -> Self {
        let mut level = RiskLevel::Neutral;
        if score == 0 {
            level = RiskLevel::Safe;
        }
        if score > 40 {
            level = RiskLevel::Suspicious;
        }
        if score > 80 {
            level = RiskLevel::Dangerous;
        }
        level
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Neutral => "NEUTRAL",
            RiskLevel::Suspicious => "SUSPICIOUS",
            RiskLevel::Dangerous => "DANGEROUS",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationResult {
    pub phone_number: String,
    pub risk_level: RiskLevel,
    pub score: u32,
    pub country_name: Option<String>,
    pub is_premium: bool,
    pub label: Option<String>,
    pub details: String,
}

/// "Has this number been reported as spam on the web?"
#[async_trait]
pub trait WebSpamLookup: Send + Sync {
    async fn check(&self, phone_number: &str) -> Result<bool>;
}

/// Reported numbers from a configured list.
pub struct KnownNumberLookup {
    numbers: Vec<String>,
    local_prefix: String,
}

impl KnownNumberLookup {
    pub fn new(numbers: Vec<String>, local_prefix: &str) -> Self {
        Self {
            numbers: numbers
                .into_iter()
                .map(|n| strip_separators(&n))
                .filter(|n| !n.is_empty())
                .collect(),
            local_prefix: local_prefix.to_string(),
        }
    }
}

#[async_trait]
impl WebSpamLookup for KnownNumberLookup {
    async fn check(&self, phone_number: &str) -> Result<bool> {
        let clean = strip_separators(phone_number).replacen(&self.local_prefix, "", 1);
        Ok(self.numbers.iter().any(|known| clean.contains(known.as_str())))
    }
}

fn strip_separators(phone_number: &str) -> String {
    phone_number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// Digits of a number with a leading local country code removed, for
/// comparing numbers written in different formats.
pub fn national_number(phone_number: &str, local_prefix: &str) -> String {
    let digits: String = phone_number.chars().filter(|c| c.is_ascii_digit()).collect();
    let country_code = local_prefix.trim_start_matches('+');
    if country_code.is_empty() {
        return digits;
    }
    let international = format!("00{}", country_code);
    if let Some(rest) = digits.strip_prefix(&international) {
        return rest.to_string();
    }
    if phone_number.trim_start().starts_with('+') || digits.len() > 9 {
        if let Some(rest) = digits.strip_prefix(country_code) {
            return rest.to_string();
        }
    }
    digits
}

pub struct PhoneReputationAnalyzer {
    patterns: Arc<CompiledPatterns>,
    web_lookup: Option<Arc<dyn WebSpamLookup>>,
    timeout: Duration,
}

impl PhoneReputationAnalyzer {
    pub fn new(patterns: Arc<CompiledPatterns>) -> Self {
        Self {
            patterns,
            web_lookup: None,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_web_lookup(mut self, lookup: Arc<dyn WebSpamLookup>) -> Self {
        self.web_lookup = Some(lookup);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Deterministic local scoring.
    pub fn analyze(&self, phone_number: &str) -> ReputationResult {
        let clean = strip_separators(phone_number);

        // Shortcodes are terminal: transactional senders, banks, 2FA
        if (3..=6).contains(&clean.chars().count()) && !clean.starts_with('+') {
            return ReputationResult {
                phone_number: phone_number.to_string(),
                risk_level: RiskLevel::Neutral,
                score: SHORTCODE_SCORE,
                country_name: None,
                is_premium: false,
                label: Some("Shortcode".to_string()),
                details: "Shortcode / Automation Service (Typical for Banks/2FA)".to_string(),
            };
        }

        let mut score = 0;
        let mut country_name = None;
        let mut label = None;
        let mut is_premium = false;
        let mut details = "No specific flags found.".to_string();

        // First match wins; the list is already longest-prefix-first
        if let Some(prefix) = self
            .patterns
            .high_risk_prefixes
            .iter()
            .find(|p| clean.starts_with(&p.prefix))
        {
            score += HIGH_RISK_COUNTRY_SCORE;
            country_name = Some(prefix.country.clone());
            label = Some("High Risk Country".to_string());
            details = format!(
                "Origin detected: {}. High fraud risk zone.",
                prefix.country
            );
        }

        let is_local = clean.starts_with(&self.patterns.local_prefix) || !clean.starts_with('+');
        if is_local {
            country_name = Some("Spain (Local)".to_string());
            let national = national_number(&clean, &self.patterns.local_prefix);
            if self.patterns.premium.iter().any(|p| p.is_match(&national)) {
                score += PREMIUM_RATE_SCORE;
                is_premium = true;
                label = Some("Premium Rate Number".to_string());
                details = "Costly tariff number detected. Do not reply or call back.".to_string();
            }
        }

        ReputationResult {
            phone_number: phone_number.to_string(),
            risk_level: RiskLevel::from_score(score),
            score,
            country_name,
            is_premium,
            label: Some(label.unwrap_or_else(|| "Standard Number".to_string())),
            details,
        }
    }

    /// Local scoring plus the web spam-report lookup. Lookup failures and
    /// timeouts leave the local result unchanged.
    pub async fn analyze_async(&self, phone_number: &str) -> ReputationResult {
        let mut result = self.analyze(phone_number);

        if result.risk_level == RiskLevel::Dangerous {
            return result;
        }

        let lookup = match &self.web_lookup {
            Some(lookup) => lookup,
            None => return result,
        };

        match tokio::time::timeout(self.timeout, lookup.check(phone_number)).await {
            Ok(Ok(true)) => {
                log::debug!("Number {} reported as spam on the web", phone_number);
                result.score = result.score.max(WEB_REPORTED_SCORE);
                result.risk_level = RiskLevel::Dangerous;
                result.label = Some("Web-Reported Spam".to_string());
                result
                    .details
                    .push_str(" - Number reported as malicious in web databases.");
            }
            Ok(Ok(false)) => {}
            Ok(Err(e)) => {
                log::warn!("Web reputation check failed for {}: {}", phone_number, e);
            }
            Err(_) => {
                log::warn!(
                    "Web reputation check timed out for {} after {:?}",
                    phone_number,
                    self.timeout
                );
            }
        }

        result
    }
}
