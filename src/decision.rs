//! Decision Engine
//!
//! Turns the aggregated sub-scores into a disposition and picks the reason
//! shown to the user.

use serde::{Deserialize, Serialize};

use crate::config::SecurityConfig;
use crate::phone_reputation::{ReputationResult, RiskLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Safe,
    Suspicious,
    Malicious,
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ThreatLevel::Safe => "safe",
            ThreatLevel::Suspicious => "suspicious",
            ThreatLevel::Malicious => "malicious",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub suspicious: u32,
    pub malicious: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            suspicious: 70,
            malicious: 90,
        }
    }
}

impl From<&SecurityConfig> for Thresholds {
    fn from(config: &SecurityConfig) -> Self {
        Self {
            suspicious: config.suspicious_threshold,
            malicious: config.malicious_threshold,
        }
    }
}

/// Per-signal contributions to the total score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub content_score: u32,
    pub url_score: u32,
    pub reputation_score: u32,
    pub body_phone_score: u32,
}

impl ScoreBreakdown {
    /// Uncapped sum of the capped sub-scores.
    pub fn total(&self) -> u32 {
        self.content_score + self.url_score + self.reputation_score + self.body_phone_score
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub threat_level: ThreatLevel,
    pub total_score: u32,
    pub reason: String,
}

pub struct DecisionEngine {
    thresholds: Thresholds,
}

impl DecisionEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Determine threat level based on score thresholds
    pub fn determine_level(&self, total_score: u32) -> ThreatLevel {
        if total_score >= self.thresholds.malicious {
            ThreatLevel::Malicious
        } else if total_score >= self.thresholds.suspicious {
            ThreatLevel::Suspicious
        } else {
            ThreatLevel::Safe
        }
    }

    pub fn decide(
        &self,
        scores: &ScoreBreakdown,
        sender: &ReputationResult,
        body_numbers: &[ReputationResult],
    ) -> Decision {
        let total_score = scores.total();
        let threat_level = self.determine_level(total_score);
        let reason = Self::build_reason(threat_level, scores, sender, body_numbers);

        Decision {
            threat_level,
            total_score,
            reason,
        }
    }

    /// Sender reputation first, then a dominating in-body number, then the
    /// generic reason for the level.
    fn build_reason(
        threat_level: ThreatLevel,
        scores: &ScoreBreakdown,
        sender: &ReputationResult,
        body_numbers: &[ReputationResult],
    ) -> String {
        let (floor, sender_fallback, body_prefix, generic) = match threat_level {
            ThreatLevel::Safe => return "Passed security checks".to_string(),
            ThreatLevel::Malicious => (
                70,
                "High Risk Number",
                "Dangerous number in body",
                "High suspicious score",
            ),
            ThreatLevel::Suspicious => (
                40,
                "Suspicious Number",
                "Suspicious number in body",
                "Suspicious content",
            ),
        };

        if scores.reputation_score > floor {
            return sender
                .label
                .clone()
                .unwrap_or_else(|| sender_fallback.to_string());
        }

        let body_dominates = scores.body_phone_score > floor
            && scores.body_phone_score > scores.content_score
            && scores.body_phone_score > scores.url_score;
        if body_dominates {
            let label = body_numbers
                .iter()
                .filter(|r| r.risk_level > RiskLevel::Neutral)
                .max_by_key(|r| r.score)
                .and_then(|r| r.label.as_deref())
                .unwrap_or("Unknown");
            return format!("{}: {}", body_prefix, label);
        }

        generic.to_string()
    }
}
