use std::sync::Arc;

use crate::patterns::CompiledPatterns;

const URGENCY_SCORE: u32 = 20;
const FINANCIAL_SCORE: u32 = 25;
const LOGISTICS_BASE: u32 = 25;
const LOGISTICS_EXTRA: u32 = 10;
const GOVERNMENT_BASE: u32 = 30;
const GOVERNMENT_EXTRA: u32 = 15;
const FAMILY_SCAM_SCORE: u32 = 60;
const VISHING_COMPOUND_SCORE: u32 = 50;
const VISHING_BARE_SCORE: u32 = 30;
const VISHING_COMPOUND_ABOVE: u32 = 40;
const MAX_CONTENT_SCORE: u32 = 100;

/// Scores message text against the pattern library and keyword buckets.
pub struct ContentAnalyzer {
    patterns: Arc<CompiledPatterns>,
    pattern_weight: u32,
}

impl ContentAnalyzer {
    pub fn new(patterns: Arc<CompiledPatterns>, pattern_weight: u32) -> Self {
        Self {
            patterns,
            pattern_weight,
        }
    }

    /// Content score in `0..=100`.
    pub fn score(&self, text: &str) -> u32 {
        let folded = fold_text(text);
        let mut score = 0;

        for pattern in &self.patterns.suspicious {
            let matches = pattern.find_iter(&folded).count() as u32;
            if matches > 0 {
                log::debug!("Content pattern {} matched {} time(s)", pattern.as_str(), matches);
                score = self
                    .pattern_weight
                    .saturating_mul(matches)
                    .saturating_add(score);
            }
        }
        score = score.min(MAX_CONTENT_SCORE);

        if self.patterns.urgency.any_match(&folded) {
            score += URGENCY_SCORE;
        }

        if self.patterns.financial.any_match(&folded) {
            score += FINANCIAL_SCORE;
        }

        let logistics = self.patterns.logistics.matches(&folded);
        if !logistics.is_empty() {
            score += LOGISTICS_BASE + LOGISTICS_EXTRA * (logistics.len() as u32 - 1);
            log::debug!("Logistics keywords: {}", logistics.join(", "));
        }

        let government = self.patterns.government.matches(&folded);
        if !government.is_empty() {
            score += GOVERNMENT_BASE + GOVERNMENT_EXTRA * (government.len() as u32 - 1);
            log::debug!("Government keywords: {}", government.join(", "));
        }

        if self.patterns.family_parent.any_match(&folded)
            && self.patterns.family_trigger.any_match(&folded)
        {
            log::debug!("Family scam pattern detected");
            score += FAMILY_SCAM_SCORE;
        }

        // A number to call is worth more when the text around it is already suspicious
        if !self.patterns.extract_phone_numbers(text).is_empty() {
            score += if score > VISHING_COMPOUND_ABOVE {
                VISHING_COMPOUND_SCORE
            } else {
                VISHING_BARE_SCORE
            };
        }

        score.min(MAX_CONTENT_SCORE)
    }
}

/// Lowercase and strip the Spanish diacritics so that "cómo" and "como"
/// hit the same patterns.
pub fn fold_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        })
        .collect()
}
