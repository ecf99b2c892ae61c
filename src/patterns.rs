//! Pattern library
//!
//! Locale-specific vocabulary, domain lists and number formats consumed by
//! the analyzers. The library is plain data: it is deserialized from YAML,
//! compiled once into [`CompiledPatterns`] and never mutated afterwards.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::domain_utils::DomainUtils;

const SPAIN_PATTERNS: &str = include_str!("../config/patterns_es.yaml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternLibrary {
    pub version: String,
    pub locale: String,
    pub suspicious_patterns: Vec<String>,
    pub keywords: KeywordBuckets,
    pub url_shorteners: Vec<String>,
    pub suspicious_tlds: Vec<String>,
    pub url_keywords: Vec<String>,
    pub high_risk_prefixes: Vec<CountryPrefix>,
    pub premium_patterns: Vec<String>,
    pub local_prefix: String,
    pub brands: Vec<BrandRule>,
    pub phone_number_pattern: String,
    pub url_pattern: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordBuckets {
    #[serde(default)]
    pub urgency: Vec<String>,
    #[serde(default)]
    pub financial: Vec<String>,
    #[serde(default)]
    pub logistics: Vec<String>,
    #[serde(default)]
    pub government: Vec<String>,
    #[serde(default)]
    pub family_parent: Vec<String>,
    #[serde(default)]
    pub family_trigger: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryPrefix {
    pub prefix: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandRule {
    pub name: String,
    pub pattern: String,
    pub official_domains: Vec<String>,
}

impl PatternLibrary {
    /// Built-in Spanish/English library shipped in `config/patterns_es.yaml`.
    pub fn spain() -> Result<Self> {
        serde_yaml::from_str(SPAIN_PATTERNS).context("Built-in pattern library is malformed")
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read pattern library: {}", path))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse pattern library: {}", path))
    }

    /// Compile every regex and normalise every list. Any invalid pattern is
    /// reported here so that a bad library never reaches the analyzers.
    pub fn compile(&self) -> Result<CompiledPatterns> {
        let suspicious = self
            .suspicious_patterns
            .iter()
            .map(|p| compile_insensitive(p))
            .collect::<Result<Vec<_>>>()?;

        let premium = self
            .premium_patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid premium pattern: {}", p)))
            .collect::<Result<Vec<_>>>()?;

        let brands = self
            .brands
            .iter()
            .map(|b| {
                Ok(CompiledBrand {
                    name: b.name.clone(),
                    pattern: compile_insensitive(&b.pattern)?,
                    official_domains: b
                        .official_domains
                        .iter()
                        .map(|d| DomainUtils::canonicalize_domain(d))
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Longest prefix first; sort_by is stable so ties keep document order.
        let mut high_risk_prefixes = self.high_risk_prefixes.clone();
        high_risk_prefixes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        Ok(CompiledPatterns {
            version: self.version.clone(),
            locale: self.locale.clone(),
            suspicious,
            urgency: KeywordSet::compile(&self.keywords.urgency)?,
            financial: KeywordSet::compile(&self.keywords.financial)?,
            logistics: KeywordSet::compile(&self.keywords.logistics)?,
            government: KeywordSet::compile(&self.keywords.government)?,
            family_parent: KeywordSet::compile(&self.keywords.family_parent)?,
            family_trigger: KeywordSet::compile(&self.keywords.family_trigger)?,
            url_shorteners: lowercase_all(&self.url_shorteners),
            suspicious_tlds: lowercase_all(&self.suspicious_tlds),
            url_keywords: lowercase_all(&self.url_keywords),
            high_risk_prefixes,
            premium,
            local_prefix: self.local_prefix.clone(),
            brands,
            phone_number: Regex::new(&self.phone_number_pattern).with_context(|| {
                format!("Invalid phone number pattern: {}", self.phone_number_pattern)
            })?,
            url: Regex::new(&self.url_pattern)
                .with_context(|| format!("Invalid URL pattern: {}", self.url_pattern))?,
        })
    }
}

fn compile_insensitive(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?i){}", pattern))
        .with_context(|| format!("Invalid pattern: {}", pattern))
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

/// A keyword bucket matched on word boundaries.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    keywords: Vec<(String, Regex)>,
}

impl KeywordSet {
    fn compile(keywords: &[String]) -> Result<Self> {
        let keywords = keywords
            .iter()
            .map(|k| {
                let lower = k.to_lowercase();
                let regex = Regex::new(&format!(r"\b{}\b", regex::escape(&lower)))
                    .with_context(|| format!("Invalid keyword: {}", k))?;
                Ok((lower, regex))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { keywords })
    }

    /// Keywords of this bucket present in `text` (expected lowercase), in
    /// bucket order.
    pub fn matches<'a>(&'a self, text: &str) -> Vec<&'a str> {
        self.keywords
            .iter()
            .filter(|(_, regex)| regex.is_match(text))
            .map(|(keyword, _)| keyword.as_str())
            .collect()
    }

    pub fn any_match(&self, text: &str) -> bool {
        self.keywords.iter().any(|(_, regex)| regex.is_match(text))
    }
}

#[derive(Debug, Clone)]
pub struct CompiledBrand {
    pub name: String,
    pub pattern: Regex,
    pub official_domains: Vec<String>,
}

impl CompiledBrand {
    pub fn is_official(&self, domain: &str) -> bool {
        DomainUtils::matches_domain_list(domain, &self.official_domains)
    }
}

/// Read-only, compiled view of a [`PatternLibrary`].
#[derive(Debug, Clone)]
pub struct CompiledPatterns {
    pub version: String,
    pub locale: String,
    pub suspicious: Vec<Regex>,
    pub urgency: KeywordSet,
    pub financial: KeywordSet,
    pub logistics: KeywordSet,
    pub government: KeywordSet,
    pub family_parent: KeywordSet,
    pub family_trigger: KeywordSet,
    pub url_shorteners: Vec<String>,
    pub suspicious_tlds: Vec<String>,
    pub url_keywords: Vec<String>,
    pub high_risk_prefixes: Vec<CountryPrefix>,
    pub premium: Vec<Regex>,
    pub local_prefix: String,
    pub brands: Vec<CompiledBrand>,
    phone_number: Regex,
    url: Regex,
}

impl CompiledPatterns {
    pub fn spain() -> Result<Self> {
        PatternLibrary::spain()?.compile()
    }

    /// Phone numbers in `text`, with spaces and hyphens removed, first
    /// occurrence order, duplicates dropped.
    pub fn extract_phone_numbers(&self, text: &str) -> Vec<String> {
        let mut numbers: Vec<String> = Vec::new();
        for m in self.phone_number.find_iter(text) {
            let cleaned: String = m
                .as_str()
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect();
            if !numbers.contains(&cleaned) {
                numbers.push(cleaned);
            }
        }
        numbers
    }

    /// URL-looking tokens in `text`, trailing punctuation trimmed.
    pub fn extract_urls(&self, text: &str) -> Vec<String> {
        self.url
            .find_iter(text)
            .map(|m| {
                m.as_str()
                    .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '"', '\''])
                    .to_string()
            })
            .filter(|url| !url.is_empty())
            .collect()
    }

    pub fn is_shortener(&self, domain: &str) -> bool {
        DomainUtils::matches_domain_list(domain, &self.url_shorteners)
    }
}
