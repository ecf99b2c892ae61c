pub mod analyzer;
pub mod config;
pub mod content;
pub mod decision;
pub mod disposition;
pub mod domain_utils;
pub mod errors;
pub mod patterns;
pub mod phone_reputation;
pub mod store;
pub mod threat_intel;
pub mod url_threat;

pub use analyzer::{AnalysisResult, ReputationDetails, SmsAnalyzer};
pub use config::Config;
pub use decision::{ScoreBreakdown, ThreatLevel, Thresholds};
pub use errors::AnalysisFailure;
pub use patterns::{CompiledPatterns, PatternLibrary};
pub use phone_reputation::{ReputationResult, RiskLevel};
pub use url_threat::{ThreatSource, UrlThreatResult};
