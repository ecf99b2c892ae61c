//! Disposition consumers
//!
//! Foreground and background entry points that run the analyzer and route
//! held-back messages to the quarantine sink.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::analyzer::{AnalysisResult, SmsAnalyzer};
use crate::store::{QuarantineEntry, QuarantineSink};

/// A message delivered while the app is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingSms {
    pub phone_number: String,
    pub message_body: String,
    /// Milliseconds since the Unix epoch; receipt time when absent.
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// Payload handed over by the platform's background task runner. Fields
/// may be missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundTask {
    pub phone_number: Option<String>,
    pub message_body: Option<String>,
    pub timestamp: Option<u64>,
}

pub struct DispositionRouter {
    analyzer: Arc<SmsAnalyzer>,
    quarantine: Arc<dyn QuarantineSink>,
}

impl DispositionRouter {
    pub fn new(analyzer: Arc<SmsAnalyzer>, quarantine: Arc<dyn QuarantineSink>) -> Self {
        Self {
            analyzer,
            quarantine,
        }
    }

    pub async fn handle_incoming(&self, sms: IncomingSms) -> AnalysisResult {
        let result = self
            .analyzer
            .analyze(&sms.phone_number, &sms.message_body)
            .await;

        if result.should_quarantine {
            let entry = QuarantineEntry {
                urls: self.analyzer.extract_urls(&sms.message_body),
                phone_number: sms.phone_number,
                message_content: sms.message_body,
                reason: result.reason.clone(),
                threat_level: result.threat_level,
                timestamp: sms.timestamp.unwrap_or_else(now_millis),
            };
            if let Err(e) = self.quarantine.record(entry).await {
                log::warn!("Failed to quarantine message: {}", e);
            }
        }

        result
    }

    /// Tasks without a sender or a body are dropped.
    pub async fn handle_background(&self, task: BackgroundTask) -> Option<AnalysisResult> {
        let (phone_number, message_body) = match (task.phone_number, task.message_body) {
            (Some(phone), Some(body)) if !phone.is_empty() && !body.is_empty() => (phone, body),
            _ => {
                log::warn!("Background SMS task missing sender or body, skipping");
                return None;
            }
        };

        let result = self
            .handle_incoming(IncomingSms {
                phone_number,
                message_body,
                timestamp: task.timestamp,
            })
            .await;
        log::debug!("Background SMS analysis complete: {}", result.threat_level);
        Some(result)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
