//! Failure taxonomy for the analysis pipeline.
//!
//! Collaborator problems (unconfigured sources, I/O errors, timeouts) never
//! become an [`AnalysisFailure`]; they are absorbed where the call is made
//! and contribute no signal. Only faults inside the scoring logic itself
//! reach this type, and the orchestrator maps every one of them onto the
//! fail-open result.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisFailure {
    #[error("analysis panicked: {0}")]
    Panicked(String),

    #[error("inconsistent analysis result: {0}")]
    InvariantViolation(String),
}

impl AnalysisFailure {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        AnalysisFailure::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payload_message() {
        let failure = AnalysisFailure::from_panic(Box::new("boom"));
        assert_eq!(failure.to_string(), "analysis panicked: boom");

        let failure = AnalysisFailure::from_panic(Box::new(String::from("bad state")));
        assert_eq!(failure.to_string(), "analysis panicked: bad state");

        let failure = AnalysisFailure::from_panic(Box::new(42u8));
        assert!(failure.to_string().contains("unknown panic payload"));
    }
}
