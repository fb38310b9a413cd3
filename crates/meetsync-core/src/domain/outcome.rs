//! Outcome model: the result of running one stage for one task.
//!
//! The processor turns whatever the stage work did (returned, errored, ran
//! past its deadline) into one of these before deciding what to write.

/// Classification of a stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Success,
    Failure,
}

/// Result of one stage run.
///
/// - `Success`: the task moves on (forwarded, or completed after the last stage).
/// - `Failure`: terminal for the task; its status becomes `failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub reason: Option<String>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            kind: OutcomeKind::Success,
            reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}
