//! Per-stage counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::domain::Stage;

/// Snapshot of one stage's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub retried: u64,
}

#[derive(Debug, Default)]
pub struct StageCounters {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    retried: AtomicU64,
}

impl StageCounters {
    pub fn record_succeeded(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StageCounts {
        StageCounts {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

/// Counters for all three stages, shared by every consumer of a stage.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    a: StageCounters,
    b: StageCounters,
    c: StageCounters,
}

impl PipelineCounters {
    pub fn stage(&self, stage: Stage) -> &StageCounters {
        match stage {
            Stage::A => &self.a,
            Stage::B => &self.b,
            Stage::C => &self.c,
        }
    }

    pub fn snapshot(&self) -> BTreeMap<Stage, StageCounts> {
        Stage::ALL
            .into_iter()
            .map(|stage| (stage, self.stage(stage).snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_per_stage() {
        let counters = PipelineCounters::default();
        counters.stage(Stage::A).record_succeeded();
        counters.stage(Stage::B).record_failed();
        counters.stage(Stage::B).record_retry();

        let snap = counters.snapshot();
        assert_eq!(snap[&Stage::A].succeeded, 1);
        assert_eq!(snap[&Stage::B].failed, 1);
        assert_eq!(snap[&Stage::B].processed, 1);
        assert_eq!(snap[&Stage::B].retried, 1);
        assert_eq!(snap[&Stage::C], StageCounts::default());
    }

    #[test]
    fn snapshot_serializes_by_stage() {
        let counters = PipelineCounters::default();
        counters.stage(Stage::C).record_skipped();
        let v = serde_json::to_value(counters.snapshot()).unwrap();
        assert_eq!(v["C"]["skipped"], 1);
    }
}
