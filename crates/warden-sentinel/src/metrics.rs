use std::sync::atomic::{AtomicU64, Ordering};

use warden_core::policy::Decision;

/// Per-decision totals for the evaluator (spec §4.4.1 step 8). No external
/// metrics crate is wired up anywhere in the corpus, so this stays a plain
/// atomic counter struct read by whatever reporting loop the deployment
/// wants — the same shape the teacher uses for in-process stats it doesn't
/// ship anywhere (`chronx_consensus::DifficultyConfig`'s sample counters).
#[derive(Debug, Default)]
pub struct Counters {
    allow: AtomicU64,
    deny: AtomicU64,
    quarantine: AtomicU64,
    remediate: AtomicU64,
    /// Canary matches recorded but not enforced because sampling missed.
    canary_unsampled: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, decision: Decision) {
        let counter = match decision {
            Decision::Allow => &self.allow,
            Decision::Deny => &self.deny,
            Decision::Quarantine => &self.quarantine,
            Decision::Remediate => &self.remediate,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_canary_unsampled(&self) {
        self.canary_unsampled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            allow: self.allow.load(Ordering::Relaxed),
            deny: self.deny.load(Ordering::Relaxed),
            quarantine: self.quarantine.load(Ordering::Relaxed),
            remediate: self.remediate.load(Ordering::Relaxed),
            canary_unsampled: self.canary_unsampled.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CountersSnapshot {
    pub allow: u64,
    pub deny: u64,
    pub quarantine: u64,
    pub remediate: u64,
    pub canary_unsampled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_decision() {
        let counters = Counters::new();
        counters.record(Decision::Allow);
        counters.record(Decision::Deny);
        counters.record(Decision::Deny);
        let snap = counters.snapshot();
        assert_eq!(snap.allow, 1);
        assert_eq!(snap.deny, 2);
        assert_eq!(snap.quarantine, 0);
    }
}
