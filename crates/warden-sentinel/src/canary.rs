use chrono::{DateTime, Utc};
use warden_core::constants::{
    CANARY_FAILURE_RATE_THRESHOLD, CANARY_ROLLBACK_COOLDOWN_SECS, CANARY_WINDOW_SIZE,
};
use warden_core::hash::sha256;
use warden_core::types::PolicyId;

/// Sliding-window auto-rollback for a canary policy (spec §4.4.1 "Canary
/// auto-rollback"), modeled directly on the teacher's `DifficultyConfig`
/// (`chronx_consensus::difficulty`): a fixed-size window of samples,
/// a `record_*` method that returns `Some` only when the window fills and
/// the trigger condition holds, then clears itself.
#[derive(Debug, Clone)]
pub struct CanaryWindow {
    policy_id: PolicyId,
    window_size: usize,
    failure_threshold: f64,
    cooldown_secs: i64,
    samples: Vec<bool>,
    last_rollback_at: Option<DateTime<Utc>>,
}

impl CanaryWindow {
    pub fn new(policy_id: PolicyId) -> Self {
        Self {
            policy_id,
            window_size: CANARY_WINDOW_SIZE,
            failure_threshold: CANARY_FAILURE_RATE_THRESHOLD,
            cooldown_secs: CANARY_ROLLBACK_COOLDOWN_SECS,
            samples: Vec::new(),
            last_rollback_at: None,
        }
    }

    /// Record one enforcement. `non_allow` is true when the policy matched,
    /// was enforced, and produced a non-allow effect (spec §9: the failure
    /// metric is exactly this fraction — no inferred feedback channel).
    /// Returns `Some(policy_id)` when the window just filled, the failure
    /// rate met the threshold, and the cooldown since the last rollback
    /// has elapsed — the caller should roll the policy back to `draft`.
    pub fn record_enforcement(&mut self, non_allow: bool, now: DateTime<Utc>) -> Option<PolicyId> {
        self.samples.push(non_allow);
        if self.samples.len() < self.window_size {
            return None;
        }

        let failures = self.samples.iter().filter(|s| **s).count();
        let failure_rate = failures as f64 / self.samples.len() as f64;
        self.samples.clear();

        if failure_rate < self.failure_threshold {
            return None;
        }

        if let Some(last) = self.last_rollback_at {
            if (now - last).num_seconds() < self.cooldown_secs {
                return None;
            }
        }

        self.last_rollback_at = Some(now);
        Some(self.policy_id)
    }
}

/// Deterministic canary sampling (spec §4.4.1 step 3): hash `request_id`
/// with SHA-256 and compare mod 10_000 against `percent * 100`. Falls back
/// to `rand` only when `request_id` is absent (spec §9: PRNG reserved for
/// the unusual case).
pub fn sample(request_id: Option<&str>, percent: u8) -> bool {
    let threshold = (percent as u32) * 100;
    match request_id {
        Some(id) => {
            let digest = sha256(id.as_bytes());
            let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 10_000;
            value < threshold
        }
        None => {
            use rand::Rng;
            rand::thread_rng().gen_range(0..10_000) < threshold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_is_deterministic_for_same_request_id() {
        assert_eq!(sample(Some("req-1"), 50), sample(Some("req-1"), 50));
    }

    #[test]
    fn zero_percent_never_samples_with_request_id() {
        assert!(!sample(Some("req-1"), 0));
    }

    #[test]
    fn full_percent_always_samples_with_request_id() {
        assert!(sample(Some("req-1"), 100));
    }

    #[test]
    fn window_triggers_only_once_filled() {
        let mut window = CanaryWindow::new(PolicyId::new());
        let now = Utc::now();
        for _ in 0..CANARY_WINDOW_SIZE - 1 {
            assert!(window.record_enforcement(true, now).is_none());
        }
        assert!(window.record_enforcement(true, now).is_some());
    }

    #[test]
    fn low_failure_rate_does_not_trigger() {
        let mut window = CanaryWindow::new(PolicyId::new());
        let now = Utc::now();
        for _ in 0..CANARY_WINDOW_SIZE {
            assert!(window.record_enforcement(false, now).is_none());
        }
    }

    #[test]
    fn cooldown_blocks_immediate_retrigger() {
        let mut window = CanaryWindow::new(PolicyId::new());
        let now = Utc::now();
        for _ in 0..CANARY_WINDOW_SIZE {
            window.record_enforcement(true, now);
        }
        for _ in 0..CANARY_WINDOW_SIZE {
            assert!(window.record_enforcement(true, now).is_none());
        }
    }
}
