//! Reward pass metrics and timing
//!
//! Counters go through the `metrics` facade; they are no-ops unless an
//! exporter is installed (see the `metrics` cargo feature).

use std::time::Instant;

pub const REWARDS_CREATED: &str = "tourguide_rewards_created_total";
pub const ORACLE_FAILURES: &str = "tourguide_oracle_failures_total";
pub const REWARD_BATCHES: &str = "tourguide_reward_batches_total";
pub const BATCH_USER_FAILURES: &str = "tourguide_reward_batch_user_failures_total";

pub fn record_rewards_created(count: usize) {
    if count > 0 {
        metrics::counter!(REWARDS_CREATED).increment(count as u64);
    }
}

pub fn record_oracle_failure() {
    metrics::counter!(ORACLE_FAILURES).increment(1);
}

pub fn record_batch(incomplete: bool, failed_users: usize) {
    let outcome = if incomplete { "incomplete" } else { "complete" };
    metrics::counter!(REWARD_BATCHES, "outcome" => outcome).increment(1);
    if failed_users > 0 {
        metrics::counter!(BATCH_USER_FAILURES).increment(failed_users as u64);
    }
}

/// Performance timer for tracking operation duration
pub struct PerformanceTimer {
    start: Instant,
    label: String,
}

impl PerformanceTimer {
    pub fn new(label: &str) -> Self {
        Self {
            start: Instant::now(),
            label: label.to_string(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn log_if_slow(&self, threshold_ms: u64) {
        let elapsed = self.elapsed_ms();
        if elapsed > threshold_ms {
            tracing::warn!(
                "⚠️ Slow operation: {} took {}ms (threshold: {}ms)",
                self.label,
                elapsed,
                threshold_ms
            );
        }
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        tracing::debug!("⏱️ {} completed in {}ms", self.label, self.elapsed_ms());
    }
}
