/// Pipeline Module
///
/// Execution statistics for a transformation run, mirrored into the logs once
/// the run ends.
use crate::models::ReconciliationStatus;
use std::time::Duration;

/// Transformation run statistics
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub steps_total: usize,
    pub steps_attempted: usize,
    pub steps_succeeded: usize,
    pub steps_failed: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub elapsed_time: Duration,
}

impl RunStats {
    pub fn new(steps_total: usize) -> Self {
        Self { steps_total, ..Self::default() }
    }

    pub fn record_success(&mut self, reconciliation: ReconciliationStatus) {
        self.steps_succeeded += 1;
        match reconciliation {
            ReconciliationStatus::Match => self.matched += 1,
            ReconciliationStatus::Mismatch => self.mismatched += 1,
        }
    }

    /// Steps never reached because an earlier one failed
    pub fn steps_skipped(&self) -> usize {
        self.steps_total.saturating_sub(self.steps_attempted)
    }

    pub fn success_rate(&self) -> f64 {
        if self.steps_attempted == 0 {
            0.0
        } else {
            (self.steps_succeeded as f64 / self.steps_attempted as f64) * 100.0
        }
    }

    /// Log final statistics
    pub fn log_summary(&self) {
        tracing::info!(
            "📊 Transformation run: {}/{} steps succeeded, {} failed, {} skipped in {:.2}s ({:.1}% success)",
            self.steps_succeeded,
            self.steps_total,
            self.steps_failed,
            self.steps_skipped(),
            self.elapsed_time.as_secs_f64(),
            self.success_rate()
        );
        tracing::info!("   ✅ Reconciled: {} MATCH, {} MISMATCH", self.matched, self.mismatched);

        if self.mismatched > 0 {
            tracing::warn!("{} step(s) finished with a row count mismatch", self.mismatched);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_stats() {
        let mut stats = RunStats::new(9);
        stats.steps_attempted = 3;
        stats.record_success(ReconciliationStatus::Match);
        stats.record_success(ReconciliationStatus::Mismatch);
        stats.steps_failed = 1;

        assert_eq!(stats.steps_succeeded, 2);
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.mismatched, 1);
        assert_eq!(stats.steps_skipped(), 6);
        assert!((stats.success_rate() - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_success_rate_without_attempts() {
        assert_eq!(RunStats::new(0).success_rate(), 0.0);
    }
}
