//! Query Statistics Module
//!
//! Counters recorded for every query attempt.

use std::time::Duration;

use serde::Serialize;

// == Query Stats ==
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryStats {
    /// Attempts made, successful or not
    pub attempts: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Sum of attempt durations in milliseconds
    pub total_duration_ms: u64,
}

impl QueryStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Record ==
    /// Records one attempt.
    pub fn record(&mut self, duration: Duration, success: bool) {
        self.attempts += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.total_duration_ms += duration.as_millis() as u64;
    }

    /// Returns succeeded / attempts, or 0.0 before any attempt.
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.attempts as f64
        }
    }

    pub fn average_duration_ms(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.attempts as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts() {
        let mut stats = QueryStats::new();
        stats.record(Duration::from_millis(10), false);
        stats.record(Duration::from_millis(30), true);

        assert_eq!(stats.attempts, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.total_duration_ms, 40);
        assert!((stats.success_rate() - 0.5).abs() < f64::EPSILON);
        assert!((stats.average_duration_ms() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_rates() {
        let stats = QueryStats::new();
        assert_eq!(stats.success_rate(), 0.0);
        assert_eq!(stats.average_duration_ms(), 0.0);
    }
}
