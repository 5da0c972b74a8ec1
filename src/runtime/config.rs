//! Orchestration configuration.

use crate::event_bus::DEFAULT_HISTORY_CAPACITY;

/// Knobs governing one run's execution.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Last turn to execute; reaching it completes the run.
    pub end_turn: u64,
    /// Cost ceiling; strictly exceeding it halts the run at the next turn
    /// boundary. `None` disables the check.
    pub credit_limit: Option<f64>,
    /// Additional attempts for a failed phase before the run fails.
    pub max_phase_retries: u32,
    /// Fraction of the credit limit at which a CreditWarning event fires.
    pub credit_warn_fraction: f64,
    /// Event history retained for late subscribers.
    pub event_history_capacity: usize,
    /// Dry run: execute nothing billable, only report what would run.
    pub dry_run: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            end_turn: 10,
            credit_limit: None,
            max_phase_retries: 2,
            credit_warn_fraction: 0.8,
            event_history_capacity: DEFAULT_HISTORY_CAPACITY,
            dry_run: false,
        }
    }
}

impl RunnerConfig {
    /// Sets the final turn.
    #[must_use]
    pub fn with_end_turn(mut self, end_turn: u64) -> Self {
        self.end_turn = end_turn;
        self
    }

    /// Sets the credit limit.
    #[must_use]
    pub fn with_credit_limit(mut self, limit: f64) -> Self {
        self.credit_limit = Some(limit);
        self
    }

    /// Sets the phase retry budget.
    #[must_use]
    pub fn with_max_phase_retries(mut self, retries: u32) -> Self {
        self.max_phase_retries = retries;
        self
    }

    /// Marks the run as a dry run.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}
