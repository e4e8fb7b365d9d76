/// Hard cap on scoring rounds.
pub const MAX_ROUNDS: usize = 100;

/// Every per-round delta must fall strictly below this for the run to stop early.
pub const TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    pub max_rounds: usize,
    pub tolerance: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_rounds: MAX_ROUNDS,
            tolerance: TOLERANCE,
        }
    }
}
