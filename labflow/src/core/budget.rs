//! Global transition budget that guarantees the loop terminates.

/// Counts node executions against a fixed limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepBudget {
    limit: u32,
    used: u32,
}

impl StepBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    /// Take one transition from the budget. Returns `false` once exhausted.
    pub fn try_consume(&mut self) -> bool {
        if self.used >= self.limit {
            return false;
        }
        self.used += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_allows_exactly_limit_transitions() {
        let mut budget = StepBudget::new(2);
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
        assert_eq!(budget.used(), 2);
        assert_eq!(budget.limit(), 2);
    }

    #[test]
    fn zero_budget_is_immediately_exhausted() {
        assert!(!StepBudget::new(0).try_consume());
    }
}
