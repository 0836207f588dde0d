use std::time::Duration;

/// Tunables spec.md §9 flags as "if these become configurable, add them to
/// the configuration surface": sub-task round budget, scheduler fan-out,
/// per-call adapter timeouts, and undo history depth all live here rather
/// than as scattered constants.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub max_concurrency: usize,
    pub subtask_max_rounds: u32,
    pub subtask_round_timeout: Duration,
    pub adapter_max_attempts: u32,
    pub adapter_soft_timeout: Duration,
    pub adapter_strategy_timeout: Duration,
    pub undo_history_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            subtask_max_rounds: crate::subtask::MAX_ROUNDS,
            subtask_round_timeout: Duration::from_secs(90),
            adapter_max_attempts: strategy_platform::MAX_ATTEMPTS,
            adapter_soft_timeout: strategy_platform::DEFAULT_TIMEOUT,
            adapter_strategy_timeout: strategy_platform::STRATEGY_TIMEOUT,
            undo_history_capacity: strategy_graph::DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    pub fn scheduler_config(&self) -> crate::scheduler::SchedulerConfig {
        crate::scheduler::SchedulerConfig {
            max_concurrency: self.max_concurrency,
            round_timeout: self.subtask_round_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_spec_constants() {
        let config = RuntimeConfig::default();
        assert_eq!(config.subtask_max_rounds, 5);
        assert_eq!(config.undo_history_capacity, 32);
        assert_eq!(config.adapter_soft_timeout, Duration::from_secs(90));
        assert_eq!(config.adapter_strategy_timeout, Duration::from_secs(180));
    }
}
