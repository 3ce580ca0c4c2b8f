//! 进度监视：停滞检测与放弃阈值
//!
//! last_progress 只前进不回退；停滞本身不终止运行，只有已处于 error_recovery 且错误数超过上限时才放弃。

use std::time::{Duration, Instant};

use crate::core::TaskPhase;

#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    last_progress: Instant,
    stall_threshold: Duration,
    max_recovery_errors: u32,
}

/// 一次停滞检查的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallVerdict {
    Healthy,
    /// 注入一次停滞错误并继续
    Recover,
    GiveUp,
}

impl ProgressMonitor {
    pub fn new(stall_threshold: Duration, max_recovery_errors: u32) -> Self {
        Self {
            last_progress: Instant::now(),
            stall_threshold,
            max_recovery_errors,
        }
    }

    pub fn touch(&mut self) {
        self.last_progress = Instant::now();
    }

    pub fn since_progress(&self) -> Duration {
        self.last_progress.elapsed()
    }

    pub fn is_stalled(&self) -> bool {
        self.since_progress() >= self.stall_threshold
    }

    pub fn stall_threshold(&self) -> Duration {
        self.stall_threshold
    }

    pub fn should_give_up(&self, phase: TaskPhase, error_count: u32) -> bool {
        phase == TaskPhase::ErrorRecovery && error_count > self.max_recovery_errors
    }

    pub fn check(&self, phase: TaskPhase, error_count: u32) -> StallVerdict {
        if !self.is_stalled() {
            StallVerdict::Healthy
        } else if self.should_give_up(phase, error_count) {
            StallVerdict::GiveUp
        } else {
            StallVerdict::Recover
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_monitor_is_healthy() {
        let m = ProgressMonitor::new(Duration::from_secs(300), 3);
        assert_eq!(m.check(TaskPhase::Executing, 0), StallVerdict::Healthy);
    }

    #[test]
    fn test_zero_threshold_always_stalled() {
        let m = ProgressMonitor::new(Duration::ZERO, 3);
        assert_eq!(m.check(TaskPhase::Executing, 10), StallVerdict::Recover);
        assert_eq!(m.check(TaskPhase::ErrorRecovery, 3), StallVerdict::Recover);
        assert_eq!(m.check(TaskPhase::ErrorRecovery, 4), StallVerdict::GiveUp);
    }

    #[test]
    fn test_touch_resets_clock() {
        let mut m = ProgressMonitor::new(Duration::from_millis(20), 3);
        std::thread::sleep(Duration::from_millis(30));
        assert!(m.is_stalled());
        m.touch();
        assert!(!m.is_stalled());
    }
}
