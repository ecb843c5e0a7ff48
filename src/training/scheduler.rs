//! Learning Rate Scheduler Module
//!
//! Both trainers step the schedule once per epoch, after the epoch's
//! optimizer updates.

use serde::{Deserialize, Serialize};

/// Learning rate as a function of the number of completed epochs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LRScheduler {
    /// Cosine annealing: smooth decay following cosine curve
    CosineAnnealing {
        initial_lr: f64,
        min_lr: f64,
        total_epochs: usize,
    },
}

impl LRScheduler {
    pub fn cosine_annealing(initial_lr: f64, min_lr: f64, total_epochs: usize) -> Self {
        Self::CosineAnnealing {
            initial_lr,
            min_lr,
            total_epochs,
        }
    }

    /// Get the learning rate after `epoch` completed epochs
    pub fn get_lr(&self, epoch: usize) -> f64 {
        match self {
            Self::CosineAnnealing {
                initial_lr,
                min_lr,
                total_epochs,
            } => {
                if *total_epochs == 0 {
                    return *initial_lr;
                }
                let progress = (epoch as f64) / (*total_epochs as f64);
                let cosine_factor = (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0;
                min_lr + (initial_lr - min_lr) * cosine_factor
            }
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::CosineAnnealing {
                initial_lr,
                min_lr,
                total_epochs,
            } => format!(
                "Cosine Annealing: initial={:.6}, min={:.6}, epochs={}",
                initial_lr, min_lr, total_epochs
            ),
        }
    }
}

/// A schedule plus the number of epochs stepped so far
#[derive(Debug, Clone)]
pub struct SchedulerState {
    scheduler: LRScheduler,
    epoch: usize,
}

impl SchedulerState {
    pub fn new(scheduler: LRScheduler) -> Self {
        Self { scheduler, epoch: 0 }
    }

    /// Learning rate to use for the current epoch
    pub fn current_lr(&self) -> f64 {
        self.scheduler.get_lr(self.epoch)
    }

    /// Advance one epoch and return the new learning rate
    pub fn step(&mut self) -> f64 {
        self.epoch += 1;
        self.current_lr()
    }

    pub fn scheduler(&self) -> &LRScheduler {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_annealing_endpoints() {
        let scheduler = LRScheduler::cosine_annealing(1e-4, 0.0, 20);

        assert!((scheduler.get_lr(0) - 1e-4).abs() < 1e-12);
        assert!((scheduler.get_lr(10) - 5e-5).abs() < 1e-12);
        assert!(scheduler.get_lr(20).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_annealing_monotonic() {
        let scheduler = LRScheduler::cosine_annealing(0.01, 1e-5, 8);
        for epoch in 0..8 {
            assert!(scheduler.get_lr(epoch + 1) < scheduler.get_lr(epoch));
        }
    }

    #[test]
    fn test_state_steps_after_epoch() {
        let mut state = SchedulerState::new(LRScheduler::cosine_annealing(1.0, 0.0, 2));
        assert_eq!(state.current_lr(), 1.0);
        assert!((state.step() - 0.5).abs() < 1e-12);
        assert!(state.step().abs() < 1e-12);
    }

    #[test]
    fn test_zero_epochs_keeps_initial() {
        let scheduler = LRScheduler::cosine_annealing(0.1, 0.0, 0);
        assert_eq!(scheduler.get_lr(3), 0.1);
    }
}
