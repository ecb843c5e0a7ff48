//! Per-epoch metric histories
//!
//! Histories live in memory while a loop runs and are exported at the end
//! as JSON plus SVG curves.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::charts::{
    generate_line_chart, DataSeries, YAxis, COLOR_PRIMARY, COLOR_QUATERNARY, COLOR_SECONDARY,
    COLOR_TERTIARY,
};
use crate::utils::error::Result;

/// Metrics of one supervised epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupervisedEpoch {
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    /// Learning rate after the scheduler step of this epoch
    pub learning_rate: f64,
}

/// History of the supervised pretraining loop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisedHistory {
    pub epochs: Vec<SupervisedEpoch>,
}

impl SupervisedHistory {
    pub fn record(&mut self, epoch: SupervisedEpoch) {
        self.epochs.push(epoch);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Highest validation accuracy seen, 0 if no epoch ran
    pub fn best_val_accuracy(&self) -> f64 {
        self.epochs
            .iter()
            .map(|e| e.val_accuracy)
            .fold(0.0, f64::max)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write `<stem>_loss.svg` and `<stem>_acc.svg` into `dir`
    pub fn plot(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
        let pick = |f: fn(&SupervisedEpoch) -> f64| -> Vec<f64> { self.epochs.iter().map(f).collect() };

        let loss_path = dir.join(format!("{}_loss.svg", stem));
        generate_line_chart(
            "Loss Curve",
            "Epoch",
            "Loss",
            &[
                DataSeries::from_epochs("Train", &pick(|e| e.train_loss), COLOR_PRIMARY),
                DataSeries::from_epochs("Validation", &pick(|e| e.val_loss), COLOR_SECONDARY),
            ],
            YAxis::Value,
            &loss_path,
        )?;

        let acc_path = dir.join(format!("{}_acc.svg", stem));
        generate_line_chart(
            "Accuracy Curve",
            "Epoch",
            "Accuracy (%)",
            &[
                DataSeries::from_epochs("Train", &pick(|e| e.train_accuracy), COLOR_PRIMARY),
                DataSeries::from_epochs("Validation", &pick(|e| e.val_accuracy), COLOR_SECONDARY),
            ],
            YAxis::Percent,
            &acc_path,
        )?;

        Ok(vec![loss_path, acc_path])
    }
}

/// Metrics of one domain-adaptation epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptationEpoch {
    /// Mean cross-entropy over the labeled batches
    pub class_loss: f64,
    /// Mean adversarial term seen by the main model (through reversal)
    pub adversarial_loss: f64,
    /// Mean of class + adversarial loss, the headline labeled-phase loss
    pub total_loss: f64,
    /// Mean loss of the discriminator's own update
    pub domain_loss: f64,
    /// Accuracy on the labeled batches (synthetic + pseudo), percent
    pub accuracy: f64,
    /// Mean unweighted symmetric KL over the consistency batches
    pub consistency_loss: f64,
    pub learning_rate: f64,
}

/// History of the domain-adaptation loop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdaptationHistory {
    pub epochs: Vec<AdaptationEpoch>,
}

impl AdaptationHistory {
    pub fn record(&mut self, epoch: AdaptationEpoch) {
        self.epochs.push(epoch);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Write `<stem>_loss.svg` and `<stem>_acc.svg` into `dir`
    pub fn plot(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
        let pick = |f: fn(&AdaptationEpoch) -> f64| -> Vec<f64> { self.epochs.iter().map(f).collect() };

        let loss_path = dir.join(format!("{}_loss.svg", stem));
        generate_line_chart(
            "Domain Adaptation (CDAN + Sharpened Pseudo Labels + Consistency)",
            "Epoch",
            "Loss",
            &[
                DataSeries::from_epochs("Adaptation loss", &pick(|e| e.total_loss), COLOR_PRIMARY),
                DataSeries::from_epochs("Class loss", &pick(|e| e.class_loss), COLOR_SECONDARY),
                DataSeries::from_epochs("Domain loss", &pick(|e| e.domain_loss), COLOR_TERTIARY),
                DataSeries::from_epochs("Consistency", &pick(|e| e.consistency_loss), COLOR_QUATERNARY),
            ],
            YAxis::Value,
            &loss_path,
        )?;

        let acc_path = dir.join(format!("{}_acc.svg", stem));
        generate_line_chart(
            "Domain Adaptation Train Accuracy",
            "Epoch",
            "Accuracy (%)",
            &[DataSeries::from_epochs("Train accuracy", &pick(|e| e.accuracy), COLOR_SECONDARY)],
            YAxis::Percent,
            &acc_path,
        )?;

        Ok(vec![loss_path, acc_path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch(val_accuracy: f64) -> SupervisedEpoch {
        SupervisedEpoch {
            train_loss: 1.0,
            train_accuracy: 50.0,
            val_loss: 1.1,
            val_accuracy,
            learning_rate: 1e-4,
        }
    }

    #[test]
    fn test_best_val_accuracy() {
        let mut history = SupervisedHistory::default();
        assert_eq!(history.best_val_accuracy(), 0.0);

        history.record(epoch(40.0));
        history.record(epoch(70.0));
        history.record(epoch(65.0));
        assert_eq!(history.best_val_accuracy(), 70.0);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_supervised_json_roundtrip_and_plots() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = SupervisedHistory::default();
        history.record(epoch(40.0));
        history.record(epoch(55.0));

        let json = dir.path().join("training_history.json");
        history.save_json(&json).unwrap();
        let loaded = SupervisedHistory::load_json(&json).unwrap();
        assert_eq!(loaded.epochs, history.epochs);

        let plots = history.plot(dir.path(), "training_curves").unwrap();
        assert_eq!(plots.len(), 2);
        assert!(plots.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_adaptation_plots() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = AdaptationHistory::default();
        history.record(AdaptationEpoch {
            class_loss: 0.4,
            adversarial_loss: 0.7,
            total_loss: 1.1,
            domain_loss: 0.69,
            accuracy: 81.0,
            consistency_loss: 0.05,
            learning_rate: 1e-4,
        });

        let plots = history.plot(dir.path(), "domain_adaptation").unwrap();
        assert!(plots[0].ends_with("domain_adaptation_loss.svg"));
        assert!(plots[1].exists());
    }
}
