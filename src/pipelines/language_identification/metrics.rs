use serde::{Deserialize, Serialize};

use crate::datasets::Split;

/// How per-class scores are combined into one F1 score
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Average {
    /// Pool true positives, false positives and false negatives over all classes. For
    /// single-label classification this equals accuracy.
    #[default]
    Micro,

    /// The unweighted mean of per-class F1 over the classes seen so far
    Macro,
}

/// Running F1 score over many batches of predictions
#[derive(Clone, Debug, PartialEq)]
pub struct F1Score {
    average: Average,
    true_positives: Vec<u64>,
    false_positives: Vec<u64>,
    false_negatives: Vec<u64>,
}

impl F1Score {
    /// Create an empty accumulator over `num_classes` classes
    pub fn new(num_classes: usize, average: Average) -> Self {
        Self {
            average,
            true_positives: vec![0; num_classes],
            false_positives: vec![0; num_classes],
            false_negatives: vec![0; num_classes],
        }
    }

    /// The number of classes scored
    pub fn num_classes(&self) -> usize {
        self.true_positives.len()
    }

    /// Accumulate a batch of predictions and return the F1 score of that batch alone
    pub fn update(&mut self, predictions: &[i64], targets: &[i64]) -> Result<f64, MetricError> {
        if predictions.len() != targets.len() {
            return Err(MetricError::LengthMismatch {
                predictions: predictions.len(),
                targets: targets.len(),
            });
        }

        let mut batch = F1Score::new(self.num_classes(), self.average);

        for (prediction, target) in predictions.iter().zip(targets) {
            let prediction = batch.class(*prediction)?;
            let target = batch.class(*target)?;

            if prediction == target {
                batch.true_positives[target] += 1;
            } else {
                batch.false_positives[prediction] += 1;
                batch.false_negatives[target] += 1;
            }
        }

        self.merge(&batch);

        Ok(batch.compute())
    }

    /// The F1 score over everything accumulated since the last reset, 0 when nothing was seen
    pub fn compute(&self) -> f64 {
        match self.average {
            Average::Micro => f1(
                self.true_positives.iter().sum(),
                self.false_positives.iter().sum(),
                self.false_negatives.iter().sum(),
            ),
            Average::Macro => {
                let scores: Vec<f64> = (0..self.num_classes())
                    .filter(|&c| {
                        self.true_positives[c] + self.false_positives[c] + self.false_negatives[c]
                            > 0
                    })
                    .map(|c| {
                        f1(
                            self.true_positives[c],
                            self.false_positives[c],
                            self.false_negatives[c],
                        )
                    })
                    .collect();

                if scores.is_empty() {
                    0.0
                } else {
                    scores.iter().sum::<f64>() / scores.len() as f64
                }
            }
        }
    }

    /// Clear all accumulated counts
    pub fn reset(&mut self) {
        self.true_positives.fill(0);
        self.false_positives.fill(0);
        self.false_negatives.fill(0);
    }

    /// True when nothing has been accumulated since the last reset
    pub fn is_empty(&self) -> bool {
        self.true_positives
            .iter()
            .chain(&self.false_positives)
            .chain(&self.false_negatives)
            .all(|count| *count == 0)
    }

    fn class(&self, value: i64) -> Result<usize, MetricError> {
        usize::try_from(value)
            .ok()
            .filter(|class| *class < self.num_classes())
            .ok_or(MetricError::ClassOutOfRange {
                value,
                num_classes: self.num_classes(),
            })
    }

    fn merge(&mut self, other: &F1Score) {
        for c in 0..self.num_classes() {
            self.true_positives[c] += other.true_positives[c];
            self.false_positives[c] += other.false_positives[c];
            self.false_negatives[c] += other.false_negatives[c];
        }
    }
}

fn f1(true_positives: u64, false_positives: u64, false_negatives: u64) -> f64 {
    let denominator = 2 * true_positives + false_positives + false_negatives;

    if denominator == 0 {
        0.0
    } else {
        (2 * true_positives) as f64 / denominator as f64
    }
}

/// Everything a split accumulates over one epoch
#[derive(Clone, Debug, PartialEq)]
pub struct SplitState {
    /// Running F1 score
    pub f1: F1Score,

    /// Loss of every step so far
    pub losses: Vec<f64>,
}

impl SplitState {
    /// Create an empty split state
    pub fn new(num_classes: usize, average: Average) -> Self {
        Self {
            f1: F1Score::new(num_classes, average),
            losses: Vec::new(),
        }
    }

    /// Read the epoch's mean loss and F1 score, leaving the state empty for the next epoch
    pub fn take(&mut self) -> Option<EpochMetrics> {
        if self.losses.is_empty() {
            self.f1.reset();
            return None;
        }

        let loss = self.losses.iter().sum::<f64>() / self.losses.len() as f64;
        let f1 = self.f1.compute();

        self.losses.clear();
        self.f1.reset();

        Some(EpochMetrics { loss, f1 })
    }

    /// True when nothing has been recorded since the last read
    pub fn is_empty(&self) -> bool {
        self.losses.is_empty() && self.f1.is_empty()
    }
}

/// One accumulator per split, never shared between splits
#[derive(Clone, Debug, PartialEq)]
pub struct SplitMetrics {
    /// Training split
    pub train: SplitState,

    /// Validation split
    pub val: SplitState,

    /// Test split
    pub test: SplitState,
}

impl SplitMetrics {
    /// Create empty accumulators for all splits
    pub fn new(num_classes: usize, average: Average) -> Self {
        Self {
            train: SplitState::new(num_classes, average),
            val: SplitState::new(num_classes, average),
            test: SplitState::new(num_classes, average),
        }
    }

    /// The state of one split
    pub fn get(&self, split: Split) -> &SplitState {
        match split {
            Split::Train => &self.train,
            Split::Validation => &self.val,
            Split::Test => &self.test,
        }
    }

    /// The mutable state of one split
    pub fn get_mut(&mut self, split: Split) -> &mut SplitState {
        match split {
            Split::Train => &mut self.train,
            Split::Validation => &mut self.val,
            Split::Test => &mut self.test,
        }
    }
}

/// Epoch-level metrics of one split
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Mean step loss
    pub loss: f64,

    /// F1 score over the whole epoch
    pub f1: f64,
}

/// Metric Error
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MetricError {
    /// Predictions and targets differ in length
    #[error("{predictions} predictions but {targets} targets")]
    LengthMismatch {
        /// Number of predictions
        predictions: usize,
        /// Number of targets
        targets: usize,
    },

    /// A class id outside of [0, num_classes)
    #[error("class {value} is outside of [0, {num_classes})")]
    ClassOutOfRange {
        /// The offending value
        value: i64,
        /// Number of classes
        num_classes: usize,
    },
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn micro_f1_is_accuracy_for_single_label_predictions() {
        let mut f1 = F1Score::new(3, Average::Micro);

        let batch = f1.update(&[0, 1, 2, 2], &[0, 1, 1, 2]).unwrap();

        assert_eq!(batch, 0.75);
        assert_eq!(f1.compute(), 0.75);
    }

    #[test]
    fn update_returns_the_batch_score_and_accumulates() {
        let mut f1 = F1Score::new(2, Average::Micro);

        assert_eq!(f1.update(&[0, 0], &[0, 0]).unwrap(), 1.0);
        assert_eq!(f1.update(&[1, 1], &[0, 0]).unwrap(), 0.0);
        assert_eq!(f1.compute(), 0.5);
    }

    #[test]
    fn macro_f1_averages_classes_with_support() {
        let mut f1 = F1Score::new(3, Average::Macro);

        f1.update(&[0, 0, 1], &[0, 1, 1]).unwrap();

        // class 0: tp 1, fp 1, fn 0 -> 2/3; class 1: tp 1, fp 0, fn 1 -> 2/3; class 2 unseen
        assert!((f1.compute() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_sentinel_classes() {
        let mut f1 = F1Score::new(2, Average::Micro);

        assert_eq!(
            f1.update(&[0], &[2]),
            Err(MetricError::ClassOutOfRange {
                value: 2,
                num_classes: 2
            })
        );
        assert!(f1.is_empty());
    }

    #[test]
    fn reading_a_split_resets_it() {
        let mut metrics = SplitMetrics::new(2, Average::Micro);

        let train = metrics.get_mut(Split::Train);
        train.losses.extend([1.0, 3.0]);
        train.f1.update(&[0, 1], &[0, 0]).unwrap();

        assert_eq!(
            metrics.get_mut(Split::Train).take(),
            Some(EpochMetrics { loss: 2.0, f1: 0.5 })
        );
        assert!(metrics.get(Split::Train).is_empty());
        assert!(metrics.get(Split::Validation).is_empty());

        let train = metrics.get_mut(Split::Train);
        assert_eq!(train.f1.update(&[1], &[1]).unwrap(), 1.0);
        train.losses.push(0.5);
        assert_eq!(train.take(), Some(EpochMetrics { loss: 0.5, f1: 1.0 }));
    }
}
