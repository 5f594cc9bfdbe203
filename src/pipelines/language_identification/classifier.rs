use burn::{
    lr_scheduler::{
        noam::{NoamLrScheduler, NoamLrSchedulerConfig},
        LrScheduler,
    },
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
    LearningRate,
};
use log::{debug, info};

use crate::{
    config::{OptimizerConfig, SchedulerConfig},
    datasets::Split,
    models::language_classifier::LanguageClassifier,
    utils::tensors,
};

use super::{
    batcher::Batch,
    metrics::{Average, EpochMetrics, MetricError, SplitMetrics},
};

/// The learning rate used for each optimization step
pub enum LearningRateSchedule {
    /// The same rate for every step
    Constant(LearningRate),

    /// Noam warmup and decay, advanced once per optimization step.
    ///
    /// The configured learning rate is the Noam scale factor, not the peak rate: step `t` uses
    /// `learning_rate * model_size^-0.5 * min(t^-0.5, t * warmup_steps^-1.5)`, which peaks at
    /// `learning_rate / sqrt(model_size * warmup_steps)` on step `warmup_steps`.
    Noam(NoamLrScheduler),
}

impl LearningRateSchedule {
    /// Build the schedule described by the optimizer and optional scheduler settings
    pub fn from_config(
        optimizer: &OptimizerConfig,
        scheduler: Option<&SchedulerConfig>,
        model_size: usize,
    ) -> Self {
        match scheduler {
            None => Self::Constant(optimizer.learning_rate),
            Some(scheduler) => Self::Noam(
                NoamLrSchedulerConfig::new(optimizer.learning_rate)
                    .with_warmup_steps(scheduler.warmup_steps)
                    .with_model_size(model_size)
                    .init(),
            ),
        }
    }

    /// The rate for the next optimization step
    pub fn next<B: Backend>(&mut self) -> LearningRate {
        match self {
            Self::Constant(learning_rate) => *learning_rate,
            Self::Noam(scheduler) => LrScheduler::<B>::step(scheduler),
        }
    }
}

/// Owns the model, its optimizer, and one metric accumulator per split, and runs the per-step
/// forward, mask, loss and metric transitions for an external training driver.
pub struct Classifier<B: AutodiffBackend, O> {
    model: LanguageClassifier<B>,
    optimizer: O,
    schedule: LearningRateSchedule,
    metrics: SplitMetrics,
}

/// Wire an AdamW optimizer over every trainable parameter of the model. Parameters frozen before
/// this call receive no gradients and are never updated.
pub fn adamw<B: AutodiffBackend>(
    model: LanguageClassifier<B>,
    optimizer: &OptimizerConfig,
    scheduler: Option<&SchedulerConfig>,
) -> Classifier<B, impl Optimizer<LanguageClassifier<B>, B>> {
    let schedule =
        LearningRateSchedule::from_config(optimizer, scheduler, model.embedder.hidden_size());

    let adamw = AdamWConfig::new()
        .with_weight_decay(optimizer.weight_decay)
        .with_epsilon(optimizer.epsilon)
        .init::<B, LanguageClassifier<B>>();

    Classifier::new(model, adamw, schedule)
}

impl<B, O> Classifier<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<LanguageClassifier<B>, B>,
{
    /// Create a classifier with fresh, empty metric accumulators
    pub fn new(model: LanguageClassifier<B>, optimizer: O, schedule: LearningRateSchedule) -> Self {
        let metrics = SplitMetrics::new(model.n_languages, Average::default());

        Self {
            model,
            optimizer,
            schedule,
            metrics,
        }
    }

    /// The current model
    pub fn model(&self) -> &LanguageClassifier<B> {
        &self.model
    }

    /// Release the trained model
    pub fn into_model(self) -> LanguageClassifier<B> {
        self.model
    }

    /// The model without autodiff, for inference
    pub fn valid(&self) -> LanguageClassifier<B::InnerBackend> {
        self.model.valid()
    }

    /// The per-split accumulators
    pub fn metrics(&self) -> &SplitMetrics {
        &self.metrics
    }

    /// The number of languages the model scores
    pub fn n_languages(&self) -> usize {
        self.model.n_languages
    }

    /// Predicted language id for every token, `[batch_size, seq_length]`
    pub fn forward(
        &self,
        input_ids: Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2, Int> {
        self.model.infer(input_ids, attention_mask)
    }

    /// Run one step on a batch and return the loss.
    ///
    /// Positions labelled `n_languages` or above (padding and word continuations) are removed
    /// before the loss and the split's F1 score are computed. On error nothing is recorded.
    pub fn step(&mut self, batch: Batch<B>, split: Split) -> Result<Tensor<B, 1>, StepError> {
        let output = masked_loss(&self.model, batch)?;
        let loss_value = output.loss.clone().into_scalar().elem::<f64>();

        self.record(split, loss_value, &output.predictions, &output.targets)?;

        Ok(output.loss)
    }

    /// Run one evaluation step without autodiff, so dropout is disabled and no graph is built.
    /// Records into the same accumulator as `step` and returns the loss value.
    pub fn valid_step(
        &mut self,
        batch: Batch<B::InnerBackend>,
        split: Split,
    ) -> Result<f64, StepError> {
        let output = masked_loss(&self.model.valid(), batch)?;
        let loss_value = output.loss.into_scalar().elem::<f64>();

        self.record(split, loss_value, &output.predictions, &output.targets)?;

        Ok(loss_value)
    }

    fn record(
        &mut self,
        split: Split,
        loss_value: f64,
        predictions: &[i64],
        targets: &[i64],
    ) -> Result<(), StepError> {
        let state = self.metrics.get_mut(split);
        let f1 = state.f1.update(predictions, targets)?;
        state.losses.push(loss_value);

        // Log
        if split == Split::Train {
            debug!("train/step_loss={:.6} train/step_f1={:.6}", loss_value, f1);
        }

        Ok(())
    }

    /// Backpropagate a training loss and apply one optimizer update, returning the rate used
    pub fn optimize(&mut self, loss: Tensor<B, 1>) -> LearningRate {
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);

        let learning_rate = self.schedule.next::<B>();

        self.model = self
            .optimizer
            .step(learning_rate, self.model.clone(), grads);

        learning_rate
    }

    /// A full training step: forward, mask, loss and metric, then an optimizer update
    pub fn train_step(&mut self, batch: Batch<B>) -> Result<f64, StepError> {
        let loss = self.step(batch, Split::Train)?;
        let loss_value = loss.clone().into_scalar().elem::<f64>();

        self.optimize(loss);

        Ok(loss_value)
    }

    /// Read the split's mean step loss and F1 score, and reset its accumulator for the next epoch
    pub fn epoch_end(&mut self, split: Split) -> Result<EpochMetrics, StepError> {
        let metrics = self
            .metrics
            .get_mut(split)
            .take()
            .ok_or(StepError::EmptyEpoch(split))?;

        let prefix = split.metric_prefix();
        info!(
            "{}/loss={:.6} {}/f1={:.6}",
            prefix, metrics.loss, prefix, metrics.f1
        );

        Ok(metrics)
    }
}

/// The masked loss of one batch together with the host-side predictions and targets it covers
pub struct MaskedOutput<B: Backend> {
    /// Mean cross entropy over the labelled positions
    pub loss: Tensor<B, 1>,

    /// Argmax language per labelled position
    pub predictions: Vec<i64>,

    /// Language per labelled position
    pub targets: Vec<i64>,
}

/// Forward a batch, mask out sentinel positions and compute the cross entropy.
///
/// Labels are checked before the forward pass, so a batch without any labelled position fails
/// with `NoContentTokens` instead of reaching the encoder.
pub fn masked_loss<B: Backend>(
    model: &LanguageClassifier<B>,
    batch: Batch<B>,
) -> Result<MaskedOutput<B>, StepError> {
    let n_languages = model.n_languages;
    let [batch_size, seq_length] = batch.labels.dims();

    if batch.input_ids.dims() != [batch_size, seq_length]
        || batch.attention_mask.dims() != [batch_size, seq_length]
    {
        return Err(StepError::ShapeMismatch(format!(
            "input ids {:?} and attention mask {:?} do not match labels {:?}",
            batch.input_ids.dims(),
            batch.attention_mask.dims(),
            [batch_size, seq_length]
        )));
    }

    // Mask
    let labels = tensors::int_values(batch.labels);
    let (positions, targets) = content_positions(&labels, n_languages)?;
    let n_tokens = targets.len();

    // Forward
    let logits = model.forward(batch.input_ids, batch.attention_mask);

    if logits.dims() != [batch_size, seq_length, n_languages] {
        return Err(StepError::ShapeMismatch(format!(
            "logits {:?} do not match labels {:?} over {} languages",
            logits.dims(),
            [batch_size, seq_length],
            n_languages
        )));
    }

    let device = logits.device();
    let logits = logits
        .reshape([batch_size * seq_length, n_languages])
        .select(0, tensors::int_tensor::<B, 1>(positions, [n_tokens], &device));

    if logits.dims() != [n_tokens, n_languages] {
        return Err(StepError::ShapeMismatch(format!(
            "masked logits {:?} do not match {} masked labels",
            logits.dims(),
            n_tokens
        )));
    }

    // Loss and metric inputs
    let loss = CrossEntropyLossConfig::new().init(&device).forward(
        logits.clone(),
        tensors::int_tensor::<B, 1>(targets.clone(), [n_tokens], &device),
    );

    let predictions = tensors::int_values(logits.detach().argmax(1).reshape([n_tokens]));

    Ok(MaskedOutput {
        loss,
        predictions,
        targets,
    })
}

/// Split flattened labels into the positions that carry a real language and their labels.
///
/// Every label must be a language id, the padding sentinel `n_languages`, or the continuation
/// sentinel `n_languages + 1`.
pub fn content_positions(
    labels: &[i64],
    n_languages: usize,
) -> Result<(Vec<i64>, Vec<i64>), StepError> {
    let n_languages = n_languages as i64;

    let mut positions = Vec::new();
    let mut targets = Vec::new();

    for (position, label) in labels.iter().enumerate() {
        match *label {
            label if (0..n_languages).contains(&label) => {
                positions.push(position as i64);
                targets.push(label);
            }
            label if label == n_languages || label == n_languages + 1 => {}
            label => return Err(StepError::LabelOutOfRange(label)),
        }
    }

    if targets.is_empty() {
        return Err(StepError::NoContentTokens);
    }

    Ok((positions, targets))
}

/// Step Error
#[derive(thiserror::Error, Debug)]
pub enum StepError {
    /// Batch, logits or masked tensors disagree in shape
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A label that is neither a language id nor a sentinel
    #[error("label {0} is neither a language id nor a sentinel")]
    LabelOutOfRange(i64),

    /// Every position in the batch is padding or a word continuation
    #[error("batch has no labelled tokens")]
    NoContentTokens,

    /// Epoch end was requested for a split that took no steps
    #[error("no steps were recorded for the {0} split")]
    EmptyEpoch(Split),

    /// The metric rejected the masked predictions or targets
    #[error(transparent)]
    Metric(#[from] MetricError),
}

#[cfg(test)]
mod tests {
    use burn::backend::{Autodiff, NdArray};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        datasets::RawRecord,
        languages::Languages,
        models::{embedder, language_classifier::Config},
        pipelines::language_identification::{batcher::Batcher, sample::SampleBuilder},
        tokenizer::testing::FixedTokenizer,
    };

    type TestBackend = Autodiff<NdArray>;

    fn classifier(
    ) -> Classifier<TestBackend, impl Optimizer<LanguageClassifier<TestBackend>, TestBackend>> {
        let device = Default::default();
        let model = Config::new(embedder::Config::new(30, 8, 2, 1, 16), 2).init(&device);

        adamw(model, &OptimizerConfig::default(), None)
    }

    fn batch(labels: Vec<i64>, mask: Vec<i64>) -> Batch<TestBackend> {
        let device = Default::default();
        let width = labels.len() / 2;

        Batch::new(
            tensors::int_tensor((1..=labels.len() as i64).collect(), [2, width], &device),
            tensors::int_tensor(mask, [2, width], &device),
            tensors::int_tensor(labels, [2, width], &device),
        )
    }

    #[test]
    fn masking_keeps_only_real_languages() {
        let (positions, targets) = content_positions(&[0, 1, 2, 3, 1, 2], 2).unwrap();

        assert_eq!(positions, vec![0, 1, 4]);
        assert_eq!(targets, vec![0, 1, 1]);
        assert!(targets.iter().all(|label| *label < 2));
    }

    #[test]
    fn masking_rejects_labels_outside_the_sentinels() {
        assert!(matches!(
            content_positions(&[0, 4], 2),
            Err(StepError::LabelOutOfRange(4))
        ));
        assert!(matches!(
            content_positions(&[-1], 2),
            Err(StepError::LabelOutOfRange(-1))
        ));
        assert!(matches!(
            content_positions(&[2, 3, 2], 2),
            Err(StepError::NoContentTokens)
        ));
    }

    #[test]
    fn step_records_loss_and_f1_for_its_split_only() {
        let mut classifier = classifier();

        let loss = classifier
            .step(batch(vec![0, 1, 3, 1, 2, 2], vec![1, 1, 1, 1, 0, 0]), Split::Validation)
            .unwrap();

        let loss = loss.into_scalar().elem::<f64>();
        assert!(loss.is_finite());

        let val = classifier.metrics().get(Split::Validation);
        assert_eq!(val.losses, vec![loss]);
        assert!(!val.f1.is_empty());
        assert!(classifier.metrics().get(Split::Train).is_empty());
        assert!(classifier.metrics().get(Split::Test).is_empty());
    }

    #[test]
    fn mismatched_batch_shapes_are_rejected() {
        let device = Default::default();
        let mut classifier = classifier();

        let batch = Batch::new(
            tensors::int_tensor(vec![1, 2, 3], [1, 3], &device),
            tensors::int_tensor(vec![1, 1, 1], [1, 3], &device),
            tensors::int_tensor(vec![0, 1], [1, 2], &device),
        );

        assert!(matches!(
            classifier.step(batch, Split::Train),
            Err(StepError::ShapeMismatch(_))
        ));
        assert!(classifier.metrics().get(Split::Train).is_empty());
    }

    #[test]
    fn epoch_end_resets_the_split() {
        let mut classifier = classifier();

        classifier
            .train_step(batch(vec![0, 1, 1, 0], vec![1, 1, 1, 1]))
            .unwrap();
        classifier
            .train_step(batch(vec![1, 3, 0, 2], vec![1, 1, 1, 0]))
            .unwrap();

        let metrics = classifier.epoch_end(Split::Train).unwrap();
        assert!(metrics.loss.is_finite());
        assert!((0.0..=1.0).contains(&metrics.f1));
        assert!(classifier.metrics().get(Split::Train).is_empty());

        assert!(matches!(
            classifier.epoch_end(Split::Train),
            Err(StepError::EmptyEpoch(Split::Train))
        ));
    }

    #[test]
    fn empty_record_batch_is_rejected_before_the_forward_pass() {
        let tokenizer = FixedTokenizer::new(&[]);
        let languages = Languages::new(["en", "fr"]).unwrap();
        let builder = SampleBuilder::new(&tokenizer, &languages, 16);

        let record = SampleBuilder::tokenize(&tokenizer, &RawRecord::new(Vec::<String>::new()), 0)
            .unwrap();
        let empty = Batcher::<TestBackend>::new(2, Default::default())
            .collate(vec![builder.build(&[&record])])
            .unwrap();
        assert_eq!(empty.labels.dims(), [1, 0]);

        let mut classifier = classifier();

        assert!(matches!(
            classifier.train_step(empty),
            Err(StepError::NoContentTokens)
        ));
        assert!(classifier.metrics().get(Split::Train).is_empty());

        // A batch made only of sentinels never reaches the model either
        assert!(matches!(
            classifier.step(batch(vec![2, 3, 2, 2], vec![1, 1, 0, 0]), Split::Validation),
            Err(StepError::NoContentTokens)
        ));
        assert!(classifier.metrics().get(Split::Validation).is_empty());
    }

    #[test]
    fn validation_steps_are_deterministic_under_dropout() {
        let device = Default::default();
        let embedder = embedder::Config::new(30, 8, 2, 1, 16).with_hidden_dropout_prob(0.5);
        let model = Config::new(embedder, 2).init::<TestBackend>(&device);
        let mut classifier = adamw(model, &OptimizerConfig::default(), None);

        let labels = vec![0, 1, 3, 1, 0, 2];
        let mask = vec![1, 1, 1, 1, 1, 0];

        let losses = (0..3)
            .map(|_| {
                let batch = Batch::<NdArray>::new(
                    tensors::int_tensor((1..=6).collect(), [2, 3], &device),
                    tensors::int_tensor(mask.clone(), [2, 3], &device),
                    tensors::int_tensor(labels.clone(), [2, 3], &device),
                );

                classifier.valid_step(batch, Split::Validation).unwrap()
            })
            .collect::<Vec<_>>();

        assert_eq!(losses[0], losses[1]);
        assert_eq!(losses[1], losses[2]);

        let val = classifier.metrics().get(Split::Validation);
        assert_eq!(val.losses, losses);
        assert!(classifier.metrics().get(Split::Train).is_empty());
    }

    #[test]
    fn noam_schedule_peaks_at_the_scaled_rate_after_warmup() {
        let optimizer = OptimizerConfig {
            learning_rate: 1.0,
            ..OptimizerConfig::default()
        };
        let scheduler = SchedulerConfig { warmup_steps: 4 };
        let mut schedule = LearningRateSchedule::from_config(&optimizer, Some(&scheduler), 16);

        let rates = (0..8)
            .map(|_| schedule.next::<TestBackend>())
            .collect::<Vec<_>>();

        // 1.0 / sqrt(16 * 4)
        let peak = 0.125;
        assert!((rates[3] - peak).abs() < 1e-12);
        assert!(rates[..3].iter().all(|rate| *rate < peak));
        assert!(rates[4..].iter().all(|rate| *rate < peak));
    }

    #[test]
    fn constant_schedule_never_changes() {
        let mut schedule = LearningRateSchedule::Constant(1e-3);

        assert_eq!(schedule.next::<TestBackend>(), 1e-3);
        assert_eq!(schedule.next::<TestBackend>(), 1e-3);
    }
}
