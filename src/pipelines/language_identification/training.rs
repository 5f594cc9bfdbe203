use std::{fs, path::Path, sync::Arc};

use burn::{
    config::Config as _,
    data::dataloader::DataLoader,
    module::Module,
    optim::Optimizer,
    record::{CompactRecorder, Recorder},
    tensor::backend::{AutodiffBackend, Backend},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    datasets::{CorpusSource, Split},
    models::language_classifier::{Config as ModelConfig, LanguageClassifier},
    tokenizer::WordTokenizer,
};

use super::{
    batcher::Batch,
    classifier::{self, Classifier, StepError},
    data::LanguageData,
    inference::{PipelineConfig, MODEL_CONFIG_FILE, MODEL_FILE},
    metrics::EpochMetrics,
};

/// The epoch history file in an artifact directory
pub static METRICS_FILE: &str = "metrics.json";

/// The metrics of one finished epoch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// One-based epoch number
    pub epoch: usize,

    /// Training split metrics
    pub train: EpochMetrics,

    /// Validation split metrics, absent when the split has no labelled token
    pub val: Option<EpochMetrics>,
}

/// Everything recorded over a run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    /// Per-epoch metrics
    pub epochs: Vec<EpochSummary>,

    /// Test split metrics after the last epoch, absent when the split has no labelled token
    pub test: Option<EpochMetrics>,
}

/// Fine-tune a pretrained embedder for language identification, then save the model, its
/// config and the pipeline settings to the configured artifact directory
pub async fn train<B: AutodiffBackend>(
    device: B::Device,                  // Device on which to perform computation
    config: Config,                     // Validated run configuration
    tokenizer: Arc<dyn WordTokenizer>,  // The tokenizer matching the embedder's vocabulary
    source: &dyn CorpusSource,          // Where per-language records come from
) -> anyhow::Result<(LanguageClassifier<B>, History)> {
    B::seed(config.seed);

    let mut data = LanguageData::new(&config, tokenizer);
    data.setup(source).await?;

    let (model_config, model) = ModelConfig::pretrained::<B>(
        &config.models_dir,
        &config.embedder_name,
        config.n_languages(),
        config.freeze_embedder,
        &device,
    )?;

    let mut classifier = classifier::adamw(model, &config.optimizer, config.scheduler.as_ref());

    let mut history = History {
        epochs: fit(&mut classifier, &data, config.num_epochs, &device)?,
        test: None,
    };
    history.test = test(&mut classifier, &data, &device)?;

    let pipeline = PipelineConfig::new(
        config.languages.clone(),
        config.tokenizer_name.clone(),
        config.max_seq_len,
    );

    save(
        &config.artifact_dir,
        &model_config,
        &pipeline,
        &history,
        &classifier.valid(),
    )?;

    Ok((classifier.into_model(), history))
}

/// Run `num_epochs` epochs of training, each followed by a validation pass on the model without
/// autodiff. Batches without a single labelled token are skipped.
pub fn fit<B, O>(
    classifier: &mut Classifier<B, O>,
    data: &LanguageData,
    num_epochs: usize,
    device: &B::Device,
) -> anyhow::Result<Vec<EpochSummary>>
where
    B: AutodiffBackend,
    O: Optimizer<LanguageClassifier<B>, B>,
{
    let dataset_train = data.dataset(Split::Train)?;
    let dataloader_train = data.dataloader::<B>(Split::Train, device)?;
    let dataloader_val = data.dataloader::<B::InnerBackend>(Split::Validation, device)?;
    let has_val = !data.dataset(Split::Validation)?.is_empty();

    let mut epochs = Vec::with_capacity(num_epochs);

    for epoch in 1..=num_epochs {
        info!("Epoch {}/{}", epoch, num_epochs);

        dataset_train.set_epoch(epoch);

        for batch in dataloader_train.iter() {
            skip_unlabelled(classifier.train_step(batch), Split::Train)?;
        }

        let train = classifier.epoch_end(Split::Train)?;

        let val = if has_val {
            evaluate(classifier, dataloader_val.as_ref(), Split::Validation)?
        } else {
            warn!("Validation split is empty, skipping validation");
            None
        };

        epochs.push(EpochSummary { epoch, train, val });
    }

    Ok(epochs)
}

/// Score the test split with the current model
pub fn test<B, O>(
    classifier: &mut Classifier<B, O>,
    data: &LanguageData,
    device: &B::Device,
) -> anyhow::Result<Option<EpochMetrics>>
where
    B: AutodiffBackend,
    O: Optimizer<LanguageClassifier<B>, B>,
{
    if data.dataset(Split::Test)?.is_empty() {
        warn!("Test split is empty, skipping test");
        return Ok(None);
    }

    let dataloader_test = data.dataloader::<B::InnerBackend>(Split::Test, device)?;

    Ok(evaluate(classifier, dataloader_test.as_ref(), Split::Test)?)
}

fn evaluate<B, O>(
    classifier: &mut Classifier<B, O>,
    dataloader: &dyn DataLoader<Batch<B::InnerBackend>>,
    split: Split,
) -> Result<Option<EpochMetrics>, StepError>
where
    B: AutodiffBackend,
    O: Optimizer<LanguageClassifier<B>, B>,
{
    for batch in dataloader.iter() {
        skip_unlabelled(classifier.valid_step(batch, split), split)?;
    }

    match classifier.epoch_end(split) {
        Ok(metrics) => Ok(Some(metrics)),
        Err(StepError::EmptyEpoch(_)) => {
            warn!("No {} batch had a labelled token, skipping {}", split, split);
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

fn skip_unlabelled<T>(result: Result<T, StepError>, split: Split) -> Result<(), StepError> {
    match result {
        Ok(_) => Ok(()),
        Err(StepError::NoContentTokens) => {
            warn!("Skipping a {} batch without labelled tokens", split);
            Ok(())
        }
        Err(error) => Err(error),
    }
}

/// Write the model weights, model config, pipeline settings and epoch history
pub fn save<B: Backend>(
    artifact_dir: &str,
    model_config: &ModelConfig,
    pipeline: &PipelineConfig,
    history: &History,
    model: &LanguageClassifier<B>,
) -> anyhow::Result<()> {
    let artifact_dir = Path::new(artifact_dir);

    fs::create_dir_all(artifact_dir)?;

    model_config
        .save(artifact_dir.join(MODEL_CONFIG_FILE))
        .map_err(|e| anyhow!("Unable to save model config: {}", e))?;

    pipeline.save(artifact_dir)?;

    fs::write(
        artifact_dir.join(METRICS_FILE),
        serde_json::to_string_pretty(history)?,
    )?;

    CompactRecorder::new()
        .record(model.clone().into_record(), artifact_dir.join(MODEL_FILE))
        .map_err(|e| anyhow!("Unable to save trained model weights: {}", e))?;

    info!("Saved model to {}", artifact_dir.display());

    Ok(())
}
