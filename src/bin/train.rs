//! Command line tool to train a language identification model

use std::sync::Arc;

use anyhow::anyhow;
use burn_lang_id::{
    config::Config,
    datasets::wikiann,
    pipelines::language_identification,
    tokenizer::PretrainedTokenizer,
};
use pico_args::Arguments;

#[cfg(not(feature = "tch"))]
mod backend {
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};

    pub type Backend = Autodiff<NdArray>;

    pub fn device() -> NdArrayDevice {
        NdArrayDevice::Cpu
    }
}

#[cfg(feature = "tch")]
mod backend {
    use burn::backend::{libtorch::LibTorchDevice, Autodiff, LibTorch};

    pub type Backend = Autodiff<LibTorch>;

    pub fn device() -> LibTorchDevice {
        LibTorchDevice::Cuda(0)
    }
}

const HELP: &str = "\
Usage: train CONFIG [OPTIONS]

Arguments:
  CONFIG               The path to a YAML run configuration

Options:
  -h, --help           Print help
  -d, --data-dir       The path to the top-level data directory (overrides the config)
  -a, --artifact-dir   Directory to save the trained model into (overrides the config)
  -n, --num-epochs     Number of epochs to train for
  -b, --batch-size     Batch size
";

#[derive(Debug)]
struct Args {
    config: String,
    data_dir: Option<String>,
    artifact_dir: Option<String>,
    num_epochs: Option<usize>,
    batch_size: Option<usize>,
}

impl Args {
    fn parse() -> anyhow::Result<Option<Self>> {
        let mut pargs = Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let args = Args {
            data_dir: pargs.opt_value_from_str(["-d", "--data-dir"])?,
            artifact_dir: pargs.opt_value_from_str(["-a", "--artifact-dir"])?,
            num_epochs: pargs.opt_value_from_str(["-n", "--num-epochs"])?,
            batch_size: pargs.opt_value_from_str(["-b", "--batch-size"])?,
            config: pargs.free_from_str().map_err(|e| match e {
                pico_args::Error::MissingArgument => anyhow!("Missing required argument: CONFIG"),
                _ => anyhow!("{}", e),
            })?,
        };

        Ok(Some(args))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let Some(args) = Args::parse()? else {
        print!("{}", HELP);

        return Ok(());
    };

    let mut config = Config::load(&args.config).await?;

    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    if let Some(artifact_dir) = args.artifact_dir {
        config.artifact_dir = artifact_dir;
    }

    if let Some(num_epochs) = args.num_epochs {
        config.num_epochs = num_epochs;
    }

    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }

    config.validate()?;

    let tokenizer = PretrainedTokenizer::from_pretrained(&config.tokenizer_name)?;
    let source = wikiann::Corpus::in_data_dir(&config.data_dir);

    let (_, history) = language_identification::train::<backend::Backend>(
        backend::device(),
        config,
        Arc::new(tokenizer),
        &source,
    )
    .await?;

    if let Some(test) = history.test {
        println!("test/loss={:.6} test/f1={:.6}", test.loss, test.f1);
    }

    Ok(())
}
