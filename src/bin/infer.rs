//! Command line tool to label each word of a text with its language

use anyhow::{anyhow, Result};
use burn_lang_id::pipelines::language_identification::Identifier;
use pico_args::Arguments;

#[cfg(not(feature = "tch"))]
mod backend {
    use burn::backend::{ndarray::NdArrayDevice, NdArray};

    pub type Backend = NdArray;

    pub fn device() -> NdArrayDevice {
        NdArrayDevice::Cpu
    }
}

#[cfg(feature = "tch")]
mod backend {
    use burn::backend::{libtorch::LibTorchDevice, LibTorch};

    pub type Backend = LibTorch;

    pub fn device() -> LibTorchDevice {
        LibTorchDevice::Cuda(0)
    }
}

const HELP: &str = "\
Usage: infer ARTIFACT_DIR TEXT...

Arguments:
  ARTIFACT_DIR         Directory holding a trained model
  TEXT                 One or more texts to label

Options:
  -h, --help           Print help
";

#[derive(Debug)]
struct Args {
    /// Prints the usage menu
    help: bool,

    /// Directory holding a trained model
    artifact_dir: String,

    /// Texts to label
    texts: Vec<String>,
}

fn parse_args() -> Result<Args> {
    let mut pargs = Arguments::from_env();

    let help = pargs.contains(["-h", "--help"]);

    if help {
        return Ok(Args {
            help,
            artifact_dir: String::new(),
            texts: Vec::new(),
        });
    }

    let artifact_dir = pargs.free_from_str().map_err(|e| match e {
        pico_args::Error::MissingArgument => anyhow!("Missing required argument: ARTIFACT_DIR"),
        _ => anyhow!("{}", e),
    })?;

    let texts = pargs
        .finish()
        .into_iter()
        .map(|text| {
            text.into_string()
                .map_err(|text| anyhow!("Text is not valid UTF-8: {:?}", text))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Args {
        help,
        artifact_dir,
        texts,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();

    let args = parse_args()?;

    if args.help {
        println!("{}", HELP);
        return Ok(());
    }

    if args.texts.is_empty() {
        return Err(anyhow!("Missing required argument: TEXT"));
    }

    let identifier = Identifier::<backend::Backend>::load(&args.artifact_dir, backend::device())?;

    let results = identifier.identify(&args.texts)?;

    for (i, (text, words)) in args.texts.iter().zip(results).enumerate() {
        println!("\n=== Item {i} ===\n- Text: {text}");

        for word in words {
            println!("  {}\t{}", word.language, word.word);
        }
    }

    Ok(())
}
