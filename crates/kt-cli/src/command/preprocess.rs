use std::path::PathBuf;

use anyhow::Context as _;
use kt_features::{
    derive::Variant,
    pipeline::{self, DEFAULT_TEST_FILE, DEFAULT_TRAIN_FILE, PipelineConfig},
};

use crate::util;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct PreprocessArg {
    /// Directory holding the raw event files; outputs go to `<DATA_ROOT>/<VARIANT>`
    #[arg(long)]
    data_root: PathBuf,
    /// Feature variant to derive
    #[arg(long)]
    variant: Variant,
    /// Raw training file name, relative to the data root
    #[arg(long, default_value = DEFAULT_TRAIN_FILE)]
    train_file: String,
    /// Raw test file name, relative to the data root
    #[arg(long, default_value = DEFAULT_TEST_FILE)]
    test_file: String,
    /// Where to write the encoding metadata as JSON (stdout if omitted)
    #[arg(long)]
    metadata_output: Option<PathBuf>,
}

pub(crate) fn run(arg: &PreprocessArg) -> anyhow::Result<()> {
    let PreprocessArg {
        data_root,
        variant,
        train_file,
        test_file,
        metadata_output,
    } = arg;
    let config = PipelineConfig {
        data_root: data_root.clone(),
        train_file: train_file.clone(),
        test_file: test_file.clone(),
    };
    let encoded = pipeline::run(&config, *variant)
        .with_context(|| format!("Failed to preprocess variant {variant}"))?;
    util::write_json(&encoded.metadata, metadata_output.as_deref())?;
    Ok(())
}
