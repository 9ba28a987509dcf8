use clap::{Parser, Subcommand};

use self::{preprocess::PreprocessArg, split::SplitArg};

mod preprocess;
mod split;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Derive features for one variant, encode them and save the dataset
    Preprocess(#[clap(flatten)] PreprocessArg),
    /// Split a preprocessed training table into train and validation files
    Split(#[clap(flatten)] SplitArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Preprocess(arg) => preprocess::run(&arg)?,
        Mode::Split(arg) => split::run(&arg)?,
    }
    Ok(())
}
