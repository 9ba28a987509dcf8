use std::path::PathBuf;

use anyhow::Context as _;
use kt_features::{dataset, derive::Variant};
use kt_frame::{Table, io::write_csv_file};
use kt_split::{DEFAULT_VALID_FRACTION, LabeledTable, SplitPolicy};
use tracing::info;

const TRAIN_SPLIT_FILE: &str = "train_split.csv";
const VALID_SPLIT_FILE: &str = "valid_split.csv";

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SplitArg {
    /// Directory holding the preprocessed variant directories
    #[arg(long)]
    data_root: PathBuf,
    /// Preprocessed variant to split
    #[arg(long)]
    variant: Variant,
    /// Share of rows drawn at random for validation
    #[arg(long, default_value_t = DEFAULT_VALID_FRACTION, conflicts_with = "tail")]
    valid_fraction: f64,
    /// Seed of the random split
    #[arg(long, conflicts_with = "tail")]
    seed: Option<u64>,
    /// Hold out the last N rows of every learner instead of a random share
    #[arg(long, value_name = "N")]
    tail: Option<usize>,
    /// Output directory (defaults to the variant directory)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl SplitArg {
    fn policy(&self) -> SplitPolicy {
        match self.tail {
            Some(rows_per_learner) => SplitPolicy::Tail { rows_per_learner },
            None => SplitPolicy::Random {
                valid_fraction: self.valid_fraction,
                seed: self.seed,
            },
        }
    }
}

pub(crate) fn run(arg: &SplitArg) -> anyhow::Result<()> {
    let variant_dir = arg.data_root.join(arg.variant.name());
    let dataset = dataset::load(&variant_dir).with_context(|| {
        format!(
            "Failed to load preprocessed dataset: {}",
            variant_dir.display()
        )
    })?;

    let split = kt_split::split(&dataset.train, arg.policy())
        .with_context(|| format!("Failed to split {}", variant_dir.display()))?;
    if !split.short_learners.is_empty() {
        info!(
            learners = ?split.short_learners,
            "learners held out entirely"
        );
    }
    log_label_balance("train", &split.train)?;
    log_label_balance("valid", &split.valid)?;

    let output_dir = arg.output_dir.clone().unwrap_or(variant_dir);
    std::fs::create_dir_all(&output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            output_dir.display()
        )
    })?;
    for (file, table) in [(TRAIN_SPLIT_FILE, &split.train), (VALID_SPLIT_FILE, &split.valid)] {
        let path = output_dir.join(file);
        write_csv_file(table, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), rows = table.num_rows(), "written");
    }
    Ok(())
}

fn log_label_balance(subset: &str, table: &Table) -> anyhow::Result<()> {
    let labeled = LabeledTable::from_table(table.clone())
        .with_context(|| format!("Failed to read labels of the {subset} subset"))?;
    let correct = labeled.labels.iter().filter(|&&label| label == 1).count();
    info!(
        subset,
        rows = labeled.len(),
        correct,
        features = labeled.features.num_columns(),
        "split subset"
    );
    Ok(())
}
