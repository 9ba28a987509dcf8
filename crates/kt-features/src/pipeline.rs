//! End-to-end preprocessing of one feature variant.
//!
//! ```text
//! raw train/test ──derive──▶ drop Timestamp ──encode──▶ <data_root>/<Variant>/
//! ```

use std::path::PathBuf;

use kt_frame::{FrameError, Table, io::read_raw_events, schema::TIMESTAMP};
use tracing::info;

use crate::{
    dataset::{self, DatasetError},
    derive::{DeriveError, FeatureDeriver, Variant},
    encoding::{CategoricalEncoder, EncodeError, EncodedTables},
};

pub const DEFAULT_TRAIN_FILE: &str = "train_data.csv";
pub const DEFAULT_TEST_FILE: &str = "test_data.csv";

/// Input and output locations of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Directory holding the raw files and receiving one subdirectory per variant.
    pub data_root: PathBuf,
    pub train_file: String,
    pub test_file: String,
}

impl PipelineConfig {
    #[must_use]
    pub fn new<P>(data_root: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self {
            data_root: data_root.into(),
            train_file: DEFAULT_TRAIN_FILE.to_owned(),
            test_file: DEFAULT_TEST_FILE.to_owned(),
        }
    }

    #[must_use]
    pub fn train_path(&self) -> PathBuf {
        self.data_root.join(&self.train_file)
    }

    #[must_use]
    pub fn test_path(&self) -> PathBuf {
        self.data_root.join(&self.test_file)
    }

    /// Output directory of `variant`.
    #[must_use]
    pub fn variant_dir(&self, variant: Variant) -> PathBuf {
        self.data_root.join(variant.name())
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum PipelineError {
    #[display("failed to load raw events")]
    Load { source: FrameError },
    #[display("feature derivation failed")]
    Derive { source: DeriveError },
    #[display("categorical encoding failed")]
    Encode { source: EncodeError },
    #[display("failed to save the encoded dataset")]
    Save { source: DatasetError },
}

impl From<DeriveError> for PipelineError {
    fn from(source: DeriveError) -> Self {
        Self::Derive { source }
    }
}

impl From<EncodeError> for PipelineError {
    fn from(source: EncodeError) -> Self {
        Self::Encode { source }
    }
}

impl From<DatasetError> for PipelineError {
    fn from(source: DatasetError) -> Self {
        Self::Save { source }
    }
}

/// Derives features with `deriver`, drops `Timestamp` and encodes both tables.
pub fn process(
    deriver: &dyn FeatureDeriver,
    train: &Table,
    test: &Table,
) -> Result<EncodedTables, PipelineError> {
    info!(variant = deriver.name(), "deriving features");
    let (train, test) = deriver.derive(train, test)?;
    let train = drop_timestamp(train)?;
    let test = drop_timestamp(test)?;

    info!(
        columns = train.num_columns(),
        "encoding categorical columns"
    );
    let encoded = CategoricalEncoder::fit_transform(&train, &test)?;
    info!(
        id_space_size = encoded.metadata.id_space_size,
        categorical = encoded.metadata.num_categorical,
        features = encoded.metadata.num_features,
        "encoded"
    );
    Ok(encoded)
}

/// Loads the raw tables of `config`, processes them with `variant` and saves
/// the result under [`PipelineConfig::variant_dir`].
///
/// Nothing is written unless every stage succeeds.
pub fn run(config: &PipelineConfig, variant: Variant) -> Result<EncodedTables, PipelineError> {
    let deriver = variant.deriver();
    info!(
        variant = %variant,
        description = deriver.description(),
        data_root = %config.data_root.display(),
        "starting preprocessing"
    );

    let load = |path: PathBuf| {
        info!(path = %path.display(), "loading raw events");
        read_raw_events(&path).map_err(|source| PipelineError::Load { source })
    };
    let train = load(config.train_path())?;
    let test = load(config.test_path())?;
    info!(train = train.num_rows(), test = test.num_rows(), "loaded raw events");

    let encoded = process(deriver.as_ref(), &train, &test)?;

    let dir = config.variant_dir(variant);
    info!(dir = %dir.display(), "saving");
    dataset::save(&encoded, &dir)?;
    Ok(encoded)
}

fn drop_timestamp(table: Table) -> Result<Table, DeriveError> {
    Ok(table.without_column(TIMESTAMP)?)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use kt_frame::schema::{ANSWER_CODE, USER_ID, WITHHELD_ANSWER};

    use super::*;

    const TRAIN: &str = "\
userID,assessmentItemID,testId,answerCode,Timestamp,KnowledgeTag
0,A060001001,A060000001,1,2020-03-24 00:17:11,7224
0,A060001002,A060000001,1,2020-03-24 00:17:14,7225
0,A060001003,A060000001,0,2020-03-24 00:17:20,7225
1,A070001001,A070000001,0,2020-03-25 10:00:00,8000
1,A070001002,A070000001,1,2020-03-25 10:00:40,8001
";

    const TEST: &str = "\
userID,assessmentItemID,testId,answerCode,Timestamp,KnowledgeTag
2,A060001001,A060000001,1,2020-04-01 09:00:00,7224
2,A060001002,A060000001,-1,2020-04-01 09:00:30,7225
";

    fn config(root: &std::path::Path) -> PipelineConfig {
        fs::write(root.join(DEFAULT_TRAIN_FILE), TRAIN).unwrap();
        fs::write(root.join(DEFAULT_TEST_FILE), TEST).unwrap();
        PipelineConfig::new(root)
    }

    #[test]
    fn test_run_every_variant() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        for variant in Variant::ALL {
            let encoded = run(&config, variant).unwrap();
            let loaded = dataset::load(&config.variant_dir(variant)).unwrap();
            assert_eq!(loaded.metadata, encoded.metadata, "{variant}");
            assert_eq!(loaded.train.num_rows(), 5, "{variant}");
            assert!(!loaded.train.contains(TIMESTAMP), "{variant}");
            assert_eq!(
                loaded.test.ints(ANSWER_CODE).unwrap().last(),
                Some(&Some(WITHHELD_ANSWER)),
                "{variant}"
            );
            assert_eq!(
                loaded.test.ints(USER_ID).unwrap(),
                &[Some(2), Some(2)],
                "{variant}"
            );
        }
    }

    #[test]
    fn test_process_encodes_categorical_columns() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        let train = read_raw_events(config.train_path()).unwrap();
        let test = read_raw_events(config.test_path()).unwrap();

        let encoded = process(Variant::InteractionLag.deriver().as_ref(), &train, &test).unwrap();
        // Items 5, tests 2, tags 4, interaction {0, 1}.
        assert_eq!(encoded.metadata.id_space_size, 14);
        assert_eq!(encoded.metadata.num_categorical, 4);
        assert_eq!(encoded.metadata.num_features, 1);
        assert_eq!(
            encoded.train.ints("interaction_c").unwrap(),
            &[Some(0), Some(13), Some(13), Some(0), Some(12)]
        );
    }

    #[test]
    fn test_missing_input_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new(root.path());
        assert!(matches!(
            run(&config, Variant::InteractionLag),
            Err(PipelineError::Load { .. })
        ));
        assert!(!config.variant_dir(Variant::InteractionLag).exists());
    }

    #[test]
    fn test_variant_dir() {
        let config = PipelineConfig::new("/data");
        assert_eq!(
            config.variant_dir(Variant::CombinedRaw),
            PathBuf::from("/data/CombinedRaw")
        );
        assert_eq!(config.train_path(), PathBuf::from("/data/train_data.csv"));
    }
}
