//! Persisted encoded datasets.
//!
//! One variant's output directory holds:
//!
//! ```text
//! <dir>/train_data.csv   encoded training table + trailing sentinel row
//! <dir>/test_data.csv    encoded test table
//! <dir>/metadata.json    EncodingMetadata
//! ```
//!
//! The sentinel row is all zeros except for its first three non-identity
//! cells, which carry the ID-space size, the number of categorical columns
//! and the number of continuous feature columns. [`load`] checks it against
//! `metadata.json` and strips it, so callers never see it as a data row.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
};

use kt_frame::{
    FrameError, Table,
    io::{read_csv, write_csv_file},
    schema::is_identity_column,
};
use polars::prelude::{DataType, NamedFrom, Series};
use tracing::{debug, warn};

use crate::encoding::{EncodedTables, EncodingMetadata, is_categorical};

pub const TRAIN_FILE: &str = "train_data.csv";
pub const TEST_FILE: &str = "test_data.csv";
pub const METADATA_FILE: &str = "metadata.json";

/// Number of sentinel cells carrying metadata.
const SENTINEL_CELLS: usize = 3;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum DatasetError {
    #[display("failed to access {}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[display("malformed metadata file {}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[display("{source}")]
    Frame { source: FrameError },
    #[display("output directory {} has no file name", path.display())]
    InvalidDirectory { path: PathBuf },
    #[display("a sentinel row needs 3 non-identity columns, table has {count}")]
    TooFewColumns { count: usize },
    #[display("metadata value does not fit a sentinel cell")]
    MetadataOverflow,
    #[display("training file {} has no sentinel row", path.display())]
    MissingSentinel { path: PathBuf },
    #[display("sentinel row of {} is [{}], metadata expects [{}]", path.display(), actual.join(", "), expected.join(", "))]
    SentinelMismatch {
        path: PathBuf,
        expected: Vec<String>,
        actual: Vec<String>,
    },
}

impl From<FrameError> for DatasetError {
    fn from(source: FrameError) -> Self {
        Self::Frame { source }
    }
}

/// Cells of the sentinel row for a table with columns `column_names`.
pub fn sentinel_row(
    metadata: &EncodingMetadata,
    column_names: &[&str],
) -> Result<Vec<i64>, DatasetError> {
    let mut values = [
        Ok(metadata.id_space_size),
        i64::try_from(metadata.num_categorical),
        i64::try_from(metadata.num_features),
    ]
    .into_iter();
    let mut row = vec![0; column_names.len()];
    let mut filled = 0;
    for (cell, name) in row.iter_mut().zip(column_names) {
        if is_identity_column(name) {
            continue;
        }
        let Some(value) = values.next() else {
            break;
        };
        *cell = value.map_err(|_| DatasetError::MetadataOverflow)?;
        filled += 1;
    }
    if filled < SENTINEL_CELLS {
        return Err(DatasetError::TooFewColumns { count: filled });
    }
    Ok(row)
}

/// `train` with `sentinel` appended as its last row, each cell cast to the
/// type of its column.
fn with_sentinel(train: &Table, sentinel: &[i64]) -> Result<Table, DatasetError> {
    let cells = train
        .frame()
        .get_columns()
        .iter()
        .zip(sentinel)
        .map(|(column, &value)| {
            Series::new(column.name().clone(), [value])
                .cast(column.dtype())
                .map_err(FrameError::from)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(train.concat(&Table::new(cells)?)?)
}

/// Writes `tables` into `dir`, replacing any previous content.
///
/// Files are first written into a hidden sibling directory that is renamed to
/// `dir` once complete; on failure `dir` is left untouched.
pub fn save(tables: &EncodedTables, dir: &Path) -> Result<(), DatasetError> {
    let sentinel = sentinel_row(&tables.metadata, &tables.train.column_names())?;
    let staging = staging_dir(dir)?;
    remove_dir_if_exists(&staging)?;
    fs::create_dir_all(&staging).map_err(|source| io_error(&staging, source))?;

    let written = write_files(tables, &sentinel, &staging);
    if let Err(err) = written {
        discard_staging(&staging);
        return Err(err);
    }

    remove_dir_if_exists(dir)?;
    fs::rename(&staging, dir).map_err(|source| io_error(dir, source))?;
    debug!(dir = %dir.display(), "saved encoded dataset");
    Ok(())
}

/// Reads the dataset saved in `dir`, verifying and removing the sentinel row.
pub fn load(dir: &Path) -> Result<EncodedTables, DatasetError> {
    let metadata_path = dir.join(METADATA_FILE);
    let file = File::open(&metadata_path).map_err(|source| io_error(&metadata_path, source))?;
    let metadata: EncodingMetadata =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| DatasetError::Json {
            path: metadata_path.clone(),
            source,
        })?;

    let train_path = dir.join(TRAIN_FILE);
    let train = read_csv(&train_path, column_dtype)?;
    let test = read_csv(dir.join(TEST_FILE), column_dtype)?;

    let Some(last) = train.num_rows().checked_sub(1) else {
        return Err(DatasetError::MissingSentinel { path: train_path });
    };
    let expected = sentinel_row(&metadata, &train.column_names())?;
    let actual = train.row_as_floats(last)?;
    if actual != expected.iter().map(|&v| Some(as_float(v))).collect::<Vec<_>>() {
        return Err(DatasetError::SentinelMismatch {
            path: train_path,
            expected: expected.iter().map(i64::to_string).collect(),
            actual: actual
                .iter()
                .map(|v| v.map_or_else(String::new, |v| v.to_string()))
                .collect(),
        });
    }
    let rows = (0..last).collect::<Vec<_>>();
    Ok(EncodedTables {
        train: train.take_rows(&rows)?,
        test,
        metadata,
    })
}

/// Type of a column in an encoded file: integer codes for categorical and
/// identity columns, floats for everything else.
#[must_use]
pub fn column_dtype(name: &str) -> DataType {
    if is_categorical(name) || is_identity_column(name) {
        DataType::Int64
    } else {
        DataType::Float64
    }
}

fn write_files(tables: &EncodedTables, sentinel: &[i64], dir: &Path) -> Result<(), DatasetError> {
    write_csv_file(&with_sentinel(&tables.train, sentinel)?, dir.join(TRAIN_FILE))?;
    write_csv_file(&tables.test, dir.join(TEST_FILE))?;

    let metadata_path = dir.join(METADATA_FILE);
    let file = File::create(&metadata_path).map_err(|source| io_error(&metadata_path, source))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &tables.metadata).map_err(|source| {
        DatasetError::Json {
            path: metadata_path.clone(),
            source,
        }
    })?;
    writeln!(writer)
        .and_then(|()| writer.flush())
        .map_err(|source| io_error(&metadata_path, source))?;
    Ok(())
}

fn staging_dir(dir: &Path) -> Result<PathBuf, DatasetError> {
    let name = dir
        .file_name()
        .ok_or_else(|| DatasetError::InvalidDirectory {
            path: dir.to_owned(),
        })?;
    Ok(dir.with_file_name(format!(".{}.partial", name.to_string_lossy())))
}

/// Removes a staging directory after a failed save. A leftover directory is
/// removed again by the next save, so failing here only warrants a warning.
fn discard_staging(staging: &Path) {
    if let Err(err) = fs::remove_dir_all(staging) {
        warn!(dir = %staging.display(), error = %err, "failed to remove staging directory");
    }
}

#[expect(clippy::cast_precision_loss)]
fn as_float(value: i64) -> f64 {
    value as f64
}

fn remove_dir_if_exists(dir: &Path) -> Result<(), DatasetError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(io_error(dir, source)),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DatasetError {
    DatasetError::Io {
        path: path.to_owned(),
        source,
    }
}
