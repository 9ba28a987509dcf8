//! Shared-vocabulary ordinal encoding of categorical columns
//!
//! Every column whose name ends with [`CATEGORICAL_SUFFIX`] is mapped onto one
//! integer ID space shared by all categorical columns, so that a single
//! embedding table can index every categorical input of the model.
//!
//! # Code Layout
//!
//! ```text
//! 0                   missing or unseen value, in every column
//! 1 ..= n1            first categorical column (n1 distinct training values)
//! n1+1 ..= n1+n2      second categorical column
//! ...
//! ```
//!
//! Columns are laid out in table column order. Within a column, values are
//! numbered in ascending value order, so the codes depend only on the set of
//! training values and never on row order.
//!
//! Vocabularies are fit on the training table only. A test value that never
//! occurs in training encodes to `0`, exactly like a missing cell.
//!
//! # Metadata
//!
//! [`EncodingMetadata`] describes the resulting layout (ID-space size, number of
//! categorical and continuous feature columns). It is returned alongside the
//! encoded tables; [`crate::dataset`] also writes it as the trailing sentinel
//! row of the persisted training file.

use std::collections::{BTreeMap, BTreeSet};

use kt_frame::{
    FrameError, Table,
    schema::{ANSWER_CODE, USER_ID, is_identity_column},
};
use polars::prelude::{DataType, FillNullStrategy, NamedFrom, Series};
use serde::{Deserialize, Serialize};

/// Column-name suffix marking a categorical column.
pub const CATEGORICAL_SUFFIX: &str = "_c";

/// Code of missing and unseen categorical values.
pub const MISSING_CODE: i64 = 0;

#[must_use]
pub fn is_categorical(name: &str) -> bool {
    name.ends_with(CATEGORICAL_SUFFIX)
}

/// Appends the categorical marker to `name`.
#[must_use]
pub fn categorical_name(name: &str) -> String {
    format!("{name}{CATEGORICAL_SUFFIX}")
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum EncodeError {
    #[display("cannot fit categorical vocabularies on an empty training table")]
    EmptyTrainingTable,
    #[display("column '{name}' is not categorical and not numeric ({dtype})")]
    NonNumericColumn { name: String, dtype: DataType },
    #[display("categorical column '{name}' has unsupported type {dtype}")]
    UnsupportedCategorical { name: String, dtype: DataType },
    #[display("column '{name}' holds non-integral value {value}")]
    NonIntegral { name: String, value: f64 },
    #[display("column '{name}' has type {actual}, fitted as {expected}")]
    KindMismatch {
        name: String,
        expected: DataType,
        actual: DataType,
    },
    #[display("columns [{}] do not match fitted columns [{}]", actual.join(", "), expected.join(", "))]
    ColumnMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    #[display("{source}")]
    Frame { source: FrameError },
}

impl From<FrameError> for EncodeError {
    fn from(source: FrameError) -> Self {
        Self::Frame { source }
    }
}

/// Layout of an encoded table pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingMetadata {
    /// Number of categorical codes including the reserved `0`.
    pub id_space_size: i64,
    /// Number of categorical columns.
    pub num_categorical: usize,
    /// Number of non-categorical feature columns (`userID` and `answerCode` excluded).
    pub num_features: usize,
}

/// Encoded train/test pair sharing one categorical ID space.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedTables {
    pub train: Table,
    pub test: Table,
    pub metadata: EncodingMetadata,
}

/// A categorical value. Integer values sort before text values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CategoryKey {
    Int(i64),
    Str(String),
}

/// Category key of every cell of the categorical column `name`.
fn category_keys(table: &Table, name: &str) -> Result<Vec<Option<CategoryKey>>, EncodeError> {
    match table.dtype(name)? {
        DataType::Int64 => Ok(table
            .ints(name)?
            .into_iter()
            .map(|v| v.map(CategoryKey::Int))
            .collect()),
        DataType::String => Ok(table
            .strs(name)?
            .into_iter()
            .map(|v| v.map(|v| CategoryKey::Str(v.to_owned())))
            .collect()),
        dtype => Err(EncodeError::UnsupportedCategorical {
            name: name.to_owned(),
            dtype: dtype.clone(),
        }),
    }
}

/// Codes of one categorical column, already shifted into the shared ID space.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnVocabulary {
    column: String,
    dtype: DataType,
    offset: i64,
    codes: BTreeMap<CategoryKey, i64>,
}

impl ColumnVocabulary {
    fn fit(table: &Table, name: &str, offset: i64) -> Result<Self, EncodeError> {
        let keys = category_keys(table, name)?
            .into_iter()
            .flatten()
            .collect::<BTreeSet<_>>();
        let codes = keys.into_iter().zip(1..).collect();
        Ok(Self {
            column: name.to_owned(),
            dtype: table.dtype(name)?.clone(),
            offset,
            codes,
        })
    }

    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Number of distinct training values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Largest code of all columns laid out before this one.
    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Largest code assigned to this column (equal to the offset if the column
    /// had no training values).
    #[must_use]
    pub fn max_code(&self) -> i64 {
        self.offset + self.codes.values().max().copied().unwrap_or(0)
    }

    /// Code of `key` in the shared ID space; missing and unseen keys are `0`.
    #[must_use]
    pub fn encode(&self, key: Option<&CategoryKey>) -> i64 {
        key.and_then(|key| self.codes.get(key))
            .map_or(MISSING_CODE, |code| self.offset + code)
    }

    fn encode_column(&self, table: &Table) -> Result<Series, EncodeError> {
        let dtype = table.dtype(&self.column)?;
        if *dtype != self.dtype {
            return Err(EncodeError::KindMismatch {
                name: self.column.clone(),
                expected: self.dtype.clone(),
                actual: dtype.clone(),
            });
        }
        let codes = category_keys(table, &self.column)?
            .iter()
            .map(|key| self.encode(key.as_ref()))
            .collect::<Vec<_>>();
        Ok(Series::new(self.column.as_str().into(), codes))
    }
}

/// Ordinal encoder fit on a training table.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalEncoder {
    columns: Vec<(String, DataType)>,
    vocabularies: Vec<ColumnVocabulary>,
}

impl CategoricalEncoder {
    /// Fits one vocabulary per categorical column of `train`, in column order,
    /// each offset past the codes of the previous ones.
    ///
    /// Non-categorical columns must be numeric, and `userID` / `answerCode`
    /// must be present.
    pub fn fit(train: &Table) -> Result<Self, EncodeError> {
        if train.is_empty() {
            return Err(EncodeError::EmptyTrainingTable);
        }
        train.series(USER_ID)?;
        train.series(ANSWER_CODE)?;

        let mut offset = 0;
        let mut columns = vec![];
        let mut vocabularies = vec![];
        for name in train.column_names() {
            let dtype = train.dtype(name)?;
            if is_categorical(name) {
                let vocabulary = ColumnVocabulary::fit(train, name, offset)?;
                tracing::debug!(
                    column = name,
                    categories = vocabulary.len(),
                    offset,
                    "fitted categorical vocabulary"
                );
                offset = vocabulary.max_code();
                vocabularies.push(vocabulary);
            } else if !is_numeric(dtype) {
                return Err(EncodeError::NonNumericColumn {
                    name: name.to_owned(),
                    dtype: dtype.clone(),
                });
            }
            columns.push((name.to_owned(), dtype.clone()));
        }

        Ok(Self {
            columns,
            vocabularies,
        })
    }

    #[must_use]
    pub fn vocabularies(&self) -> &[ColumnVocabulary] {
        &self.vocabularies
    }

    #[must_use]
    pub fn vocabulary(&self, column: &str) -> Option<&ColumnVocabulary> {
        self.vocabularies.iter().find(|v| v.column == column)
    }

    #[must_use]
    pub fn metadata(&self) -> EncodingMetadata {
        let max_code = self
            .vocabularies
            .last()
            .map_or(MISSING_CODE, ColumnVocabulary::max_code);
        let num_features = self
            .columns
            .iter()
            .filter(|(name, _)| !is_categorical(name) && !is_identity_column(name))
            .count();
        EncodingMetadata {
            id_space_size: max_code + 1,
            num_categorical: self.vocabularies.len(),
            num_features,
        }
    }

    /// Encodes `table`, which must carry exactly the fitted columns (in any
    /// order). The result has the fitted column order and no missing cells:
    /// categorical columns, `userID` and `answerCode` are integer codes, other
    /// numeric columns have their missing cells set to zero.
    pub fn transform(&self, table: &Table) -> Result<Table, EncodeError> {
        self.check_columns(table)?;
        let columns = self
            .columns
            .iter()
            .map(|(name, dtype)| {
                if let Some(vocabulary) = self.vocabulary(name) {
                    return vocabulary.encode_column(table);
                }
                let series = table.series(name)?;
                if series.dtype() != dtype {
                    return Err(EncodeError::KindMismatch {
                        name: name.clone(),
                        expected: dtype.clone(),
                        actual: series.dtype().clone(),
                    });
                }
                if is_identity_column(name) {
                    to_integer(table, name)
                } else {
                    fill_missing_with_zero(series)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Table::new(columns)?)
    }

    /// Fits on `train` and encodes both tables into one ID space.
    pub fn fit_transform(train: &Table, test: &Table) -> Result<EncodedTables, EncodeError> {
        let encoder = Self::fit(train)?;
        Ok(EncodedTables {
            train: encoder.transform(train)?,
            test: encoder.transform(test)?,
            metadata: encoder.metadata(),
        })
    }

    fn check_columns(&self, table: &Table) -> Result<(), EncodeError> {
        let expected = self
            .columns
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<BTreeSet<_>>();
        let actual = table.column_names().into_iter().collect::<BTreeSet<_>>();
        if expected == actual && actual.len() == table.num_columns() {
            return Ok(());
        }
        Err(EncodeError::ColumnMismatch {
            expected: expected.into_iter().map(str::to_owned).collect(),
            actual: actual.into_iter().map(str::to_owned).collect(),
        })
    }
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Int64 | DataType::Float64)
}

/// Identity column as integers, missing cells set to zero.
fn to_integer(table: &Table, name: &str) -> Result<Series, EncodeError> {
    let values = match table.dtype(name)? {
        DataType::Int64 => table
            .ints(name)?
            .into_iter()
            .map(|v| v.unwrap_or(0))
            .collect::<Vec<_>>(),
        DataType::Float64 => table
            .floats(name)?
            .into_iter()
            .map(|v| float_to_integer(name, v.unwrap_or(0.0)))
            .collect::<Result<Vec<_>, _>>()?,
        dtype => {
            return Err(EncodeError::NonNumericColumn {
                name: name.to_owned(),
                dtype: dtype.clone(),
            });
        }
    };
    Ok(Series::new(name.into(), values))
}

#[expect(clippy::cast_possible_truncation)]
fn float_to_integer(name: &str, value: f64) -> Result<i64, EncodeError> {
    if value.is_finite() && value.fract() == 0.0 {
        Ok(value as i64)
    } else {
        Err(EncodeError::NonIntegral {
            name: name.to_owned(),
            value,
        })
    }
}

fn fill_missing_with_zero(series: &Series) -> Result<Series, EncodeError> {
    series
        .fill_null(FillNullStrategy::Zero)
        .map_err(|source| FrameError::from(source).into())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn series<T>(name: &str, values: &[T]) -> Series
    where
        Series: NamedFrom<Vec<T>, [T]>,
        T: Clone,
    {
        Series::new(name.into(), values.to_vec())
    }

    /// `a_c` has 5 distinct training values, `b_c` has 3, both contain a gap.
    fn train_table() -> Table {
        Table::new(vec![
            series(USER_ID, &[Some(1i64), Some(1), Some(2), Some(2), Some(3), Some(3)]),
            series(
                "a_c",
                &[Some("v"), Some("w"), Some("x"), Some("y"), Some("z"), None],
            ),
            series(ANSWER_CODE, &[Some(1i64), Some(0), Some(1), Some(1), Some(0), Some(1)]),
            series("b_c", &[Some(30i64), Some(10), None, Some(20), Some(10), Some(30)]),
            series(
                "elapsed",
                &[Some(0.5), None, Some(1.5), Some(2.0), Some(0.0), Some(1.0)],
            ),
        ])
        .unwrap()
    }

    fn test_table() -> Table {
        Table::new(vec![
            series(USER_ID, &[Some(9i64), Some(9)]),
            series("a_c", &[Some("w"), Some("unseen")]),
            series(ANSWER_CODE, &[Some(1i64), Some(-1)]),
            series("b_c", &[Some(99i64), None]),
            series("elapsed", &[None, Some(3.0)]),
        ])
        .unwrap()
    }

    fn codes(table: &Table, column: &str) -> Vec<i64> {
        table.ints(column).unwrap().iter().map(|v| v.unwrap()).collect()
    }

    #[test]
    fn test_offset_places_columns_back_to_back() {
        let encoded = CategoricalEncoder::fit_transform(&train_table(), &test_table()).unwrap();

        let a = codes(&encoded.train, "a_c");
        let b = codes(&encoded.train, "b_c");
        assert_eq!(a, vec![1, 2, 3, 4, 5, 0]);
        assert!(a.iter().all(|c| (0..=5).contains(c)));
        // 10 -> 6, 20 -> 7, 30 -> 8
        assert_eq!(b, vec![8, 6, 0, 7, 6, 8]);
        assert!(b.iter().filter(|&&c| c != 0).all(|c| (6..=9).contains(c)));
    }

    #[test]
    fn test_shared_id_space_is_contiguous_and_disjoint() {
        let encoder = CategoricalEncoder::fit(&train_table()).unwrap();
        let mut seen = HashSet::new();
        let mut all = vec![];
        for vocabulary in encoder.vocabularies() {
            let range = (vocabulary.offset() + 1)..=vocabulary.max_code();
            for code in range {
                assert!(seen.insert(code), "code {code} assigned twice");
                all.push(code);
            }
        }
        all.sort_unstable();
        let expected = (1..=8).collect::<Vec<_>>();
        assert_eq!(all, expected);
        assert_eq!(encoder.metadata().id_space_size, 9);
    }

    #[test]
    fn test_missing_and_unseen_encode_to_zero() {
        let encoded = CategoricalEncoder::fit_transform(&train_table(), &test_table()).unwrap();
        assert_eq!(codes(&encoded.test, "a_c"), vec![2, MISSING_CODE]);
        assert_eq!(codes(&encoded.test, "b_c"), vec![MISSING_CODE, MISSING_CODE]);
        assert_eq!(codes(&encoded.train, "a_c")[5], MISSING_CODE);
        assert_eq!(codes(&encoded.train, "b_c")[2], MISSING_CODE);
    }

    #[test]
    fn test_identity_and_numeric_columns() {
        let encoded = CategoricalEncoder::fit_transform(&train_table(), &test_table()).unwrap();
        assert_eq!(codes(&encoded.test, ANSWER_CODE), vec![1, -1]);
        assert_eq!(codes(&encoded.test, USER_ID), vec![9, 9]);
        assert_eq!(
            encoded.train.floats("elapsed").unwrap(),
            &[Some(0.5), Some(0.0), Some(1.5), Some(2.0), Some(0.0), Some(1.0)]
        );
        assert_eq!(encoded.test.floats("elapsed").unwrap(), &[Some(0.0), Some(3.0)]);
    }

    #[test]
    fn test_metadata() {
        let encoded = CategoricalEncoder::fit_transform(&train_table(), &test_table()).unwrap();
        assert_eq!(
            encoded.metadata,
            EncodingMetadata {
                id_space_size: 9,
                num_categorical: 2,
                num_features: 1,
            }
        );
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let first = CategoricalEncoder::fit_transform(&train_table(), &test_table()).unwrap();
        let second = CategoricalEncoder::fit_transform(&train_table(), &test_table()).unwrap();
        assert_eq!(first, second);

        // Row order of the training table does not change the vocabulary.
        let reversed = train_table().take_rows(&[5, 4, 3, 2, 1, 0]).unwrap();
        assert_eq!(
            CategoricalEncoder::fit(&reversed).unwrap(),
            CategoricalEncoder::fit(&train_table()).unwrap()
        );
    }

    #[test]
    fn test_test_columns_may_be_reordered() {
        let source = test_table();
        let test = Table::new(
            ["b_c", USER_ID, "elapsed", ANSWER_CODE, "a_c"]
                .iter()
                .map(|name| source.series(name).unwrap().clone())
                .collect(),
        )
        .unwrap();
        let encoder = CategoricalEncoder::fit(&train_table()).unwrap();
        let encoded = encoder.transform(&test).unwrap();
        assert_eq!(
            encoded.column_names(),
            vec![USER_ID, "a_c", ANSWER_CODE, "b_c", "elapsed"]
        );
    }

    #[test]
    fn test_category_keys_order_ints_before_text() {
        assert!(CategoryKey::Int(99) < CategoryKey::Str("0".to_owned()));
        assert!(CategoryKey::Str("a".to_owned()) < CategoryKey::Str("b".to_owned()));

        let float_categorical = train_table()
            .with_column(series("c_c", &[Some(0.5); 6]))
            .unwrap();
        assert!(matches!(
            CategoricalEncoder::fit(&float_categorical),
            Err(EncodeError::UnsupportedCategorical { .. })
        ));
    }

    #[test]
    fn test_empty_training_table_fails() {
        let empty = train_table().take_rows(&[]).unwrap();
        assert!(matches!(
            CategoricalEncoder::fit(&empty),
            Err(EncodeError::EmptyTrainingTable)
        ));
    }

    #[test]
    fn test_schema_errors() {
        let with_text = train_table()
            .with_column(series::<Option<&str>>("note", &[None; 6]))
            .unwrap();
        assert!(matches!(
            CategoricalEncoder::fit(&with_text),
            Err(EncodeError::NonNumericColumn { .. })
        ));

        let encoder = CategoricalEncoder::fit(&train_table()).unwrap();
        let narrow = test_table().without_column("elapsed").unwrap();
        assert!(matches!(
            encoder.transform(&narrow),
            Err(EncodeError::ColumnMismatch { .. })
        ));

        let no_user = train_table().without_column(USER_ID).unwrap();
        assert!(matches!(
            CategoricalEncoder::fit(&no_user),
            Err(EncodeError::Frame { .. })
        ));
    }
}
