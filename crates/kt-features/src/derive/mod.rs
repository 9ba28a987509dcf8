//! Feature derivation strategies
//!
//! A [`FeatureDeriver`] turns the raw `(train, test)` event tables into a
//! derived pair with additional feature columns. Each [`Variant`] names one
//! self-contained strategy; variants are selected per run and never composed
//! automatically.
//!
//! # Contract
//!
//! Every deriver returns tables that:
//!
//! - still contain `Timestamp` (the pipeline drops it after derivation),
//! - keep `userID` and `answerCode` unchanged, including every withheld
//!   (`answerCode = -1`) test row,
//! - hold `None` in new categorical columns where a value is undefined,
//! - hold no missing cell in new continuous columns (they are imputed),
//! - mark every categorical column with the `_c` suffix.
//!
//! # Variants
//!
//! | Variant                         | Added features                                              |
//! |---------------------------------|-------------------------------------------------------------|
//! | [`Variant::InteractionLag`]     | previous correctness in the same test (categorical)         |
//! | [`Variant::MaxQuestionIndex`]   | question number and per-test maximum (z-normalized)         |
//! | [`Variant::MaxQuestionIndexCategorical`] | question number and per-test maximum (categorical) |
//! | [`Variant::Combined`]           | interaction lag + normalized question index                 |
//! | [`Variant::CombinedRaw`]        | interaction lag + unnormalized question index               |
//! | [`Variant::TimeStatistics`]     | solve time and leakage-safe correctness rates               |

use std::{collections::HashMap, fmt, hash::Hash};

use kt_frame::{
    FrameError, Table,
    schema::{ANSWER_CODE, TEST_ID, TIMESTAMP, USER_ID},
};
use kt_stats::scaler::ScaleError;
use polars::prelude::{NamedFrom, Series};

use crate::encoding::categorical_name;

pub use self::{
    combined::Combined,
    interaction::{INTERACTION, InteractionLag},
    question_index::{
        MAX_QUESTION_NUMBER, MaxQuestionIndex, MaxQuestionIndexCategorical, QUESTION_NUMBER,
    },
    time_statistics::{
        FittedStatistics, ITEM_MEAN, QUESTION_NUMBER_MEAN, SOLVE_TIME, TimeStatistics,
        WEEKDAY_MEAN,
    },
};

mod combined;
mod interaction;
mod question_index;
mod time_statistics;

/// Constant continuous feature added by variants that would otherwise carry
/// no continuous input.
pub const CONSTANT_FEATURE: &str = "constant";

/// Number of trailing digits of an assessment item ID holding the question number.
pub const QUESTION_NUMBER_WIDTH: usize = 3;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum DeriveError {
    #[display("assessment item ID '{item_id}' does not end with a 3-digit question number")]
    InvalidItemId { item_id: String },
    #[display("missing value in required column '{column}' at row {row}")]
    MissingValue { column: String, row: usize },
    #[display("failed to normalize column '{column}'")]
    Scale { column: String, source: ScaleError },
    #[display("{source}")]
    Frame { source: FrameError },
}

impl From<FrameError> for DeriveError {
    fn from(source: FrameError) -> Self {
        Self::Frame { source }
    }
}

/// A feature-set strategy.
pub trait FeatureDeriver: fmt::Debug + Send + Sync {
    /// Stable name, also used as the output directory name.
    fn name(&self) -> &'static str;

    /// One-line human description of the added features.
    fn description(&self) -> &'static str;

    /// Derives feature columns for both tables.
    fn derive(&self, train: &Table, test: &Table) -> Result<(Table, Table), DeriveError>;
}

pub type BoxedFeatureDeriver = Box<dyn FeatureDeriver>;

/// Closed set of feature-set strategies selectable at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::FromStr)]
pub enum Variant {
    InteractionLag,
    MaxQuestionIndex,
    MaxQuestionIndexCategorical,
    Combined,
    CombinedRaw,
    TimeStatistics,
}

impl Variant {
    pub const ALL: [Self; 6] = [
        Self::InteractionLag,
        Self::MaxQuestionIndex,
        Self::MaxQuestionIndexCategorical,
        Self::Combined,
        Self::CombinedRaw,
        Self::TimeStatistics,
    ];

    #[must_use]
    pub fn deriver(self) -> BoxedFeatureDeriver {
        match self {
            Self::InteractionLag => Box::new(InteractionLag),
            Self::MaxQuestionIndex => Box::new(MaxQuestionIndex),
            Self::MaxQuestionIndexCategorical => Box::new(MaxQuestionIndexCategorical),
            Self::Combined => Box::new(Combined::normalized()),
            Self::CombinedRaw => Box::new(Combined::raw()),
            Self::TimeStatistics => Box::new(TimeStatistics),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::InteractionLag => "InteractionLag",
            Self::MaxQuestionIndex => "MaxQuestionIndex",
            Self::MaxQuestionIndexCategorical => "MaxQuestionIndexCategorical",
            Self::Combined => "Combined",
            Self::CombinedRaw => "CombinedRaw",
            Self::TimeStatistics => "TimeStatistics",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Row indices of `table` stably sorted by (`userID`, `Timestamp`).
pub(crate) fn time_order(table: &Table) -> Result<Vec<usize>, DeriveError> {
    Ok(table.sorted_order(&[USER_ID, TIMESTAMP])?)
}

/// (`userID`, `testId`) of every row.
pub(crate) fn user_test_keys(table: &Table) -> Result<Vec<(Option<i64>, Option<&str>)>, DeriveError> {
    let users = table.ints(USER_ID)?;
    let tests = table.strs(TEST_ID)?;
    Ok(users.into_iter().zip(tests).collect())
}

/// For each row, the value of the row visited just before it in `order` that
/// shares its group key. The first row of each group gets `None`.
///
/// `order` must be a permutation of all row indices.
pub(crate) fn previous_in_group<K, T>(
    order: &[usize],
    key: impl Fn(usize) -> K,
    value: impl Fn(usize) -> Option<T>,
) -> Vec<Option<T>>
where
    K: Eq + Hash,
{
    let mut last_seen = HashMap::new();
    let mut previous = (0..order.len()).map(|_| None).collect::<Vec<_>>();
    for &row in order {
        previous[row] = last_seen.insert(key(row), value(row)).flatten();
    }
    previous
}

/// Trailing question-number digits of an assessment item ID.
pub(crate) fn question_suffix(item_id: &str) -> Result<&str, DeriveError> {
    let invalid = || DeriveError::InvalidItemId {
        item_id: item_id.to_owned(),
    };
    let start = item_id
        .len()
        .checked_sub(QUESTION_NUMBER_WIDTH)
        .ok_or_else(invalid)?;
    let suffix = item_id.get(start..).ok_or_else(invalid)?;
    if suffix.bytes().all(|b| b.is_ascii_digit()) {
        Ok(suffix)
    } else {
        Err(invalid())
    }
}

pub(crate) fn question_number(item_id: &str) -> Result<i64, DeriveError> {
    question_suffix(item_id)?
        .parse()
        .map_err(|_| DeriveError::InvalidItemId {
            item_id: item_id.to_owned(),
        })
}

#[expect(clippy::cast_precision_loss)]
pub(crate) fn as_float(value: i64) -> f64 {
    value as f64
}

/// Value of a required cell, or [`DeriveError::MissingValue`].
pub(crate) fn required<T>(value: Option<T>, column: &str, row: usize) -> Result<T, DeriveError> {
    value.ok_or_else(|| DeriveError::MissingValue {
        column: column.to_owned(),
        row,
    })
}

pub(crate) fn with_constant_feature(table: Table) -> Result<Table, DeriveError> {
    let n = table.num_rows();
    Ok(table.with_column(Series::new(CONSTANT_FEATURE.into(), vec![1.0; n]))?)
}

/// Appends the categorical suffix to each of `columns`.
pub(crate) fn mark_categorical(table: Table, columns: &[&str]) -> Result<Table, DeriveError> {
    let renamed = columns
        .iter()
        .map(|&name| (name, categorical_name(name)))
        .collect::<Vec<_>>();
    let renames = renamed
        .iter()
        .map(|(from, to)| (*from, to.as_str()))
        .collect::<Vec<_>>();
    Ok(table.renamed(&renames)?)
}

/// Applies `f` to both tables.
pub(crate) fn both<F>(train: Table, test: Table, f: F) -> Result<(Table, Table), DeriveError>
where
    F: Fn(Table) -> Result<Table, DeriveError>,
{
    Ok((f(train)?, f(test)?))
}

#[cfg(test)]
pub(crate) mod test_util {
    use chrono::NaiveDateTime;
    use kt_frame::{Table, schema::*, timestamp_series};
    use polars::prelude::{NamedFrom, Series};

    /// One raw event: (user, item, answer, timestamp).
    pub(crate) type Event<'a> = (i64, &'a str, i64, &'a str);

    /// Builds a raw table; the test ID is derived from the item ID, the tag
    /// from the question number.
    pub(crate) fn raw_table(events: &[Event<'_>]) -> Table {
        let ts = |s: &str| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap();
        let users = events.iter().map(|e| e.0).collect::<Vec<_>>();
        let items = events.iter().map(|e| e.1).collect::<Vec<_>>();
        let tests = events
            .iter()
            .map(|e| format!("{}000{}", &e.1[..4], &e.1[4..7]))
            .collect::<Vec<_>>();
        let answers = events.iter().map(|e| e.2).collect::<Vec<_>>();
        let times = events.iter().map(|e| Some(ts(e.3))).collect::<Vec<_>>();
        let tags = events
            .iter()
            .map(|e| e.1[7..].parse::<i64>().unwrap() + 1000)
            .collect::<Vec<_>>();
        Table::new(vec![
            Series::new(USER_ID.into(), users),
            Series::new(ASSESSMENT_ITEM_ID.into(), items),
            Series::new(TEST_ID.into(), tests),
            Series::new(ANSWER_CODE.into(), answers),
            timestamp_series(TIMESTAMP, &times).unwrap(),
            Series::new(KNOWLEDGE_TAG.into(), tags),
        ])
        .unwrap()
    }
}
