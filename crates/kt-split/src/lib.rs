//! Train/validation splitting of an encoded training table.
//!
//! Two policies are available:
//!
//! - [`SplitPolicy::Random`] draws validation rows uniformly at random,
//!   ignoring learners: one learner's rows may land on both sides.
//! - [`SplitPolicy::Tail`] holds out the last `N` rows of every learner, in
//!   original row order, mirroring the "predict the latest answer" task.
//!
//! [`LabeledTable::from_table`] then separates `answerCode` from the features
//! of either subset.

use std::collections::BTreeMap;

use kt_frame::{
    FrameError, Table,
    schema::{ANSWER_CODE, USER_ID},
};
use rand::{Rng as _, SeedableRng as _, seq::SliceRandom as _};
use rand_pcg::Pcg32;
use tracing::{info, warn};

/// Default share of rows used for validation by the random policy.
pub const DEFAULT_VALID_FRACTION: f64 = 0.3;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum SplitError {
    #[display("validation fraction must be in (0, 1), got {fraction}")]
    InvalidFraction { fraction: f64 },
    #[display("tail length must be at least 1")]
    EmptyTail,
    #[display("splitting {rows} rows with fraction {fraction} leaves one side empty")]
    EmptySubset { rows: usize, fraction: f64 },
    #[display("missing value in column '{column}' at row {row}")]
    MissingValue { column: String, row: usize },
    #[display("{source}")]
    Frame { source: FrameError },
}

impl From<FrameError> for SplitError {
    fn from(source: FrameError) -> Self {
        Self::Frame { source }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitPolicy {
    /// `ceil(valid_fraction * rows)` rows, drawn after shuffling, go to validation.
    Random {
        valid_fraction: f64,
        /// Seed of the shuffle; a fresh one is drawn (and logged) when `None`.
        seed: Option<u64>,
    },
    /// The last `rows_per_learner` rows of each learner go to validation.
    Tail { rows_per_learner: usize },
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self::Random {
            valid_fraction: DEFAULT_VALID_FRACTION,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainValidSplit {
    pub train: Table,
    pub valid: Table,
    /// Learners with fewer rows than the tail length. All of their rows are
    /// in `valid`. Always empty for the random policy.
    pub short_learners: Vec<i64>,
}

/// Splits `table` according to `policy`.
pub fn split(table: &Table, policy: SplitPolicy) -> Result<TrainValidSplit, SplitError> {
    match policy {
        SplitPolicy::Random {
            valid_fraction,
            seed,
        } => random_split(table, valid_fraction, seed),
        SplitPolicy::Tail { rows_per_learner } => tail_split(table, rows_per_learner),
    }
}

fn random_split(
    table: &Table,
    valid_fraction: f64,
    seed: Option<u64>,
) -> Result<TrainValidSplit, SplitError> {
    if !(valid_fraction > 0.0 && valid_fraction < 1.0) {
        return Err(SplitError::InvalidFraction {
            fraction: valid_fraction,
        });
    }
    let rows = table.num_rows();
    let num_valid = valid_size(rows, valid_fraction);
    if num_valid == 0 || num_valid >= rows {
        return Err(SplitError::EmptySubset {
            rows,
            fraction: valid_fraction,
        });
    }

    let seed = seed.unwrap_or_else(|| rand::rng().random());
    info!(seed, rows, valid = num_valid, "random split");
    let mut rng = Pcg32::seed_from_u64(seed);
    let mut order = (0..rows).collect::<Vec<_>>();
    order.shuffle(&mut rng);
    let (valid, train) = order.split_at(num_valid);
    Ok(TrainValidSplit {
        train: table.take_rows(train)?,
        valid: table.take_rows(valid)?,
        short_learners: vec![],
    })
}

#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn valid_size(rows: usize, fraction: f64) -> usize {
    (fraction * rows as f64).ceil() as usize
}

fn tail_split(table: &Table, rows_per_learner: usize) -> Result<TrainValidSplit, SplitError> {
    if rows_per_learner == 0 {
        return Err(SplitError::EmptyTail);
    }
    let learners = table
        .ints(USER_ID)?
        .iter()
        .enumerate()
        .map(|(row, user)| {
            user.ok_or_else(|| SplitError::MissingValue {
                column: USER_ID.to_owned(),
                row,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut remaining = BTreeMap::<i64, usize>::new();
    for &learner in &learners {
        *remaining.entry(learner).or_default() += 1;
    }
    let short_learners = remaining
        .iter()
        .filter(|&(_, &count)| count < rows_per_learner)
        .map(|(&learner, _)| learner)
        .collect::<Vec<_>>();
    if !short_learners.is_empty() {
        warn!(
            count = short_learners.len(),
            rows_per_learner,
            "learners with fewer rows than the tail length are held out entirely"
        );
    }

    let mut train = vec![];
    let mut valid = vec![];
    for (row, learner) in learners.iter().enumerate() {
        // Rows of this learner still to come, this one included.
        let left = remaining.get_mut(learner).map_or(0, |left| {
            let current = *left;
            *left -= 1;
            current
        });
        if left <= rows_per_learner {
            valid.push(row);
        } else {
            train.push(row);
        }
    }
    info!(
        learners = remaining.len(),
        train = train.len(),
        valid = valid.len(),
        "tail split"
    );
    Ok(TrainValidSplit {
        train: table.take_rows(&train)?,
        valid: table.take_rows(&valid)?,
        short_learners,
    })
}

/// Feature columns of a table with its `answerCode` column split off as labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTable {
    pub features: Table,
    pub labels: Vec<i64>,
}

impl LabeledTable {
    pub fn from_table(table: Table) -> Result<Self, SplitError> {
        let labels = table
            .ints(ANSWER_CODE)?
            .iter()
            .enumerate()
            .map(|(row, label)| {
                label.ok_or_else(|| SplitError::MissingValue {
                    column: ANSWER_CODE.to_owned(),
                    row,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            features: table.without_column(ANSWER_CODE)?,
            labels,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
