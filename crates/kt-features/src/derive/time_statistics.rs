//! Solve time and leakage-safe correctness statistics.
//!
//! Train and test are processed as one working table so that a learner's
//! timeline and the statistics' lookup keys are shared. Every statistic that
//! depends on `answerCode` is fit on label-bearing rows only and then mapped
//! onto all rows by key, so a withheld row can never influence a fitted value.

use std::iter;

use chrono::{Datelike as _, TimeDelta};
use kt_frame::{
    Table,
    schema::{ANSWER_CODE, ASSESSMENT_ITEM_ID, KNOWLEDGE_TAG, TEST_ID, TIMESTAMP, WITHHELD_ANSWER},
};
use kt_stats::{
    grouped::GroupedMean,
    scaler::{ScaleError, StandardScaler},
};
use polars::prelude::{NamedFrom, Series};
use tracing::debug;

use super::{
    DeriveError, FeatureDeriver, as_float,
    interaction::{INTERACTION, with_interaction},
    mark_categorical, previous_in_group, question_suffix, required, time_order, user_test_keys,
    with_constant_feature,
};

/// Seconds since the learner's previous answer in the same test.
pub const SOLVE_TIME: &str = "solve_time";
/// Mean correctness of all items sharing the row's question number.
pub const QUESTION_NUMBER_MEAN: &str = "question_number_mean";
/// Mean correctness of all answers given on the row's weekday.
pub const WEEKDAY_MEAN: &str = "weekday_mean";
/// Mean correctness of the row's item.
pub const ITEM_MEAN: &str = "item_mean";

/// Adds the interaction lag, solve time and per-question-number, per-weekday
/// and per-item correctness rates.
///
/// Both output tables are ordered by (`userID`, `Timestamp`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeStatistics;

impl TimeStatistics {
    /// Fits the statistics that [`FeatureDeriver::derive`] maps onto the rows.
    ///
    /// Withheld rows only contribute their timestamps (through the solve time
    /// of the row that follows them). Removing withheld rows that end a
    /// learner's sequence leaves the result unchanged.
    pub fn fit(&self, train: &Table, test: &Table) -> Result<FittedStatistics, DeriveError> {
        WorkingTable::new(train, test)?.fit()
    }
}

impl FeatureDeriver for TimeStatistics {
    fn name(&self) -> &'static str {
        "TimeStatistics"
    }

    fn description(&self) -> &'static str {
        "interaction lag, solve time and leakage-safe correctness rates"
    }

    fn derive(&self, train: &Table, test: &Table) -> Result<(Table, Table), DeriveError> {
        let working = WorkingTable::new(train, test)?;
        let stats = working.fit()?;
        working.apply(&stats)
    }
}

/// Statistics fit on the label-bearing rows of the working table.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedStatistics {
    question_number_mean: GroupedMean<String>,
    weekday_mean: GroupedMean<u32>,
    item_mean: GroupedMean<String>,
    solve_time_scaler: StandardScaler,
    question_number_scaler: StandardScaler,
    weekday_scaler: StandardScaler,
    item_scaler: StandardScaler,
}

impl FittedStatistics {
    /// Mean correctness keyed by the question-number suffix of the item ID.
    #[must_use]
    pub fn question_number_mean(&self) -> &GroupedMean<String> {
        &self.question_number_mean
    }

    /// Mean correctness keyed by weekday, counted from Monday = 0.
    #[must_use]
    pub fn weekday_mean(&self) -> &GroupedMean<u32> {
        &self.weekday_mean
    }

    #[must_use]
    pub fn item_mean(&self) -> &GroupedMean<String> {
        &self.item_mean
    }

    /// Scaler of each continuous output column.
    #[must_use]
    pub fn scaler(&self, column: &str) -> Option<&StandardScaler> {
        match column {
            SOLVE_TIME => Some(&self.solve_time_scaler),
            QUESTION_NUMBER_MEAN => Some(&self.question_number_scaler),
            WEEKDAY_MEAN => Some(&self.weekday_scaler),
            ITEM_MEAN => Some(&self.item_scaler),
            _ => None,
        }
    }

    fn lookup(&self, keys: &RowKeys) -> [Option<f64>; 3] {
        [
            self.question_number_mean.get(&keys.question),
            self.weekday_mean.get(&keys.weekday),
            self.item_mean.get(&keys.item),
        ]
    }
}

/// Statistic lookup keys of one row.
#[derive(Debug, Clone)]
struct RowKeys {
    question: String,
    weekday: u32,
    item: String,
}

/// Train and test stacked, with the per-row values shared by fitting and
/// mapping.
#[derive(Debug)]
struct WorkingTable {
    table: Table,
    from_train: Vec<bool>,
    solve_time: Vec<Option<f64>>,
    keys: Vec<RowKeys>,
}

impl WorkingTable {
    fn new(train: &Table, test: &Table) -> Result<Self, DeriveError> {
        let train = with_constant_feature(with_interaction(train.clone())?)?;
        let test = with_constant_feature(with_interaction(test.clone())?)?;
        let from_train = iter::repeat_n(true, train.num_rows())
            .chain(iter::repeat_n(false, test.num_rows()))
            .collect();
        let table = train.concat(&test)?;

        let solve_time = {
            let order = time_order(&table)?;
            let groups = user_test_keys(&table)?;
            let timestamps = table.timestamps(TIMESTAMP)?;
            let previous = previous_in_group(&order, |row| groups[row], |row| timestamps[row]);
            timestamps
                .iter()
                .zip(previous)
                .map(|(now, previous)| Some(seconds((*now)? - previous?)))
                .collect()
        };

        let items = table.strs(ASSESSMENT_ITEM_ID)?;
        let timestamps = table.timestamps(TIMESTAMP)?;
        let keys = items
            .into_iter()
            .zip(timestamps)
            .enumerate()
            .map(|(row, (item, timestamp))| {
                let item = required(item, ASSESSMENT_ITEM_ID, row)?;
                let timestamp = required(timestamp, TIMESTAMP, row)?;
                Ok(RowKeys {
                    question: question_suffix(item)?.to_owned(),
                    weekday: timestamp.weekday().num_days_from_monday(),
                    item: item.to_owned(),
                })
            })
            .collect::<Result<Vec<_>, DeriveError>>()?;

        Ok(Self {
            table,
            from_train,
            solve_time,
            keys,
        })
    }

    /// `(row, correctness)` of every row whose answer is not withheld.
    fn labeled_rows(&self) -> Result<Vec<(usize, f64)>, DeriveError> {
        Ok(self
            .table
            .ints(ANSWER_CODE)?
            .iter()
            .enumerate()
            .filter_map(|(row, answer)| {
                answer
                    .filter(|&answer| answer != WITHHELD_ANSWER)
                    .map(|answer| (row, as_float(answer)))
            })
            .collect())
    }

    fn fit(&self) -> Result<FittedStatistics, DeriveError> {
        let labeled = self.labeled_rows()?;
        debug!(
            labeled = labeled.len(),
            withheld = self.table.num_rows() - labeled.len(),
            "fitting time statistics"
        );
        let question_number_mean = GroupedMean::from_pairs(
            labeled
                .iter()
                .map(|&(row, correct)| (self.keys[row].question.clone(), correct)),
        );
        let weekday_mean = GroupedMean::from_pairs(
            labeled
                .iter()
                .map(|&(row, correct)| (self.keys[row].weekday, correct)),
        );
        let item_mean = GroupedMean::from_pairs(
            labeled
                .iter()
                .map(|&(row, correct)| (self.keys[row].item.clone(), correct)),
        );
        debug!(
            question_numbers = question_number_mean.len(),
            weekdays = weekday_mean.len(),
            items = item_mean.len(),
            "fitted correctness rates"
        );

        // Every (learner, test) group may hold a single row, leaving no solve
        // time to fit on.
        let solve_time_scaler = StandardScaler::fit_or_identity(
            labeled.iter().filter_map(|&(row, _)| self.solve_time[row]),
        )
        .map_err(|source| scale_error(SOLVE_TIME, source))?;
        let question_number_scaler = fit_scaler(
            QUESTION_NUMBER_MEAN,
            labeled
                .iter()
                .filter_map(|&(row, _)| question_number_mean.get(&self.keys[row].question)),
        )?;
        let weekday_scaler = fit_scaler(
            WEEKDAY_MEAN,
            labeled
                .iter()
                .filter_map(|&(row, _)| weekday_mean.get(&self.keys[row].weekday)),
        )?;
        let item_scaler = fit_scaler(
            ITEM_MEAN,
            labeled
                .iter()
                .filter_map(|&(row, _)| item_mean.get(&self.keys[row].item)),
        )?;

        Ok(FittedStatistics {
            question_number_mean,
            weekday_mean,
            item_mean,
            solve_time_scaler,
            question_number_scaler,
            weekday_scaler,
            item_scaler,
        })
    }

    /// Maps `stats` onto every row, then splits the working table back into
    /// train and test by origin.
    fn apply(self, stats: &FittedStatistics) -> Result<(Table, Table), DeriveError> {
        let mut solve_time = Vec::with_capacity(self.keys.len());
        let mut question_number = Vec::with_capacity(self.keys.len());
        let mut weekday = Vec::with_capacity(self.keys.len());
        let mut item = Vec::with_capacity(self.keys.len());
        for (keys, &solved) in self.keys.iter().zip(&self.solve_time) {
            let [q, w, i] = stats.lookup(keys);
            solve_time.push(stats.solve_time_scaler.transform_or_mean(solved));
            question_number.push(stats.question_number_scaler.transform_or_mean(q));
            weekday.push(stats.weekday_scaler.transform_or_mean(w));
            item.push(stats.item_scaler.transform_or_mean(i));
        }

        let table = self
            .table
            .with_column(Series::new(SOLVE_TIME.into(), solve_time))?
            .with_column(Series::new(QUESTION_NUMBER_MEAN.into(), question_number))?
            .with_column(Series::new(WEEKDAY_MEAN.into(), weekday))?
            .with_column(Series::new(ITEM_MEAN.into(), item))?;

        let order = time_order(&table)?;
        let (train_rows, test_rows): (Vec<usize>, Vec<usize>) =
            order.into_iter().partition(|&row| self.from_train[row]);
        let categorical = [ASSESSMENT_ITEM_ID, TEST_ID, KNOWLEDGE_TAG, INTERACTION];
        Ok((
            mark_categorical(table.take_rows(&train_rows)?, &categorical)?,
            mark_categorical(table.take_rows(&test_rows)?, &categorical)?,
        ))
    }
}

#[expect(clippy::cast_precision_loss)]
fn seconds(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 1000.0
}

fn fit_scaler<I>(column: &str, values: I) -> Result<StandardScaler, DeriveError>
where
    I: IntoIterator<Item = f64>,
{
    StandardScaler::fit(values).map_err(|source| scale_error(column, source))
}

fn scale_error(column: &str, source: ScaleError) -> DeriveError {
    DeriveError::Scale {
        column: column.to_owned(),
        source,
    }
}
