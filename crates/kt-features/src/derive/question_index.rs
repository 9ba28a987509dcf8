use std::collections::HashMap;

use kt_frame::{
    Table,
    schema::{ASSESSMENT_ITEM_ID, KNOWLEDGE_TAG, TEST_ID},
};
use kt_stats::scaler::StandardScaler;
use polars::prelude::{NamedFrom, Series};

use super::{
    DeriveError, FeatureDeriver, as_float, mark_categorical, question_number, required,
    with_constant_feature,
};

/// Position of an item within its test, parsed from the item ID.
pub const QUESTION_NUMBER: &str = "question_number";
/// Largest question number of the row's test.
pub const MAX_QUESTION_NUMBER: &str = "max_question_number";

/// Adds the question number and the test's maximum question number as
/// z-normalized continuous features. The item ID column is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxQuestionIndex;

impl FeatureDeriver for MaxQuestionIndex {
    fn name(&self) -> &'static str {
        "MaxQuestionIndex"
    }

    fn description(&self) -> &'static str {
        "question number and per-test maximum question number, z-normalized"
    }

    fn derive(&self, train: &Table, test: &Table) -> Result<(Table, Table), DeriveError> {
        let (train, test) =
            with_question_index(train.clone(), test.clone(), QuestionIndexScaling::Normalized)?;
        let categorical = [TEST_ID, KNOWLEDGE_TAG];
        Ok((
            mark_categorical(train, &categorical)?,
            mark_categorical(test, &categorical)?,
        ))
    }
}

/// Like [`MaxQuestionIndex`], but emits both question-index features as
/// categorical columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxQuestionIndexCategorical;

impl FeatureDeriver for MaxQuestionIndexCategorical {
    fn name(&self) -> &'static str {
        "MaxQuestionIndexCategorical"
    }

    fn description(&self) -> &'static str {
        "question number and per-test maximum question number as categorical features"
    }

    fn derive(&self, train: &Table, test: &Table) -> Result<(Table, Table), DeriveError> {
        let (train, test) =
            with_question_index(train.clone(), test.clone(), QuestionIndexScaling::Categorical)?;
        let categorical = [TEST_ID, KNOWLEDGE_TAG, QUESTION_NUMBER, MAX_QUESTION_NUMBER];
        Ok((
            mark_categorical(with_constant_feature(train)?, &categorical)?,
            mark_categorical(with_constant_feature(test)?, &categorical)?,
        ))
    }
}

/// How the question-index columns are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QuestionIndexScaling {
    /// Float columns standardized with statistics fit on the training table.
    Normalized,
    /// Float columns holding the raw numbers.
    Raw,
    /// Integer columns, to be marked categorical by the caller.
    Categorical,
}

/// Appends [`QUESTION_NUMBER`] and [`MAX_QUESTION_NUMBER`] to both tables and
/// drops the item ID column.
///
/// The per-test maximum is taken over the training rows. A test that never
/// occurs in training falls back to its maximum over the test rows.
pub(crate) fn with_question_index(
    train: Table,
    test: Table,
    scaling: QuestionIndexScaling,
) -> Result<(Table, Table), DeriveError> {
    let train_index = QuestionIndex::of(&train)?;
    let test_index = QuestionIndex::of(&test)?;

    let train_max = train_index.max_by_test();
    let mut test_max = test_index.max_by_test();
    test_max.extend(&train_max);
    let train_maxima = train_index.maxima(&train_max);
    let test_maxima = test_index.maxima(&test_max);

    let (train_columns, test_columns) = match scaling {
        QuestionIndexScaling::Categorical => (
            [ints(&train_index.numbers), ints(&train_maxima)],
            [ints(&test_index.numbers), ints(&test_maxima)],
        ),
        QuestionIndexScaling::Raw => (
            [raw(&train_index.numbers), raw(&train_maxima)],
            [raw(&test_index.numbers), raw(&test_maxima)],
        ),
        QuestionIndexScaling::Normalized => {
            let number_scaler = fit_scaler(QUESTION_NUMBER, &train_index.numbers)?;
            let max_scaler = fit_scaler(MAX_QUESTION_NUMBER, &train_maxima)?;
            (
                [
                    normalized(&number_scaler, &train_index.numbers),
                    normalized(&max_scaler, &train_maxima),
                ],
                [
                    normalized(&number_scaler, &test_index.numbers),
                    normalized(&max_scaler, &test_maxima),
                ],
            )
        }
    };

    let attach = |table: Table, [numbers, maxima]: [Series; 2]| -> Result<Table, DeriveError> {
        Ok(table
            .with_column(numbers.with_name(QUESTION_NUMBER.into()))?
            .with_column(maxima.with_name(MAX_QUESTION_NUMBER.into()))?
            .without_column(ASSESSMENT_ITEM_ID)?)
    };
    Ok((attach(train, train_columns)?, attach(test, test_columns)?))
}

/// Test ID and question number of every row of one table.
struct QuestionIndex<'a> {
    tests: Vec<&'a str>,
    numbers: Vec<i64>,
}

impl<'a> QuestionIndex<'a> {
    fn of(table: &'a Table) -> Result<Self, DeriveError> {
        let tests = table
            .strs(TEST_ID)?
            .into_iter()
            .enumerate()
            .map(|(row, test_id)| required(test_id, TEST_ID, row))
            .collect::<Result<Vec<_>, _>>()?;
        let numbers = table
            .strs(ASSESSMENT_ITEM_ID)?
            .into_iter()
            .enumerate()
            .map(|(row, item_id)| question_number(required(item_id, ASSESSMENT_ITEM_ID, row)?))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tests, numbers })
    }

    fn max_by_test(&self) -> HashMap<&'a str, i64> {
        let mut max_by_test = HashMap::new();
        for (&test_id, &number) in self.tests.iter().zip(&self.numbers) {
            max_by_test
                .entry(test_id)
                .and_modify(|max: &mut i64| *max = (*max).max(number))
                .or_insert(number);
        }
        max_by_test
    }

    fn maxima(&self, max_by_test: &HashMap<&str, i64>) -> Vec<i64> {
        self.tests
            .iter()
            .zip(&self.numbers)
            .map(|(test_id, &number)| max_by_test.get(test_id).copied().unwrap_or(number))
            .collect()
    }
}

fn ints(values: &[i64]) -> Series {
    Series::new(QUESTION_NUMBER.into(), values)
}

fn raw(values: &[i64]) -> Series {
    let values = values.iter().copied().map(as_float).collect::<Vec<_>>();
    Series::new(QUESTION_NUMBER.into(), values)
}

fn fit_scaler(column: &str, values: &[i64]) -> Result<StandardScaler, DeriveError> {
    StandardScaler::fit(values.iter().copied().map(as_float)).map_err(|source| {
        DeriveError::Scale {
            column: column.to_owned(),
            source,
        }
    })
}

fn normalized(scaler: &StandardScaler, values: &[i64]) -> Series {
    let values = values
        .iter()
        .map(|&v| scaler.transform(as_float(v)))
        .collect::<Vec<_>>();
    Series::new(QUESTION_NUMBER.into(), values)
}
