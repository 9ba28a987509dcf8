use kt_frame::{
    Table,
    schema::{ANSWER_CODE, ASSESSMENT_ITEM_ID, KNOWLEDGE_TAG, TEST_ID, WITHHELD_ANSWER},
};
use polars::prelude::{NamedFrom, Series};

use super::{
    DeriveError, FeatureDeriver, both, mark_categorical, previous_in_group, time_order,
    user_test_keys, with_constant_feature,
};

/// Previous answer correctness within the same (learner, test) group.
pub const INTERACTION: &str = "interaction";

/// Adds the learner's previous correctness in the same test as a categorical
/// feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct InteractionLag;

impl FeatureDeriver for InteractionLag {
    fn name(&self) -> &'static str {
        "InteractionLag"
    }

    fn description(&self) -> &'static str {
        "previous answer correctness within each learner's test as a categorical feature"
    }

    fn derive(&self, train: &Table, test: &Table) -> Result<(Table, Table), DeriveError> {
        both(train.clone(), test.clone(), |table| {
            let table = with_constant_feature(with_interaction(table)?)?;
            mark_categorical(
                table,
                &[ASSESSMENT_ITEM_ID, TEST_ID, KNOWLEDGE_TAG, INTERACTION],
            )
        })
    }
}

/// Appends [`INTERACTION`]: the `answerCode` of the preceding row of the same
/// learner and test, in (`userID`, `Timestamp`) order. The first row of each
/// group, and rows following a withheld answer, get `None`. Row order of the
/// table is unchanged.
pub(crate) fn with_interaction(table: Table) -> Result<Table, DeriveError> {
    let order = time_order(&table)?;
    let keys = user_test_keys(&table)?;
    let answers = table.ints(ANSWER_CODE)?;
    let lagged = previous_in_group(
        &order,
        |row| keys[row],
        |row| answers[row].filter(|&answer| answer != WITHHELD_ANSWER),
    );
    Ok(table.with_column(Series::new(INTERACTION.into(), lagged))?)
}

#[cfg(test)]
mod tests {
    use kt_frame::schema::USER_ID;

    use super::*;
    use crate::derive::test_util::raw_table;

    #[test]
    fn test_lag_within_learner_and_test() {
        let table = raw_table(&[
            (1, "A060001001", 1, "2020-03-24 00:17:11"),
            (1, "A060001002", 0, "2020-03-24 00:17:14"),
            (1, "A060001003", 1, "2020-03-24 00:17:20"),
        ]);
        let lagged = with_interaction(table).unwrap();
        assert_eq!(lagged.ints(INTERACTION).unwrap(), &[None, Some(1), Some(0)]);
    }

    #[test]
    fn test_lag_uses_time_order_and_keeps_row_order() {
        // Rows are stored out of time order and interleave two tests and learners.
        let table = raw_table(&[
            (1, "A060001002", 0, "2020-03-24 00:17:14"),
            (2, "A060001001", 1, "2020-03-24 00:00:00"),
            (1, "A060001001", 1, "2020-03-24 00:17:11"),
            (1, "A070001001", 0, "2020-03-25 10:00:00"),
            (2, "A060001002", 0, "2020-03-24 00:00:05"),
        ]);
        let lagged = with_interaction(table.clone()).unwrap();
        assert_eq!(
            lagged.ints(INTERACTION).unwrap(),
            &[Some(1), None, None, None, Some(1)]
        );
        assert_eq!(lagged.ints(USER_ID).unwrap(), table.ints(USER_ID).unwrap());
    }

    #[test]
    fn test_withheld_answer_is_not_propagated() {
        let table = raw_table(&[
            (1, "A060001001", -1, "2020-03-24 00:17:11"),
            (1, "A060001002", 1, "2020-03-24 00:17:14"),
        ]);
        let lagged = with_interaction(table).unwrap();
        assert_eq!(lagged.ints(INTERACTION).unwrap(), &[None, None]);
    }

    #[test]
    fn test_derive_marks_categorical_columns() {
        let train = raw_table(&[
            (1, "A060001001", 1, "2020-03-24 00:17:11"),
            (1, "A060001002", 0, "2020-03-24 00:17:14"),
        ]);
        let test = raw_table(&[
            (2, "A060001001", 1, "2020-03-24 00:17:11"),
            (2, "A060001002", -1, "2020-03-24 00:17:14"),
        ]);
        let (train, test) = InteractionLag.derive(&train, &test).unwrap();
        for table in [&train, &test] {
            assert_eq!(
                table.column_names(),
                vec![
                    USER_ID,
                    "assessmentItemID_c",
                    "testId_c",
                    ANSWER_CODE,
                    "Timestamp",
                    "KnowledgeTag_c",
                    "interaction_c",
                    "constant",
                ]
            );
        }
        assert_eq!(test.ints(ANSWER_CODE).unwrap(), &[Some(1), Some(-1)]);
        assert_eq!(test.ints("interaction_c").unwrap(), &[None, Some(1)]);
    }
}
