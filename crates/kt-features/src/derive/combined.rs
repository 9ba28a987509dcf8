use kt_frame::{
    Table,
    schema::{KNOWLEDGE_TAG, TEST_ID},
};

use super::{
    DeriveError, FeatureDeriver,
    interaction::{INTERACTION, with_interaction},
    mark_categorical,
    question_index::{QuestionIndexScaling, with_question_index},
    with_constant_feature,
};

/// Interaction lag together with the question-index features.
#[derive(Debug, Clone, Copy)]
pub struct Combined {
    normalized: bool,
}

impl Combined {
    /// Question-index features z-normalized with training statistics.
    #[must_use]
    pub fn normalized() -> Self {
        Self { normalized: true }
    }

    /// Question-index features left as raw numbers.
    #[must_use]
    pub fn raw() -> Self {
        Self { normalized: false }
    }
}

impl FeatureDeriver for Combined {
    fn name(&self) -> &'static str {
        if self.normalized {
            "Combined"
        } else {
            "CombinedRaw"
        }
    }

    fn description(&self) -> &'static str {
        if self.normalized {
            "interaction lag plus z-normalized question index"
        } else {
            "interaction lag plus raw question index"
        }
    }

    fn derive(&self, train: &Table, test: &Table) -> Result<(Table, Table), DeriveError> {
        let scaling = if self.normalized {
            QuestionIndexScaling::Normalized
        } else {
            QuestionIndexScaling::Raw
        };
        let train = with_constant_feature(with_interaction(train.clone())?)?;
        let test = with_constant_feature(with_interaction(test.clone())?)?;
        let (train, test) = with_question_index(train, test, scaling)?;
        let categorical = [TEST_ID, KNOWLEDGE_TAG, INTERACTION];
        Ok((
            mark_categorical(train, &categorical)?,
            mark_categorical(test, &categorical)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use kt_frame::schema::{ANSWER_CODE, TIMESTAMP, USER_ID};

    use super::*;
    use crate::derive::{
        CONSTANT_FEATURE,
        question_index::{MAX_QUESTION_NUMBER, QUESTION_NUMBER},
        test_util::raw_table,
    };

    fn tables() -> (Table, Table) {
        let train = raw_table(&[
            (1, "A060001001", 1, "2020-03-24 00:17:11"),
            (1, "A060001002", 0, "2020-03-24 00:17:14"),
            (1, "A060001003", 1, "2020-03-24 00:17:20"),
        ]);
        let test = raw_table(&[
            (2, "A060001001", 0, "2020-03-25 00:00:00"),
            (2, "A060001002", -1, "2020-03-25 00:01:00"),
        ]);
        (train, test)
    }

    #[test]
    fn test_combined_columns() {
        let (train, test) = tables();
        for deriver in [Combined::normalized(), Combined::raw()] {
            let (train, test) = deriver.derive(&train, &test).unwrap();
            let expected = vec![
                USER_ID,
                "testId_c",
                ANSWER_CODE,
                TIMESTAMP,
                "KnowledgeTag_c",
                "interaction_c",
                CONSTANT_FEATURE,
                QUESTION_NUMBER,
                MAX_QUESTION_NUMBER,
            ];
            assert_eq!(train.column_names(), expected);
            assert_eq!(test.column_names(), expected);
            assert_eq!(
                train.ints("interaction_c").unwrap(),
                &[None, Some(1), Some(0)]
            );
            assert_eq!(test.ints("interaction_c").unwrap(), &[None, Some(0)]);
        }
    }

    #[test]
    fn test_raw_keeps_question_numbers() {
        let (train, test) = tables();
        let (train, _) = Combined::raw().derive(&train, &test).unwrap();
        assert_eq!(
            train.floats(QUESTION_NUMBER).unwrap(),
            &[Some(1.0), Some(2.0), Some(3.0)]
        );

        let (train, _) = Combined::normalized().derive(&tables().0, &tables().1).unwrap();
        assert_eq!(train.floats(QUESTION_NUMBER).unwrap()[1], Some(0.0));
    }

    #[test]
    fn test_names() {
        assert_eq!(Combined::normalized().name(), "Combined");
        assert_eq!(Combined::raw().name(), "CombinedRaw");
    }
}
