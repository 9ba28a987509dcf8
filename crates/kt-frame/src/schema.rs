//! Column names of the raw event schema.
//!
//! Both the train and the test table carry exactly these columns when they are
//! loaded. `answerCode` is `0` or `1`, except on test rows whose label is
//! withheld for scoring, which carry [`WITHHELD_ANSWER`].

pub const USER_ID: &str = "userID";
pub const ASSESSMENT_ITEM_ID: &str = "assessmentItemID";
pub const TEST_ID: &str = "testId";
pub const KNOWLEDGE_TAG: &str = "KnowledgeTag";
pub const TIMESTAMP: &str = "Timestamp";
pub const ANSWER_CODE: &str = "answerCode";

/// `answerCode` value marking a row whose label must never be used.
pub const WITHHELD_ANSWER: i64 = -1;

/// Textual timestamp format of the raw event files.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Returns `true` for the two columns every stage must carry through untouched.
#[must_use]
pub fn is_identity_column(name: &str) -> bool {
    name == USER_ID || name == ANSWER_CODE
}
