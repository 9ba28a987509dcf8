//! CSV reading and writing.
//!
//! Files are read through the polars CSV reader with every column as text,
//! then cast column by column, so that a missing column or an unparsable cell
//! fails the load with the column and row that caused it. Raw event files have
//! a fixed schema; derived tables are read back generically, with the column
//! types supplied by the caller.

use std::{
    fs::File,
    io::{self, BufWriter},
    path::Path,
};

use chrono::NaiveDateTime;
use polars::prelude::*;

use crate::{
    FrameError, Table,
    schema::{
        ANSWER_CODE, ASSESSMENT_ITEM_ID, KNOWLEDGE_TAG, TEST_ID, TIMESTAMP, TIMESTAMP_FORMAT,
        USER_ID,
    },
    table::timestamp_series,
};

/// Loads a raw event table (`userID`, `assessmentItemID`, `testId`,
/// `answerCode`, `Timestamp`, `KnowledgeTag`) from a CSV file.
pub fn read_raw_events<P>(path: P) -> Result<Table, FrameError>
where
    P: AsRef<Path>,
{
    let text = read_text(path.as_ref())?;
    Table::new(vec![
        cast_column(&text, USER_ID, &DataType::Int64)?,
        cast_column(&text, ASSESSMENT_ITEM_ID, &DataType::String)?,
        cast_column(&text, TEST_ID, &DataType::String)?,
        cast_column(&text, ANSWER_CODE, &DataType::Int64)?,
        parse_timestamps(&text, TIMESTAMP)?,
        cast_column(&text, KNOWLEDGE_TAG, &DataType::Int64)?,
    ])
}

/// Reads a CSV file with a header row, assigning each column the type
/// returned by `dtype_of` for its name.
pub fn read_csv<P, F>(path: P, dtype_of: F) -> Result<Table, FrameError>
where
    P: AsRef<Path>,
    F: Fn(&str) -> DataType,
{
    let text = read_text(path.as_ref())?;
    let columns = text
        .column_names()
        .into_iter()
        .map(|name| cast_column(&text, name, &dtype_of(name)))
        .collect::<Result<Vec<_>, _>>()?;
    Table::new(columns)
}

/// Writes `table` with a header row. Missing cells are written empty.
pub fn write_csv<W>(table: &Table, writer: W) -> PolarsResult<()>
where
    W: io::Write,
{
    let mut df = table.frame().clone();
    CsvWriter::new(writer).include_header(true).finish(&mut df)
}

/// [`write_csv`] into a newly created file.
pub fn write_csv_file<P>(table: &Table, path: P) -> Result<(), FrameError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| FrameError::Io {
        path: path.to_owned(),
        source,
    })?;
    write_csv(table, BufWriter::new(file)).map_err(|source| FrameError::Csv {
        path: path.to_owned(),
        source,
    })
}

fn read_text(path: &Path) -> Result<Table, FrameError> {
    if !path.is_file() {
        return Err(FrameError::Io {
            path: path.to_owned(),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
    }
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_owned()))
        .and_then(SerReader::finish)
        .map(Table::from_frame)
        .map_err(|source| FrameError::Csv {
            path: path.to_owned(),
            source,
        })
}

/// Casts the text column `name` to `dtype`, failing on the first non-empty
/// cell that does not parse.
fn cast_column(text: &Table, name: &str, dtype: &DataType) -> Result<Series, FrameError> {
    let cells = text.series(name)?;
    let cast = cells.cast(dtype)?;
    let nulls = cast.is_null();
    let invalid = cells
        .str()?
        .iter()
        .zip(&nulls)
        .enumerate()
        .find(|(_, (cell, null))| cell.is_some() && *null == Some(true));
    match invalid {
        Some((row, (cell, _))) => Err(FrameError::InvalidValue {
            column: name.to_owned(),
            row,
            value: cell.unwrap_or_default().to_owned(),
        }),
        None => Ok(cast),
    }
}

fn parse_timestamps(text: &Table, name: &str) -> Result<Series, FrameError> {
    let values = text
        .strs(name)?
        .into_iter()
        .enumerate()
        .map(|(row, cell)| {
            cell.map(|cell| {
                NaiveDateTime::parse_from_str(cell.trim(), TIMESTAMP_FORMAT).map_err(|_| {
                    FrameError::InvalidValue {
                        column: name.to_owned(),
                        row,
                        value: cell.to_owned(),
                    }
                })
            })
            .transpose()
        })
        .collect::<Result<Vec<_>, _>>()?;
    timestamp_series(name, &values)
}
