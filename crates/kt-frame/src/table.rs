use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;

use crate::FrameError;

/// Storage unit of timestamp columns.
pub const TIMESTAMP_UNIT: TimeUnit = TimeUnit::Milliseconds;

const ROW_INDEX: &str = "__row";

/// An ordered collection of equally long, uniquely named columns.
///
/// Operations never mutate a table in place: they either borrow it and build a
/// new one ([`Table::take_rows`], [`Table::concat`]) or consume it and return
/// the transformed table ([`Table::with_column`], [`Table::renamed`]).
#[derive(Debug, Clone)]
pub struct Table {
    df: DataFrame,
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.df.equals_missing(&other.df)
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::from_frame(DataFrame::empty())
    }
}

impl Table {
    /// Builds a table from `columns`, checking names and lengths.
    pub fn new(columns: Vec<Series>) -> Result<Self, FrameError> {
        columns
            .into_iter()
            .try_fold(Self::default(), Self::with_column)
    }

    #[must_use]
    pub fn from_frame(df: DataFrame) -> Self {
        Self { df }
    }

    #[must_use]
    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.df.height()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.df.width()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.df
            .get_column_names()
            .into_iter()
            .map(PlSmallStr::as_str)
            .collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.df.get_column_index(name).is_some()
    }

    pub fn series(&self, name: &str) -> Result<&Series, FrameError> {
        self.df
            .column(name)
            .map(Column::as_materialized_series)
            .map_err(|_| FrameError::MissingColumn {
                name: name.to_owned(),
            })
    }

    pub fn dtype(&self, name: &str) -> Result<&DataType, FrameError> {
        self.series(name).map(|s| s.dtype())
    }

    pub fn ints(&self, name: &str) -> Result<Vec<Option<i64>>, FrameError> {
        let series = self.typed(name, &DataType::Int64)?;
        Ok(series.i64()?.iter().collect())
    }

    pub fn floats(&self, name: &str) -> Result<Vec<Option<f64>>, FrameError> {
        let series = self.typed(name, &DataType::Float64)?;
        Ok(series.f64()?.iter().collect())
    }

    pub fn strs(&self, name: &str) -> Result<Vec<Option<&str>>, FrameError> {
        let series = self.typed(name, &DataType::String)?;
        Ok(series.str()?.iter().collect())
    }

    pub fn timestamps(&self, name: &str) -> Result<Vec<Option<NaiveDateTime>>, FrameError> {
        let series = self.typed(name, &DataType::Datetime(TIMESTAMP_UNIT, None))?;
        let millis = series.cast(&DataType::Int64)?;
        Ok(millis
            .i64()?
            .iter()
            .map(|ms| ms.and_then(DateTime::from_timestamp_millis).map(|t| t.naive_utc()))
            .collect())
    }

    /// Appends a column at the right end.
    pub fn with_column(mut self, column: Series) -> Result<Self, FrameError> {
        let name = column.name().to_string();
        if self.contains(&name) {
            return Err(FrameError::DuplicateColumn { name });
        }
        if self.num_columns() > 0 && column.len() != self.num_rows() {
            return Err(FrameError::LengthMismatch {
                name,
                expected: self.num_rows(),
                actual: column.len(),
            });
        }
        self.df.with_column(column)?;
        Ok(self)
    }

    pub fn without_column(self, name: &str) -> Result<Self, FrameError> {
        if !self.contains(name) {
            return Err(FrameError::MissingColumn {
                name: name.to_owned(),
            });
        }
        Ok(Self::from_frame(self.df.drop(name)?))
    }

    /// Renames columns in place of their position. Every source name must exist.
    pub fn renamed(mut self, renames: &[(&str, &str)]) -> Result<Self, FrameError> {
        for &(from, to) in renames {
            if from == to {
                continue;
            }
            if self.contains(to) {
                return Err(FrameError::DuplicateColumn { name: to.to_owned() });
            }
            if !self.contains(from) {
                return Err(FrameError::MissingColumn {
                    name: from.to_owned(),
                });
            }
            self.df.rename(from, to.into())?;
        }
        Ok(self)
    }

    /// Builds a table from the rows at `indices`, in that order.
    pub fn take_rows(&self, indices: &[usize]) -> Result<Self, FrameError> {
        let indices = indices
            .iter()
            .map(|&row| IdxSize::try_from(row).map_err(|_| FrameError::RowIndex { row }))
            .collect::<Result<Vec<_>, _>>()?;
        let indices = IdxCa::from_vec(ROW_INDEX.into(), indices);
        Ok(Self::from_frame(self.df.take(&indices)?))
    }

    /// Stacks `other` below `self`. Both tables must have identical column
    /// names, order and types.
    pub fn concat(&self, other: &Self) -> Result<Self, FrameError> {
        if self.column_names() != other.column_names() {
            return Err(FrameError::SchemaMismatch {
                left: owned_names(self),
                right: owned_names(other),
            });
        }
        for (left, right) in self.df.get_columns().iter().zip(other.df.get_columns()) {
            if left.dtype() != right.dtype() {
                return Err(FrameError::KindMismatch {
                    name: left.name().to_string(),
                    expected: left.dtype().clone(),
                    actual: right.dtype().clone(),
                });
            }
        }
        Ok(Self::from_frame(self.df.vstack(&other.df)?))
    }

    /// Row indices in stable ascending order of the `by` columns.
    pub fn sorted_order(&self, by: &[&str]) -> Result<Vec<usize>, FrameError> {
        for name in by {
            self.series(name)?;
        }
        let sorted = self
            .df
            .select(by.iter().copied())?
            .with_row_index(ROW_INDEX.into(), None)?
            .sort(
                by.to_vec(),
                SortMultipleOptions::default().with_maintain_order(true),
            )?;
        let rows = sorted.column(ROW_INDEX)?.as_materialized_series().idx()?;
        Ok(rows.into_no_null_iter().map(|row| row as usize).collect())
    }

    /// Cells of one row as floats, in column order.
    pub fn row_as_floats(&self, row: usize) -> Result<Vec<Option<f64>>, FrameError> {
        if row >= self.num_rows() {
            return Err(FrameError::RowIndex { row });
        }
        self.df
            .get_columns()
            .iter()
            .map(|column| {
                let values = column.as_materialized_series().cast(&DataType::Float64)?;
                Ok(values.f64()?.get(row))
            })
            .collect()
    }

    fn typed(&self, name: &str, expected: &DataType) -> Result<&Series, FrameError> {
        let series = self.series(name)?;
        if series.dtype() == expected {
            Ok(series)
        } else {
            Err(FrameError::KindMismatch {
                name: name.to_owned(),
                expected: expected.clone(),
                actual: series.dtype().clone(),
            })
        }
    }
}

/// Timestamp column stored at [`TIMESTAMP_UNIT`] resolution.
pub fn timestamp_series(
    name: &str,
    values: &[Option<NaiveDateTime>],
) -> Result<Series, FrameError> {
    let millis = values
        .iter()
        .map(|v| v.map(|t| t.and_utc().timestamp_millis()))
        .collect::<Vec<_>>();
    Ok(Series::new(name.into(), millis).cast(&DataType::Datetime(TIMESTAMP_UNIT, None))?)
}

fn owned_names(table: &Table) -> Vec<String> {
    table.column_names().into_iter().map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn sample() -> Table {
        Table::new(vec![
            Series::new("a".into(), [Some(1i64), Some(2), None]),
            Series::new("b".into(), [Some("x"), None, Some("z")]),
        ])
        .unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let err = Table::new(vec![
            Series::new("a".into(), [Some(1i64)]),
            Series::new("b".into(), [Some(1i64), Some(2)]),
        ])
        .unwrap_err();
        assert!(matches!(err, FrameError::LengthMismatch { expected: 1, actual: 2, .. }));
    }

    #[test]
    fn test_new_rejects_duplicate_names() {
        let err = Table::new(vec![
            Series::new("a".into(), [Some(1i64)]),
            Series::new("a".into(), [Some(2i64)]),
        ])
        .unwrap_err();
        assert!(matches!(err, FrameError::DuplicateColumn { .. }));
    }

    #[test]
    fn test_take_rows_reorders() {
        let table = sample().take_rows(&[2, 0]).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.ints("a").unwrap(), vec![None, Some(1)]);
        assert_eq!(table.strs("b").unwrap(), vec![Some("z"), Some("x")]);
        assert!(sample().take_rows(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_renamed_keeps_position() {
        let table = sample().renamed(&[("a", "a_c")]).unwrap();
        assert_eq!(table.column_names(), vec!["a_c", "b"]);
        assert!(sample().renamed(&[("missing", "x")]).is_err());
        assert!(matches!(
            sample().renamed(&[("a", "b")]),
            Err(FrameError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn test_concat_requires_same_schema() {
        let table = sample();
        let stacked = table.concat(&table).unwrap();
        assert_eq!(stacked.num_rows(), 6);
        assert_eq!(stacked.ints("a").unwrap()[3..], [Some(1), Some(2), None]);

        let other = table.clone().without_column("b").unwrap();
        assert!(matches!(
            table.concat(&other),
            Err(FrameError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_typed_accessor_checks_kind() {
        let table = sample();
        assert!(table.strs("b").is_ok());
        assert!(matches!(
            table.floats("a"),
            Err(FrameError::KindMismatch { .. })
        ));
        assert!(matches!(
            table.ints("missing"),
            Err(FrameError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_sorted_order_is_stable() {
        let table = Table::new(vec![
            Series::new("user".into(), [2i64, 1, 2, 1]),
            Series::new("time".into(), [5i64, 7, 5, 3]),
        ])
        .unwrap();
        assert_eq!(table.sorted_order(&["user", "time"]).unwrap(), vec![3, 1, 0, 2]);
        assert!(table.sorted_order(&["missing"]).is_err());
    }

    #[test]
    fn test_timestamps_keep_second_resolution() {
        let t = NaiveDate::from_ymd_opt(2020, 3, 24)
            .unwrap()
            .and_hms_opt(0, 17, 11)
            .unwrap();
        let table = Table::new(vec![timestamp_series("ts", &[Some(t), None]).unwrap()]).unwrap();
        assert_eq!(table.timestamps("ts").unwrap(), vec![Some(t), None]);
    }

    #[test]
    fn test_row_as_floats() {
        assert_eq!(sample().without_column("b").unwrap().row_as_floats(1).unwrap(), vec![Some(2.0)]);
        assert!(matches!(
            sample().row_as_floats(3),
            Err(FrameError::RowIndex { row: 3 })
        ));
    }
}
