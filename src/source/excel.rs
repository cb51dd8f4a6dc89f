#![cfg(feature = "excel")]

use std::path::{Path, PathBuf};

use calamine::{Data, Range, Reader, open_workbook_auto};
use chrono::{Days, NaiveDate, NaiveTime};

use crate::config::{ExcelSheetSelection, SourceSpec};
use crate::error::{RowpackError, RowpackResult};
use crate::intuit::parse::{Temporal, parse_temporal};
use crate::meta::SourceMeta;
use crate::source::{RowIter, RowSource, name_of};
use crate::types::Cell;

/// Rows of one or more worksheets of an Excel/ODS workbook (`.xlsx`, `.xls`, `.ods`, ...).
///
/// Behavior:
/// - Picks sheets by [`ExcelSheetSelection`]; several sheets are concatenated in order
/// - Leading empty rows and columns are kept, so row `n` is spreadsheet row `n`
/// - Integral floats become integers; date cells become date, time or datetime cells
/// - An error cell (`#DIV/0!`, ...) fails the row with [`RowpackError::Encoding`]
#[derive(Debug, Clone)]
pub struct ExcelSource {
    name: String,
    path: PathBuf,
    sheets: ExcelSheetSelection,
}

impl ExcelSource {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            name: name_of(path),
            path: path.to_path_buf(),
            sheets: ExcelSheetSelection::First,
        }
    }

    pub fn with_sheets(mut self, sheets: ExcelSheetSelection) -> Self {
        self.sheets = sheets;
        self
    }

    fn load_ranges(&self) -> RowpackResult<Vec<Range<Data>>> {
        let mut workbook = open_workbook_auto(&self.path)?;
        let names: Vec<String> = match &self.sheets {
            ExcelSheetSelection::First => workbook.sheet_names().into_iter().take(1).collect(),
            ExcelSheetSelection::Sheet(name) => vec![name.clone()],
            ExcelSheetSelection::AllSheets => workbook.sheet_names(),
            ExcelSheetSelection::Sheets(names) => names.clone(),
        };
        if names.is_empty() {
            return Err(RowpackError::SchemaMismatch {
                message: format!("workbook {} has no sheets", self.path.display()),
            });
        }
        names
            .iter()
            .map(|sheet| Ok(workbook.worksheet_range(sheet)?))
            .collect()
    }
}

pub(crate) fn open_excel(path: &Path, spec: &SourceSpec) -> RowpackResult<Box<dyn RowSource>> {
    Ok(Box::new(
        ExcelSource::from_path(path).with_sheets(spec.sheets.clone()),
    ))
}

impl RowSource for ExcelSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> SourceMeta {
        SourceMeta {
            name: Some(self.name.clone()),
            url: Some(format!("file://{}", self.path.display())),
            ..SourceMeta::default()
        }
    }

    fn rows(&mut self) -> RowpackResult<RowIter<'_>> {
        let ranges = self.load_ranges()?;
        let rows: Vec<RowpackResult<Vec<Cell>>> = ranges.iter().flat_map(sheet_rows).collect();
        Ok(Box::new(rows.into_iter()))
    }
}

fn sheet_rows(range: &Range<Data>) -> Vec<RowpackResult<Vec<Cell>>> {
    let (row0, col0) = range.start().unwrap_or((0, 0));
    let mut out: Vec<RowpackResult<Vec<Cell>>> = (0..row0).map(|_| Ok(Vec::new())).collect();
    for row in range.rows() {
        let mut cells = vec![Cell::Null; col0 as usize];
        let converted: RowpackResult<Vec<Cell>> = row.iter().map(convert_cell).collect();
        out.push(converted.map(|c| {
            cells.extend(c);
            cells
        }));
    }
    out
}

fn convert_cell(c: &Data) -> RowpackResult<Cell> {
    Ok(match c {
        Data::Empty => Cell::Null,
        Data::String(s) if s.trim().is_empty() => Cell::Null,
        Data::String(s) => Cell::Str(s.trim().to_owned()),
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Cell::Int(*f as i64),
        Data::Float(f) => Cell::Float(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) if dt.is_duration() => Cell::Float(dt.as_f64()),
        Data::DateTime(dt) => serial_to_cell(dt.as_f64())?,
        Data::DateTimeIso(s) => match parse_temporal(s) {
            Some(Temporal::Date(d)) => Cell::Date(d),
            Some(Temporal::Time(t)) => Cell::Time(t),
            Some(Temporal::DateTime(dt)) => Cell::DateTime(dt),
            None => Cell::Str(s.clone()),
        },
        Data::DurationIso(s) => Cell::Str(s.clone()),
        Data::Error(e) => {
            return Err(RowpackError::encoding(format!("spreadsheet error cell {e:?}")));
        }
    })
}

/// Excel serial date: days since 1899-12-30, fraction of a day for the time.
fn serial_to_cell(serial: f64) -> RowpackResult<Cell> {
    let out_of_range = || RowpackError::encoding(format!("date serial {serial} out of range"));
    if !serial.is_finite() || serial < 0.0 {
        return Err(out_of_range());
    }
    let mut days = serial.trunc() as u64;
    let mut secs = ((serial - serial.trunc()) * 86_400.0).round() as u32;
    if secs >= 86_400 {
        days += 1;
        secs = 0;
    }
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, 0).ok_or_else(out_of_range)?;
    if days == 0 {
        return Ok(Cell::Time(time));
    }
    let date = NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|epoch| epoch.checked_add_days(Days::new(days)))
        .ok_or_else(out_of_range)?;
    Ok(if secs == 0 {
        Cell::Date(date)
    } else {
        Cell::DateTime(date.and_time(time))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serials_map_to_temporal_cells() {
        assert_eq!(
            serial_to_cell(45292.0).unwrap(),
            Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        assert_eq!(
            serial_to_cell(0.5).unwrap(),
            Cell::Time(NaiveTime::from_hms_opt(12, 0, 0).unwrap())
        );
        assert!(matches!(serial_to_cell(45292.25).unwrap(), Cell::DateTime(_)));
        assert!(serial_to_cell(-1.0).is_err());
    }

    #[test]
    fn integral_floats_become_ints() {
        assert_eq!(convert_cell(&Data::Float(3.0)).unwrap(), Cell::Int(3));
        assert_eq!(convert_cell(&Data::Float(3.5)).unwrap(), Cell::Float(3.5));
        assert_eq!(convert_cell(&Data::String("  ".into())).unwrap(), Cell::Null);
    }
}
