// Primitives for reading Excel (.xlsx) exports into tables.

use calamine::{open_workbook, DataType, Reader, Xlsx};
use log::{debug, warn};
use record_align::RawTable;
use snafu::prelude::*;

use crate::rec::config_reader::TableSource;
use crate::rec::{EmptyExcelSnafu, OpeningExcelSnafu, RecResult};

pub fn read_excel_table(path: String, source: &TableSource) -> RecResult<RawTable> {
    let wrange = get_range(&path, source)?;

    let mut iter = wrange.rows();
    for _ in 1..source.header_row_index()? {
        iter.next();
    }
    let header_row = iter
        .next()
        .context(EmptyExcelSnafu { path: path.clone() })?;
    let headers: Vec<String> = header_row.iter().map(cell_to_string).collect();
    debug!("read_excel_table: {}: headers: {:?}", source.role, headers);

    let rows: Vec<Vec<String>> = iter
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();
    debug!("read_excel_table: {}: {} data rows", source.role, rows.len());

    Ok(RawTable {
        name: source.role.clone(),
        headers,
        rows,
    })
}

/// Everything becomes a string: spreadsheet cells carry no types the
/// normalizer could trust anyway. Integral floats print without the
/// fractional part so "3.0" counts as "3".
fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.clone(),
        DataType::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        DataType::Float(f) => f.to_string(),
        DataType::DateTime(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        DataType::DateTime(f) => f.to_string(),
        DataType::Int(i) => i.to_string(),
        DataType::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        DataType::Error(e) => {
            warn!("cell_to_string: error cell {:?}, treating as blank", e);
            String::new()
        }
        DataType::Empty => String::new(),
    }
}

fn get_range(path: &String, source: &TableSource) -> RecResult<calamine::Range<DataType>> {
    let worksheet_name_o = source.excel_worksheet_name.clone();
    debug!(
        "read_excel_table: path: {:?} worksheet: {:?}",
        &path, &worksheet_name_o
    );
    let p = path.clone();
    let mut workbook: Xlsx<_> =
        open_workbook(p).context(OpeningExcelSnafu { path: path.clone() })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet_name) = worksheet_name_o {
        let wrange = workbook
            .worksheet_range(&worksheet_name)
            .context(EmptyExcelSnafu { path: path.clone() })?
            .context(OpeningExcelSnafu { path: path.clone() })?;
        Ok(wrange)
    } else {
        let all_worksheets = workbook.worksheets();
        match all_worksheets.as_slice() {
            [] => EmptyExcelSnafu { path: path.clone() }.fail(),
            [(worksheet_name, wrange)] => {
                debug!(
                    "read_excel_table: path: {:?} worksheet: {:?}",
                    &path, &worksheet_name
                );
                Ok(wrange.clone())
            }
            _ => {
                whatever!(
                    "read_excel_table: {:?} has several worksheets, excelWorksheetName must be provided",
                    path
                )
            }
        }
    }
}
