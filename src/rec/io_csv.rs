// Primitives for reading CSV exports into tables.

use log::debug;
use record_align::RawTable;
use snafu::prelude::*;

use crate::rec::config_reader::TableSource;
use crate::rec::{CsvLineParseSnafu, CsvOpenSnafu, RecResult};

pub fn read_csv_table(path: String, source: &TableSource) -> RecResult<RawTable> {
    let header_row = source.header_row_index()?;
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path.clone())
        .context(CsvOpenSnafu {})?;
    let mut records = rdr.into_records();
    // The index starts at 1 to respect most conventions in the spreadsheet world
    for _ in 1..header_row {
        _ = records.next();
    }

    let headers: Vec<String> = match records.next() {
        Some(line_r) => line_r
            .context(CsvLineParseSnafu { lineno: header_row })?
            .iter()
            .map(|s| s.to_string())
            .collect(),
        None => whatever!("No header row at index {} in {:?}", header_row, path),
    };
    debug!("read_csv_table: {}: headers: {:?}", source.role, headers);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        let lineno = header_row + idx + 1;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        rows.push(line.iter().map(|s| s.to_string()).collect());
    }
    debug!("read_csv_table: {}: {} data rows", source.role, rows.len());

    Ok(RawTable {
        name: source.role.clone(),
        headers,
        rows,
    })
}
