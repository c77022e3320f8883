use log::{info, warn};

use record_align::*;
use snafu::{prelude::*, Snafu};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

pub mod config_reader;
pub mod io_csv;
pub mod io_excel;

use crate::rec::config_reader::*;

#[derive(Debug, Snafu)]
pub enum RecError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("No usable worksheet in {path}"))]
    EmptyExcel { path: String },
    #[snafu(display("Error opening {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display(""))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display(""))]
    ParsingJsonNumber {},
    #[snafu(display("Error opening CSV file"))]
    CsvOpen { source: csv::Error },
    #[snafu(display("Error reading CSV line {lineno}"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display(""))]
    MissingParentDir {},
    #[snafu(display("Error writing summary to {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },

    #[snafu(display("Identifier column could not be resolved in table {table}"))]
    IdentifierUnresolved { table: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type RecResult<T> = Result<T, RecError>;

fn read_table(root_path: &Path, source: &TableSource) -> RecResult<RawTable> {
    let p: PathBuf = [root_path.to_path_buf(), PathBuf::from(source.file_path.clone())]
        .iter()
        .collect();
    let p2 = p.as_path().display().to_string();
    info!("Attempting to read {} table {:?}", source.role, p2);
    match source.provider.as_str() {
        "csv" => io_csv::read_csv_table(p2, source),
        "xlsx" => io_excel::read_excel_table(p2, source),
        x => whatever!("Provider not implemented {:?}", x),
    }
}

/// Runs a full reconciliation from a configuration file and emits the run
/// summary (write set and anomaly report) in JSON.
pub fn run_merge(
    config_path: String,
    out_path: Option<String>,
    reference_path: Option<String>,
) -> RecResult<()> {
    let config_p = Path::new(config_path.as_str());
    let config_str = fs::read_to_string(config_path.clone()).context(OpeningJsonSnafu {
        path: config_path.clone(),
    })?;
    let config: RunConfig = serde_json::from_str(&config_str).context(ParsingJsonSnafu {})?;
    info!("config: {:?}", config);

    let schema = validate_schema(&config.schema)?;
    let options = validate_options(config.matching.as_ref())?;

    let root_p = config_p.parent().context(MissingParentDirSnafu {})?;

    let pre = read_table(root_p, source_for_role(&config, "preSurvey")?)?;
    let post = read_table(root_p, source_for_role(&config, "postSurvey")?)?;
    let attendance = read_table(root_p, source_for_role(&config, "attendance")?)?;
    let master = read_table(root_p, source_for_role(&config, "master")?)?;

    let sources = SourceTables {
        pre_survey: pre,
        post_survey: post,
        attendance,
    };

    let result = match run_reconciliation(&sources, &master, &schema, &options) {
        Ok(r) => r,
        Err(ReconcileErrors::SchemaMismatch { table }) => {
            return IdentifierUnresolvedSnafu { table }.fail();
        }
    };

    if !result.report.is_clean() {
        warn!(
            "{} anomalies accumulated during the run, see the report section of the summary",
            result.report.anomalies.len()
        );
    }

    let offsets = header_offsets(&config)?;
    let summary = build_summary_js(&config, &result, &offsets);
    let pretty_summary = serde_json::to_string_pretty(&summary).context(ParsingJsonSnafu {})?;

    match out_path {
        Some(path) if path != "stdout" => {
            fs::write(path.clone(), &pretty_summary).context(WritingSummarySnafu { path })?;
        }
        _ => {
            println!("{}", pretty_summary);
        }
    }

    // The reference summary, if provided for comparison
    if let Some(reference) = reference_path {
        let reference_str = fs::read_to_string(reference.clone()).context(OpeningJsonSnafu {
            path: reference.clone(),
        })?;
        let reference_js: JSValue =
            serde_json::from_str(reference_str.as_str()).context(ParsingJsonSnafu {})?;
        let pretty_reference =
            serde_json::to_string_pretty(&reference_js).context(ParsingJsonSnafu {})?;
        if pretty_reference != pretty_summary {
            warn!("Found differences with the reference summary");
            print_diff(pretty_reference.as_str(), pretty_summary.as_ref(), "\n");
            whatever!("Difference detected between computed summary and reference summary");
        }
    }

    Ok(())
}

/// 1-based header row index per table role, for translating the engine's
/// 0-based data-row indexes into absolute sheet rows.
fn header_offsets(config: &RunConfig) -> RecResult<HashMap<String, usize>> {
    let mut offsets: HashMap<String, usize> = HashMap::new();
    for source in config.table_sources.iter() {
        offsets.insert(source.role.clone(), source.header_row_index()?);
    }
    Ok(offsets)
}

fn abs_row(offsets: &HashMap<String, usize>, table: &str, row: usize) -> usize {
    // Data starts on the row after the header.
    offsets.get(table).copied().unwrap_or(1) + 1 + row
}

fn value_to_json(value: &Value) -> JSValue {
    match value {
        Value::Missing | Value::Unparseable => JSValue::Null,
        Value::Code(n) => json!(n),
        Value::Count(n) => json!(n),
        Value::Flag(b) => json!(b),
        Value::Text(s) => json!(s),
    }
}

/// Assembles the final summary: a configuration echo, the write set in
/// absolute 1-based sheet coordinates, and the anomaly report.
fn build_summary_js(
    config: &RunConfig,
    result: &ReconcileResult,
    offsets: &HashMap<String, usize>,
) -> JSValue {
    let updates: Vec<JSValue> = result
        .write_set
        .updates
        .iter()
        .map(|u| {
            json!({
                "row": abs_row(offsets, "master", u.row),
                "column": u.column + 1,
                "value": value_to_json(&u.value),
            })
        })
        .collect();

    let appends: Vec<JSValue> = result
        .write_set
        .appends
        .iter()
        .map(|a| {
            let values: Vec<JSValue> = a.values.iter().map(value_to_json).collect();
            json!({ "identifier": a.identifier, "values": values })
        })
        .collect();

    let mut unmatched_fields: Vec<JSValue> = Vec::new();
    let mut unparseable: Vec<JSValue> = Vec::new();
    let mut empty_identifiers: Vec<JSValue> = Vec::new();
    for anomaly in result.report.anomalies.iter() {
        match anomaly {
            Anomaly::UnmatchedField { table, field } => {
                unmatched_fields.push(json!({ "table": table, "field": field }));
            }
            Anomaly::UnparseableResponse {
                table,
                row,
                field,
                raw,
            } => {
                unparseable.push(json!({
                    "table": table,
                    "row": abs_row(offsets, table, *row),
                    "field": field,
                    "raw": raw,
                }));
            }
            Anomaly::EmptyIdentifier { table, row } => {
                empty_identifiers.push(json!({
                    "table": table,
                    "row": abs_row(offsets, table, *row),
                }));
            }
        }
    }

    let mut report: JSMap<String, JSValue> = JSMap::new();
    report.insert("unmatchedFields".to_string(), JSValue::Array(unmatched_fields));
    report.insert("unparseableResponses".to_string(), JSValue::Array(unparseable));
    report.insert("emptyIdentifiers".to_string(), JSValue::Array(empty_identifiers));

    json!({
        "config": {
            "program": config.output_settings.program_name,
            "cohort": config.output_settings.cohort,
        },
        "participants": result.records.len(),
        "writeSet": { "updates": updates, "appends": appends },
        "report": report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_align::builder::TableBuilder;

    fn sample_config() -> RunConfig {
        let raw = r##"
        {
          "outputSettings": { "programName": "Narrative Medicine 2024", "cohort": "PGY1-3" },
          "tableSources": [
            { "provider": "csv", "filePath": "pre.csv", "role": "preSurvey" },
            { "provider": "csv", "filePath": "post.csv", "role": "postSurvey" },
            { "provider": "xlsx", "filePath": "attendance.xlsx", "role": "attendance" },
            { "provider": "csv", "filePath": "master.csv", "role": "master", "headerRowIndex": 4 }
          ],
          "schema": {
            "identifier": { "name": "identifier", "aliases": ["personal identifier", "identifier"], "domain": "freeText" },
            "attendance": { "name": "sessions_attended", "aliases": ["# of sessions attended"], "domain": "count" },
            "preFields": [
              { "name": "confidence", "aliases": ["confident leading discussions"], "domain": "likert",
                "vocabulary": [["Strongly Disagree", 0], ["Disagree", 1], ["Neutral", 2], ["Agree", 3], ["Strongly Agree", 4]] }
            ],
            "postFields": [
              { "name": "training_level", "aliases": ["training level"], "domain": "categorical",
                "vocabulary": [["PGY1", 0], ["PGY2", 1], ["PGY3", 2]] }
            ]
          },
          "matching": { "headerMatchThreshold": 0.6, "identifierIgnoreLabels": ["first two letters"] }
        }
        "##;
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn config_round_trip() {
        let config = sample_config();
        assert_eq!(config.table_sources.len(), 4);
        let master = source_for_role(&config, "master").unwrap();
        assert_eq!(master.header_row_index().unwrap(), 4);
        let pre = source_for_role(&config, "preSurvey").unwrap();
        assert_eq!(pre.header_row_index().unwrap(), 1);
        assert!(source_for_role(&config, "midSurvey").is_err());

        let schema = validate_schema(&config.schema).unwrap();
        assert_eq!(schema.pre_fields.len(), 1);
        assert_eq!(schema.post_fields.len(), 1);
        let options = validate_options(config.matching.as_ref()).unwrap();
        assert_eq!(options.header_match_threshold, 0.6);
        assert_eq!(options.identifier_ignore_labels, vec!["first two letters".to_string()]);
    }

    #[test]
    fn summary_uses_absolute_sheet_coordinates() {
        let config = sample_config();
        let schema = validate_schema(&config.schema).unwrap();
        let options = validate_options(config.matching.as_ref()).unwrap();

        let sources = SourceTables {
            pre_survey: TableBuilder::new(
                "preSurvey",
                &["Personal Identifier:", "I feel confident leading discussions"],
            )
            .with_row(&["AB", "Strongly Agree"])
            .build(),
            post_survey: TableBuilder::new("postSurvey", &["Personal Identifier:", "Training level"])
                .with_row(&["AB", "PGY2"])
                .build(),
            attendance: TableBuilder::new("attendance", &["Date", "Personal Identifier"])
                .with_row(&["1/10/2024", "AB"])
                .build(),
        };
        // Master headers are on sheet row 4, so its first data row is sheet row 5.
        let master = TableBuilder::new(
            "master",
            &[
                "Identifier",
                "# of sessions attended",
                "I feel confident leading discussions",
                "Training level",
            ],
        )
        .with_row(&["ab", "", "", ""])
        .build();

        let result = run_reconciliation(&sources, &master, &schema, &options).unwrap();
        let offsets = header_offsets(&config).unwrap();
        let summary = build_summary_js(&config, &result, &offsets);

        let updates = summary["writeSet"]["updates"].as_array().unwrap();
        assert_eq!(updates.len(), 3);
        for u in updates {
            assert_eq!(u["row"], json!(5));
        }
        let columns: Vec<u64> = updates.iter().map(|u| u["column"].as_u64().unwrap()).collect();
        assert_eq!(columns, vec![2, 3, 4]);
        assert_eq!(summary["participants"], json!(1));
        assert_eq!(summary["config"]["program"], json!("Narrative Medicine 2024"));
    }
}
