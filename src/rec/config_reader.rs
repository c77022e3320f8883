use crate::rec::*;

use record_align::{Domain, FieldSpec, MatchOptions, Schema, Vocabulary};
use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;
use snafu::prelude::*;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "programName")]
    pub program_name: String,
    pub cohort: Option<String>,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
}

/// One input spreadsheet export: where it lives, how to read it, and which
/// role it plays in the run.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TableSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    /// One of preSurvey, postSurvey, attendance, master.
    pub role: String,
    /// 1-based row of the header; defaults to 1. The master sheet of the
    /// original program keeps its headers on row 4, below a title block.
    #[serde(rename = "headerRowIndex")]
    _header_row_index: Option<JSValue>,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
}

impl TableSource {
    pub fn header_row_index(&self) -> RecResult<usize> {
        match &self._header_row_index {
            None => Ok(1),
            Some(_) => {
                let x = read_js_int(&self._header_row_index)?;
                if x < 1 {
                    whatever!("headerRowIndex must be 1-based, got {}", x);
                }
                Ok(x)
            }
        }
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub aliases: Vec<String>,
    /// One of likert, categorical, count, freeText.
    pub domain: String,
    /// Word-to-code pairs, required for likert and categorical fields.
    pub vocabulary: Option<Vec<(String, i64)>>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub identifier: FieldConfig,
    pub attendance: FieldConfig,
    #[serde(rename = "preFields")]
    pub pre_fields: Vec<FieldConfig>,
    #[serde(rename = "postFields")]
    pub post_fields: Vec<FieldConfig>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(rename = "headerMatchThreshold")]
    pub header_match_threshold: Option<f64>,
    #[serde(rename = "identifierIgnoreLabels")]
    pub identifier_ignore_labels: Option<Vec<String>>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(rename = "tableSources")]
    pub table_sources: Vec<TableSource>,
    pub schema: SchemaConfig,
    pub matching: Option<MatchingConfig>,
}

pub fn source_for_role<'a>(config: &'a RunConfig, role: &str) -> RecResult<&'a TableSource> {
    let matching: Vec<&TableSource> = config
        .table_sources
        .iter()
        .filter(|s| s.role == role)
        .collect();
    match matching.as_slice() {
        [s] => Ok(s),
        [] => whatever!("No table source declared for role {:?}", role),
        _ => whatever!("More than one table source declared for role {:?}", role),
    }
}

fn validate_field(fc: &FieldConfig) -> RecResult<FieldSpec> {
    let domain = match fc.domain.as_str() {
        "likert" | "categorical" => {
            let vocabulary = match &fc.vocabulary {
                Some(pairs) if !pairs.is_empty() => Vocabulary::from_entries(pairs.clone()),
                _ => whatever!(
                    "Field {:?} has domain {:?} but no vocabulary",
                    fc.name,
                    fc.domain
                ),
            };
            if fc.domain == "likert" {
                Domain::Likert(vocabulary)
            } else {
                Domain::Categorical(vocabulary)
            }
        }
        "count" => Domain::Count,
        "freeText" => Domain::FreeText,
        x => whatever!("Unknown field domain {:?} for field {:?}", x, fc.name),
    };
    if fc.aliases.is_empty() {
        whatever!("Field {:?} declares no header aliases", fc.name);
    }
    Ok(FieldSpec {
        name: fc.name.clone(),
        aliases: fc.aliases.clone(),
        domain,
    })
}

/// Validates the configured schema into the engine's types. All policy data
/// (aliases, vocabularies) comes from the configuration; nothing is
/// hardcoded here.
pub fn validate_schema(sc: &SchemaConfig) -> RecResult<Schema> {
    let identifier = validate_field(&sc.identifier)?;
    let attendance = validate_field(&sc.attendance)?;
    let mut pre_fields: Vec<FieldSpec> = Vec::new();
    for fc in sc.pre_fields.iter() {
        pre_fields.push(validate_field(fc)?);
    }
    let mut post_fields: Vec<FieldSpec> = Vec::new();
    for fc in sc.post_fields.iter() {
        post_fields.push(validate_field(fc)?);
    }
    Ok(Schema {
        identifier,
        attendance,
        pre_fields,
        post_fields,
    })
}

pub fn validate_options(mc: Option<&MatchingConfig>) -> RecResult<MatchOptions> {
    let mut options = MatchOptions::DEFAULT_OPTIONS;
    if let Some(mc) = mc {
        if let Some(threshold) = mc.header_match_threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                whatever!("headerMatchThreshold must be in (0, 1], got {}", threshold);
            }
            options.header_match_threshold = threshold;
        }
        if let Some(labels) = &mc.identifier_ignore_labels {
            options.identifier_ignore_labels = labels.clone();
        }
    }
    Ok(options)
}

fn read_js_int(x: &Option<JSValue>) -> RecResult<usize> {
    match x {
        Some(JSValue::Number(n)) => n
            .as_u64()
            .map(|x| x as usize)
            .context(ParsingJsonNumberSnafu {}),
        Some(JSValue::String(s)) => s.parse::<usize>().ok().context(ParsingJsonNumberSnafu {}),
        _ => None.context(ParsingJsonNumberSnafu {}),
    }
}
