// ********* Input data structures ***********

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;

use crate::normalize::normalize_token;

/// A table as exported from a spreadsheet: a header row plus zero or more
/// data rows, every cell a string. Spreadsheets carry no native types, so
/// all typing happens downstream in the normalizer.
///
/// Rows may be ragged (shorter than the header); the engine treats cells
/// past the end of a row as blank.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// The cell at (row, column), or an empty string when the row is too short.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(|s| s.as_str())
            .unwrap_or("")
    }
}

/// An explicit word-to-code lookup for one field.
///
/// Keys are compared after trimming, case folding and whitespace collapsing,
/// so "Strongly Agree " and "strongly agree" hit the same entry.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Vocabulary {
    entries: Vec<(String, i64)>,
}

impl Vocabulary {
    pub fn new(pairs: &[(&str, i64)]) -> Vocabulary {
        Vocabulary {
            entries: pairs
                .iter()
                .map(|(word, code)| (normalize_token(word), *code))
                .collect(),
        }
    }

    pub fn from_entries(pairs: Vec<(String, i64)>) -> Vocabulary {
        Vocabulary {
            entries: pairs
                .into_iter()
                .map(|(word, code)| (normalize_token(&word), code))
                .collect(),
        }
    }

    pub fn lookup(&self, raw: &str) -> Option<i64> {
        let key = normalize_token(raw);
        self.entries
            .iter()
            .find(|(word, _)| *word == key)
            .map(|(_, code)| *code)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The expected value domain of one canonical field.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Domain {
    /// Ordered scale answers ("Strongly Disagree" .. "Strongly Agree").
    Likert(Vocabulary),
    /// A fixed set of labels without ordering ("PGY2", "Yes"/"No").
    Categorical(Vocabulary),
    /// An unsigned integer (attendance counts in the master table).
    Count,
    /// Free text carried through as-is (short write-in answers).
    FreeText,
}

/// One fixed, named slot in the target schema, with the header wordings it
/// is known under and the value domain of its cells.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub aliases: Vec<String>,
    pub domain: Domain,
}

/// The canonical schema: the participant identifier, the derived attendance
/// count, and the survey question fields split by stage. A question asked in
/// both surveys appears as two distinct fields, one per stage.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Schema {
    pub identifier: FieldSpec,
    pub attendance: FieldSpec,
    pub pre_fields: Vec<FieldSpec>,
    pub post_fields: Vec<FieldSpec>,
}

/// Knobs for the fuzzy header matching and identifier alignment.
/// These are policy data: form wording drifts across survey revisions, so
/// they are supplied externally rather than hardcoded.
#[derive(PartialEq, Debug, Clone)]
pub struct MatchOptions {
    /// Minimum similarity score for a header cell to be accepted for a field.
    pub header_match_threshold: f64,
    /// Identifier cells containing one of these labels are instruction rows
    /// left behind by the form export; they are skipped without a report.
    pub identifier_ignore_labels: Vec<String>,
}

impl MatchOptions {
    pub const DEFAULT_OPTIONS: MatchOptions = MatchOptions {
        header_match_threshold: 0.6,
        identifier_ignore_labels: Vec::new(),
    };
}

// ********* Normalized values *********

/// The three-way state of a normalized cell, plus the valid payloads.
///
/// `Missing` (the respondent left it blank or the column is absent) and
/// `Unparseable` (non-blank text that matched no vocabulary entry) are kept
/// distinct on purpose: zero is a valid Likert code, and a typo is a data
/// entry anomaly that staff should see, not silently drop.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Value {
    Missing,
    Unparseable,
    Code(i64),
    Count(u64),
    Flag(bool),
    Text(String),
}

impl Value {
    /// True for payloads that may be written to the master table.
    pub fn is_valid(&self) -> bool {
        !matches!(self, Value::Missing | Value::Unparseable)
    }
}

// ******** Output data structures *********

/// The merged target for one participant: one response set per survey stage
/// plus the attendance facts. Attendance and survey completion are
/// independent; either side may be entirely missing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ParticipantRecord {
    pub identifier: String,
    pub pre: HashMap<String, Value>,
    pub post: HashMap<String, Value>,
    pub attendance_count: u64,
    pub attended: bool,
}

/// A single cell patch against the master table. `row` indexes the master's
/// data rows and `column` its header cells, both 0-based; translating to
/// absolute sheet coordinates is the caller's concern.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CellUpdate {
    pub row: usize,
    pub column: usize,
    pub value: Value,
}

/// A whole new master row for an identifier not present yet, laid out in
/// master column order. Positions without a fact hold `Value::Missing` and
/// must stay absent in the sheet.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RowAppend {
    pub identifier: String,
    pub values: Vec<Value>,
}

/// The minimal patch set for one run: changed cells plus appended rows.
/// An empty write set on a re-run with unchanged inputs is the idempotence
/// contract.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct WriteSet {
    pub updates: Vec<CellUpdate>,
    pub appends: Vec<RowAppend>,
}

impl WriteSet {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.appends.is_empty()
    }
}

/// A recoverable anomaly observed during a run. None of these stop the run;
/// they are accumulated and surfaced at the end for human review.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Anomaly {
    /// A non-identifier field found no header cell above the threshold.
    UnmatchedField { table: String, field: String },
    /// A non-blank cell matched no vocabulary entry.
    UnparseableResponse {
        table: String,
        row: usize,
        field: String,
        raw: String,
    },
    /// A data row without an identifier, excluded from alignment.
    EmptyIdentifier { table: String, row: usize },
}

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RunReport {
    pub anomalies: Vec<Anomaly>,
}

impl RunReport {
    pub fn new() -> RunReport {
        RunReport::default()
    }

    pub fn push(&mut self, anomaly: Anomaly) {
        self.anomalies.push(anomaly);
    }

    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }
}

/// The outcome of a full reconciliation run.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ReconcileResult {
    pub records: Vec<ParticipantRecord>,
    pub write_set: WriteSet,
    pub report: RunReport,
}

/// Errors that prevent a run from completing. Everything else is an
/// `Anomaly` in the run report.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ReconcileErrors {
    /// The identifier column could not be resolved in the named table.
    /// All alignment depends on it, so the run aborts before any write.
    SchemaMismatch { table: String },
}

impl Error for ReconcileErrors {}

impl Display for ReconcileErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileErrors::SchemaMismatch { table } => {
                write!(f, "identifier column unresolved in table {}", table)
            }
        }
    }
}
