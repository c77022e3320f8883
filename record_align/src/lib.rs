mod config;
mod header;
mod normalize;
pub mod builder;

use log::{debug, info};

use std::collections::{HashMap, HashSet};

pub use crate::config::*;
pub use crate::header::{resolve_headers, similarity, HeaderMap};
pub use crate::normalize::normalize_response;

/// The three input tables of one run. The master table is passed separately:
/// it is read-then-patch state, not a source of facts.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SourceTables {
    pub pre_survey: RawTable,
    pub post_survey: RawTable,
    pub attendance: RawTable,
}

/// The identifier-to-rows mapping for one table, in first-appearance order.
///
/// Identifiers are compared after normalization (trim + case fold) so
/// formatting differences do not split one participant into two buckets.
/// An identifier occurring once yields one response set; multiplicity in the
/// attendance log is the attendance count.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct IdentifierIndex {
    order: Vec<String>,
    rows: HashMap<String, Vec<usize>>,
    /// Data rows excluded because their identifier cell was blank.
    pub skipped_rows: Vec<usize>,
}

impl IdentifierIndex {
    pub fn identifiers(&self) -> &[String] {
        &self.order
    }

    pub fn rows(&self, identifier: &str) -> Option<&[usize]> {
        self.rows.get(identifier).map(|r| r.as_slice())
    }

    pub fn first_row(&self, identifier: &str) -> Option<usize> {
        self.rows
            .get(identifier)
            .and_then(|r| r.first())
            .copied()
    }
}

/// Canonical form of a participant identifier.
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Builds the identifier index for one table. Rows with a blank identifier
/// are excluded and listed in `skipped_rows`; rows whose identifier contains
/// a configured ignore label (instruction text smeared into the export) are
/// dropped without trace.
pub fn align_identifiers(
    table: &RawTable,
    identifier_column: usize,
    options: &MatchOptions,
) -> IdentifierIndex {
    let ignore: Vec<String> = options
        .identifier_ignore_labels
        .iter()
        .map(|l| normalize_identifier(l))
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut rows: HashMap<String, Vec<usize>> = HashMap::new();
    let mut skipped_rows: Vec<usize> = Vec::new();

    for row_idx in 0..table.rows.len() {
        let id = normalize_identifier(table.cell(row_idx, identifier_column));
        if id.is_empty() {
            skipped_rows.push(row_idx);
            continue;
        }
        if ignore.iter().any(|l| !l.is_empty() && id.contains(l.as_str())) {
            debug!(
                "align_identifiers: {}: row {} matches an ignore label, skipping",
                table.name, row_idx
            );
            continue;
        }
        let entry = rows.entry(id.clone()).or_default();
        if entry.is_empty() {
            order.push(id);
        }
        entry.push(row_idx);
    }

    IdentifierIndex {
        order,
        rows,
        skipped_rows,
    }
}

/// Attendance facts for one identifier: multiplicity in the attendance log
/// and the derived presence flag. Attendance and survey completion are
/// independent facts; an identifier absent from both surveys still gets a
/// full attendance record.
pub fn derive_attendance(attendance: &IdentifierIndex, identifier: &str) -> (u64, bool) {
    let count = attendance
        .rows(identifier)
        .map(|r| r.len() as u64)
        .unwrap_or(0);
    (count, count >= 1)
}

/// Normalizes every cell of one survey table into per-identifier response
/// sets. Fields without a resolved column read as `Missing` for every row.
/// Unparseable cells are reported, never dropped silently.
fn collect_responses(
    table: &RawTable,
    map: &HeaderMap,
    index: &IdentifierIndex,
    fields: &[FieldSpec],
    report: &mut RunReport,
) -> HashMap<String, HashMap<String, Value>> {
    let mut out: HashMap<String, HashMap<String, Value>> = HashMap::new();
    for id in index.identifiers() {
        let occurrences = index.rows(id).unwrap_or(&[]);
        if occurrences.len() > 1 {
            debug!(
                "collect_responses: {}: identifier {:?} occurs {} times, keeping the first row",
                table.name,
                id,
                occurrences.len()
            );
        }
        let row = match occurrences.first() {
            Some(r) => *r,
            None => continue,
        };
        let mut responses: HashMap<String, Value> = HashMap::new();
        for field in fields {
            let value = match map.column(&field.name) {
                Some(col) => {
                    let raw = table.cell(row, col);
                    let value = normalize_response(raw, &field.domain);
                    if value == Value::Unparseable {
                        report.push(Anomaly::UnparseableResponse {
                            table: table.name.clone(),
                            row,
                            field: field.name.clone(),
                            raw: raw.to_string(),
                        });
                    }
                    value
                }
                None => Value::Missing,
            };
            responses.insert(field.name.clone(), value);
        }
        out.insert(id.clone(), responses);
    }
    out
}

/// Computes the minimal patch set for the master table from the merged
/// records. Pure: no IO, no mutation of the snapshot.
///
/// Per target cell: an existing non-blank master value always wins; a valid
/// normalized value fills a blank cell; `Missing` and `Unparseable` are
/// never written. Identifiers absent from the master become appended rows,
/// in the order the records are given.
pub fn plan_merge(
    master: &RawTable,
    master_map: &HeaderMap,
    schema: &Schema,
    records: &[ParticipantRecord],
    options: &MatchOptions,
) -> WriteSet {
    let master_index = align_identifiers(master, master_map.identifier_column, options);

    let mut updates: Vec<CellUpdate> = Vec::new();
    let mut appends: Vec<RowAppend> = Vec::new();

    for record in records {
        let facts = record_facts(record, schema);

        match master_index.first_row(&record.identifier) {
            Some(row) => {
                for (field_name, value) in facts.iter() {
                    let col = match master_map.column(field_name) {
                        Some(c) => c,
                        None => continue,
                    };
                    if !master.cell(row, col).trim().is_empty() {
                        // Already filled in, possibly by hand. Leave it.
                        continue;
                    }
                    if value.is_valid() {
                        updates.push(CellUpdate {
                            row,
                            column: col,
                            value: value.clone(),
                        });
                    }
                }
            }
            None => {
                let mut values = vec![Value::Missing; master.headers.len()];
                if let Some(slot) = values.get_mut(master_map.identifier_column) {
                    *slot = Value::Text(record.identifier.clone());
                }
                for (field_name, value) in facts.iter() {
                    if let Some(col) = master_map.column(field_name) {
                        if value.is_valid() {
                            if let Some(slot) = values.get_mut(col) {
                                *slot = value.clone();
                            }
                        }
                    }
                }
                appends.push(RowAppend {
                    identifier: record.identifier.clone(),
                    values,
                });
            }
        }
    }

    WriteSet { updates, appends }
}

/// Flattens one record into (canonical field name, value) pairs in master
/// column vocabulary: attendance count first, then the pre fields, then the
/// post fields.
fn record_facts(record: &ParticipantRecord, schema: &Schema) -> Vec<(String, Value)> {
    let mut facts: Vec<(String, Value)> = Vec::new();
    facts.push((
        schema.attendance.name.clone(),
        Value::Count(record.attendance_count),
    ));
    for field in schema.pre_fields.iter() {
        let value = record.pre.get(&field.name).cloned().unwrap_or(Value::Missing);
        facts.push((field.name.clone(), value));
    }
    for field in schema.post_fields.iter() {
        let value = record.post.get(&field.name).cloned().unwrap_or(Value::Missing);
        facts.push((field.name.clone(), value));
    }
    facts
}

/// Runs the full reconciliation pipeline over one snapshot of the four
/// tables.
///
/// Fails fast only when an identifier column cannot be resolved; every other
/// anomaly is accumulated into the run report. The returned write set is
/// empty when a previous run already recorded everything the sources show
/// (the idempotence contract).
pub fn run_reconciliation(
    sources: &SourceTables,
    master: &RawTable,
    schema: &Schema,
    options: &MatchOptions,
) -> Result<ReconcileResult, ReconcileErrors> {
    info!(
        "run_reconciliation: pre {} rows, post {} rows, attendance {} rows, master {} rows",
        sources.pre_survey.rows.len(),
        sources.post_survey.rows.len(),
        sources.attendance.rows.len(),
        master.rows.len()
    );

    let mut report = RunReport::new();

    // Header resolution. The identifier must resolve everywhere before any
    // write is planned.
    let pre_map = resolve_headers(&sources.pre_survey, &schema.identifier, &schema.pre_fields, options)?;
    let post_map = resolve_headers(&sources.post_survey, &schema.identifier, &schema.post_fields, options)?;
    let att_map = resolve_headers(&sources.attendance, &schema.identifier, &[], options)?;
    let master_fields: Vec<FieldSpec> = {
        let mut fields = vec![schema.attendance.clone()];
        fields.extend(schema.pre_fields.iter().cloned());
        fields.extend(schema.post_fields.iter().cloned());
        fields
    };
    let master_map = resolve_headers(master, &schema.identifier, &master_fields, options)?;

    for map in [&pre_map, &post_map, &att_map, &master_map] {
        for field in map.unmatched.iter() {
            report.push(Anomaly::UnmatchedField {
                table: map.table.clone(),
                field: field.clone(),
            });
        }
    }

    // Alignment.
    let pre_index = align_identifiers(&sources.pre_survey, pre_map.identifier_column, options);
    let post_index = align_identifiers(&sources.post_survey, post_map.identifier_column, options);
    let att_index = align_identifiers(&sources.attendance, att_map.identifier_column, options);

    for (table, index) in [
        (&sources.pre_survey, &pre_index),
        (&sources.post_survey, &post_index),
        (&sources.attendance, &att_index),
    ] {
        for row in index.skipped_rows.iter() {
            report.push(Anomaly::EmptyIdentifier {
                table: table.name.clone(),
                row: *row,
            });
        }
    }

    // Normalization.
    let mut pre_responses =
        collect_responses(&sources.pre_survey, &pre_map, &pre_index, &schema.pre_fields, &mut report);
    let mut post_responses =
        collect_responses(&sources.post_survey, &post_map, &post_index, &schema.post_fields, &mut report);

    // Union of identifiers in first-appearance order: pre, then post, then
    // attendance. This fixes the append order for new master rows.
    let mut order: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for index in [&pre_index, &post_index, &att_index] {
        for id in index.identifiers() {
            if seen.insert(id.clone()) {
                order.push(id.clone());
            }
        }
    }
    debug!("run_reconciliation: {} distinct identifiers", order.len());

    let records: Vec<ParticipantRecord> = order
        .iter()
        .map(|id| {
            let (attendance_count, attended) = derive_attendance(&att_index, id);
            ParticipantRecord {
                identifier: id.clone(),
                pre: pre_responses.remove(id).unwrap_or_default(),
                post: post_responses.remove(id).unwrap_or_default(),
                attendance_count,
                attended,
            }
        })
        .collect();

    let write_set = plan_merge(master, &master_map, schema, &records, options);

    info!(
        "run_reconciliation: {} records, {} cell updates, {} appended rows, {} anomalies",
        records.len(),
        write_set.updates.len(),
        write_set.appends.len(),
        report.anomalies.len()
    );

    Ok(ReconcileResult {
        records,
        write_set,
        report,
    })
}
