use std::collections::HashMap;

use log::debug;

use crate::config::{FieldSpec, MatchOptions, RawTable, ReconcileErrors};

/// The resolved column layout of one table: canonical field name to column
/// position. Fields that found no acceptable header cell are listed in
/// `unmatched`; their cells read as missing for every row of the table.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct HeaderMap {
    pub table: String,
    pub identifier_column: usize,
    columns: HashMap<String, usize>,
    pub unmatched: Vec<String>,
}

impl HeaderMap {
    pub fn column(&self, field_name: &str) -> Option<usize> {
        self.columns.get(field_name).copied()
    }
}

/// Resolves a table's header row against the given fields.
///
/// Each field is scored against every header cell in two passes: first
/// normalized substring containment (an alias wholly contained in a header
/// is an immediate accept), then the similarity ratio against the acceptance
/// threshold. Ties are broken by the leftmost column. A field below the
/// threshold everywhere is recorded as unmatched, never misassigned.
///
/// Failing to resolve the identifier itself is fatal: every downstream step
/// aligns on it.
pub fn resolve_headers(
    table: &RawTable,
    identifier: &FieldSpec,
    fields: &[FieldSpec],
    options: &MatchOptions,
) -> Result<HeaderMap, ReconcileErrors> {
    let normalized: Vec<String> = table.headers.iter().map(|h| normalize_header(h)).collect();

    let identifier_column = best_column(
        &identifier.aliases,
        &normalized,
        options.header_match_threshold,
    )
    .ok_or_else(|| ReconcileErrors::SchemaMismatch {
        table: table.name.clone(),
    })?;

    let mut columns: HashMap<String, usize> = HashMap::new();
    let mut unmatched: Vec<String> = Vec::new();
    for field in fields {
        match best_column(&field.aliases, &normalized, options.header_match_threshold) {
            Some(col) => {
                debug!(
                    "resolve_headers: {}: field {:?} -> column {} ({:?})",
                    table.name, field.name, col, table.headers[col]
                );
                columns.insert(field.name.clone(), col);
            }
            None => {
                debug!(
                    "resolve_headers: {}: field {:?} unmatched",
                    table.name, field.name
                );
                unmatched.push(field.name.clone());
            }
        }
    }

    Ok(HeaderMap {
        table: table.name.clone(),
        identifier_column,
        columns,
        unmatched,
    })
}

/// Similarity ratio between two normalized strings in [0, 1]:
/// 2 * LCS(a, b) / (|a| + |b|), computed on characters. 1.0 means equal,
/// 0.0 means nothing in common. Deterministic and order-sensitive only in
/// its arguments' content, never in iteration order.
pub fn similarity(a: &str, b: &str) -> f64 {
    let xa: Vec<char> = a.chars().collect();
    let xb: Vec<char> = b.chars().collect();
    if xa.is_empty() && xb.is_empty() {
        return 1.0;
    }
    if xa.is_empty() || xb.is_empty() {
        return 0.0;
    }
    // Two-row LCS table.
    let mut prev = vec![0usize; xb.len() + 1];
    let mut cur = vec![0usize; xb.len() + 1];
    for ca in xa.iter() {
        for (j, cb) in xb.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    let lcs = prev[xb.len()];
    (2.0 * lcs as f64) / ((xa.len() + xb.len()) as f64)
}

/// Best-scoring column for a set of aliases, or None when every score is
/// below the threshold. `headers` must already be normalized.
fn best_column(aliases: &[String], headers: &[String], threshold: f64) -> Option<usize> {
    let aliases_norm: Vec<String> = aliases.iter().map(|a| normalize_header(a)).collect();

    // Pass 1: containment.
    for (col, header) in headers.iter().enumerate() {
        if aliases_norm
            .iter()
            .any(|a| !a.is_empty() && header.contains(a.as_str()))
        {
            return Some(col);
        }
    }

    // Pass 2: fuzzy scoring, strictly-greater comparison keeps the leftmost
    // column on ties.
    let mut best: Option<(f64, usize)> = None;
    for (col, header) in headers.iter().enumerate() {
        for alias in aliases_norm.iter() {
            let score = similarity(alias, header);
            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, col));
            }
        }
    }
    match best {
        Some((score, col)) if score >= threshold => Some(col),
        _ => None,
    }
}

/// Header cells and aliases are compared case folded, with question marks
/// dropped and whitespace collapsed, mirroring how form exports reword
/// questions between revisions.
fn normalize_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.trim().chars() {
        if c == '?' {
            continue;
        }
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.extend(c.to_lowercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Domain;

    fn field(name: &str, aliases: &[&str]) -> FieldSpec {
        FieldSpec {
            name: name.to_string(),
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
            domain: Domain::FreeText,
        }
    }

    fn table(name: &str, headers: &[&str]) -> RawTable {
        RawTable {
            name: name.to_string(),
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: vec![],
        }
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(similarity("confidence", "confidence"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        let s = similarity("confidence level", "confidence");
        assert!(s > 0.6 && s < 1.0, "got {}", s);
    }

    #[test]
    fn reworded_header_matches_by_containment() {
        let t = table(
            "postSurvey",
            &["Timestamp", "Post-Survey: Confidence Level", "Personal Identifier:"],
        );
        let map = resolve_headers(
            &t,
            &field("identifier", &["personal identifier"]),
            &[field("confidence_level", &["confidence"])],
            &MatchOptions::DEFAULT_OPTIONS,
        )
        .unwrap();
        assert_eq!(map.identifier_column, 2);
        assert_eq!(map.column("confidence_level"), Some(1));
        assert!(map.unmatched.is_empty());
    }

    #[test]
    fn question_marks_and_case_are_ignored() {
        let t = table("preSurvey", &["ID", "Do you feel CONFIDENT?"]);
        let map = resolve_headers(
            &t,
            &field("identifier", &["id"]),
            &[field("confident", &["do you feel confident"])],
            &MatchOptions::DEFAULT_OPTIONS,
        )
        .unwrap();
        assert_eq!(map.column("confident"), Some(1));
    }

    #[test]
    fn below_threshold_is_unmatched_not_misassigned() {
        let t = table("preSurvey", &["Personal Identifier", "Favorite rotation"]);
        let map = resolve_headers(
            &t,
            &field("identifier", &["personal identifier"]),
            &[field("burnout_level", &["level of burnout"])],
            &MatchOptions::DEFAULT_OPTIONS,
        )
        .unwrap();
        assert_eq!(map.column("burnout_level"), None);
        assert_eq!(map.unmatched, vec!["burnout_level".to_string()]);
    }

    #[test]
    fn ties_break_to_the_leftmost_column() {
        // Both headers contain the alias; the first one wins.
        let t = table("attendance", &["Session A", "Session B", "Identifier"]);
        let map = resolve_headers(
            &t,
            &field("identifier", &["identifier"]),
            &[field("session", &["session"])],
            &MatchOptions::DEFAULT_OPTIONS,
        )
        .unwrap();
        assert_eq!(map.column("session"), Some(0));
    }

    #[test]
    fn missing_identifier_is_a_schema_mismatch() {
        let t = table("preSurvey", &["Timestamp", "Confidence"]);
        let res = resolve_headers(
            &t,
            &field("identifier", &["personal identifier"]),
            &[],
            &MatchOptions::DEFAULT_OPTIONS,
        );
        assert_eq!(
            res,
            Err(ReconcileErrors::SchemaMismatch {
                table: "preSurvey".to_string()
            })
        );
    }

    #[test]
    fn column_swap_does_not_change_resolution_targets() {
        let fields = [field("confidence", &["confidence"]), field("burnout", &["burnout"])];
        let id = field("identifier", &["identifier"]);
        let t1 = table("preSurvey", &["Identifier", "Confidence", "Burnout"]);
        let t2 = table("preSurvey", &["Identifier", "Burnout", "Confidence"]);
        let m1 = resolve_headers(&t1, &id, &fields, &MatchOptions::DEFAULT_OPTIONS).unwrap();
        let m2 = resolve_headers(&t2, &id, &fields, &MatchOptions::DEFAULT_OPTIONS).unwrap();
        assert_eq!(m1.column("confidence"), Some(1));
        assert_eq!(m2.column("confidence"), Some(2));
        assert_eq!(m1.column("burnout"), Some(2));
        assert_eq!(m2.column("burnout"), Some(1));
    }
}
