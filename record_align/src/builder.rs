pub use crate::config::RawTable;

/// A builder for assembling in-memory tables.
///
/// Mostly useful for tests and for library consumers that already hold table
/// data in memory rather than in files.
///
/// ```
/// use record_align::builder::TableBuilder;
///
/// let table = TableBuilder::new("preSurvey", &["Personal Identifier", "Confidence"])
///     .with_row(&["AB", "Strongly Agree"])
///     .with_row(&["CD", ""])
///     .build();
///
/// assert_eq!(table.rows.len(), 2);
/// assert_eq!(table.cell(0, 1), "Strongly Agree");
/// ```
pub struct TableBuilder {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableBuilder {
    pub fn new(name: &str, headers: &[&str]) -> TableBuilder {
        TableBuilder {
            name: name.to_string(),
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends one data row. Rows shorter than the header are fine; the
    /// engine reads cells past the end of a row as blank.
    pub fn with_row(mut self, cells: &[&str]) -> TableBuilder {
        self.rows.push(cells.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn build(self) -> RawTable {
        RawTable {
            name: self.name,
            headers: self.headers,
            rows: self.rows,
        }
    }
}
