//! Parser for the primary results table.
//!
//! The table is embedded in a text report: free-form preamble, a header line
//! whose first token is `Sample`, whitespace-separated data rows, then a
//! blank line followed by trailing notes.

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::AggregationError;

/// First token of the header line.
pub const HEADER_MARKER: &str = "Sample";

/// One data row: column name to raw field value, in header order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    /// 1-based line number in the source file.
    #[serde(skip)]
    pub line: usize,
    #[serde(flatten)]
    pub fields: IndexMap<String, String>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    pub fn get_index(&self, index: usize) -> Option<&str> {
        self.fields.get_index(index).map(|(_, v)| v.as_str())
    }
}

/// The parsed table: ordered columns and ordered rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultsTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultsTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of `name`, or `MissingColumn`.
    pub fn require_column(&self, name: &str) -> Result<usize, AggregationError> {
        self.column_index(name)
            .ok_or_else(|| AggregationError::MissingColumn(name.to_string()))
    }
}

/// Parse the results table out of a full report.
pub fn parse_table(text: &str) -> Result<ResultsTable, AggregationError> {
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l));

    let columns: Vec<String> = lines
        .by_ref()
        .map(|(_, line)| line.split_whitespace().collect::<Vec<_>>())
        .find(|tokens| tokens.first() == Some(&HEADER_MARKER))
        .ok_or(AggregationError::MissingHeader)?
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (line_no, line) in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            break;
        }
        if fields.len() < columns.len() {
            return Err(AggregationError::MalformedTable {
                line: line_no,
                expected: columns.len(),
                found: fields.len(),
            });
        }
        let fields = columns
            .iter()
            .cloned()
            .zip(fields.into_iter().map(str::to_string))
            .collect();
        rows.push(Row {
            line: line_no,
            fields,
        });
    }

    Ok(ResultsTable { columns, rows })
}

// ---------------------------------------------------------------------------
// Score column selection
// ---------------------------------------------------------------------------

/// Header name ranked by default.
pub const DEFAULT_SCORE_NAME: &str = "Score";

/// Position of the size-in-bp column in triPOD's own report.
pub const TRIPOD_SCORE_INDEX: usize = 8;

/// Which column ranks rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreColumn {
    /// Column by header name.
    Named(String),
    /// Column by 0-based position in the header.
    Index(usize),
    /// Column by header name, or by position when the header lacks it.
    NamedOrIndex(String, usize),
}

/// `Score` when the header has it, otherwise triPOD's column 8.
impl Default for ScoreColumn {
    fn default() -> Self {
        Self::NamedOrIndex(DEFAULT_SCORE_NAME.to_string(), TRIPOD_SCORE_INDEX)
    }
}

impl ScoreColumn {
    /// A purely numeric value selects by position, anything else by name.
    pub fn from_config(value: &str) -> Self {
        let value = value.trim();
        match value.parse::<usize>() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Named(value.to_string()),
        }
    }

    /// Resolve to a column index in `table`.
    pub fn resolve(&self, table: &ResultsTable) -> Result<usize, AggregationError> {
        match self {
            Self::Named(name) => table.require_column(name),
            Self::Index(index) if *index < table.columns.len() => Ok(*index),
            Self::Index(index) => Err(AggregationError::MissingColumn(format!("#{index}"))),
            Self::NamedOrIndex(name, index) => table
                .column_index(name)
                .or_else(|| (*index < table.columns.len()).then_some(*index))
                .ok_or_else(|| AggregationError::MissingColumn(name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_header_and_rows() {
        let text = "\nSample Chr Start End Score\ns1 1 100 200 5\ns1 2 150 250 9\n\n";
        let table = parse_table(text).unwrap();
        assert_eq!(table.columns, ["Sample", "Chr", "Start", "End", "Score"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].get("Start"), Some("150"));
        assert_eq!(table.rows[1].get("Score"), Some("9"));
        assert_eq!(table.rows[0].line, 3);
        let keys: Vec<&String> = table.rows[0].fields.keys().collect();
        assert_eq!(keys, ["Sample", "Chr", "Start", "End", "Score"]);
    }

    #[test]
    fn skips_preamble_and_stops_at_blank_line() {
        let text = "triPOD v2.0\nrun on 2 cores\n\nSample Chr Start End Score\n\
                    s1 3 1 2 4\n\nDetection summary\nnot a row at all\n";
        let table = parse_table(text).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].get("Chr"), Some("3"));
    }

    #[test]
    fn header_without_rows_is_empty_table() {
        let table = parse_table("Sample Chr Start End Score\n").unwrap();
        assert_eq!(table.columns.len(), 5);
        assert!(table.rows.is_empty());
    }

    #[test]
    fn missing_header_is_reported() {
        assert_matches!(
            parse_table("no table here\n1 2 3\n"),
            Err(AggregationError::MissingHeader)
        );
    }

    #[test]
    fn short_row_is_malformed() {
        let text = "Sample Chr Start End Score\ns1 1 100\n";
        assert_matches!(
            parse_table(text),
            Err(AggregationError::MalformedTable { line: 2, expected: 5, found: 3 })
        );
    }

    #[test]
    fn extra_fields_are_ignored() {
        let text = "Sample Chr\ns1 1 trailing notes\n";
        let table = parse_table(text).unwrap();
        assert_eq!(table.rows[0].fields.len(), 2);
    }

    #[test]
    fn row_serializes_as_flat_map() {
        let table = parse_table("Sample Chr\ns1 7\n").unwrap();
        let json = serde_json::to_value(&table.rows[0]).unwrap();
        assert_eq!(json, serde_json::json!({"Sample": "s1", "Chr": "7"}));
    }

    #[test]
    fn score_column_resolution() {
        let table = parse_table("Sample Chr Start End Size(bp)\n").unwrap();
        assert_eq!(ScoreColumn::from_config("4").resolve(&table).unwrap(), 4);
        assert_eq!(
            ScoreColumn::from_config("Size(bp)").resolve(&table).unwrap(),
            4
        );
        assert_matches!(
            ScoreColumn::default().resolve(&table),
            Err(AggregationError::MissingColumn(name)) if name == "Score"
        );
        assert_matches!(
            ScoreColumn::Index(9).resolve(&table),
            Err(AggregationError::MissingColumn(_))
        );
    }

    #[test]
    fn default_score_falls_back_to_tripod_column() {
        let tripod = parse_table(
            "Sample Chr Start End SNPs Median Type Call Size(bp) Fam
",
        )
        .unwrap();
        assert_eq!(ScoreColumn::default().resolve(&tripod).unwrap(), 8);

        let named = parse_table("Sample Chr Start End A B C D E Score
").unwrap();
        assert_eq!(ScoreColumn::default().resolve(&named).unwrap(), 9);
    }
}
