//! Gradebook roster loading.
//!
//! The roster is the authoritative per-student table exported by the learning
//! platform. It can arrive as delimited text or as an Excel workbook; both are
//! reduced to a trimmed header row plus raw string cells. Accessors trim
//! cells on read; only the online text is handed over untouched.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use calamine::{open_workbook_auto, DataType, Reader};
use tracing::{info, warn};

use crate::error::{GraderError, Result};

pub const FULL_NAME_COLUMN: &str = "Full name";
pub const STATUS_COLUMN: &str = "Status";
pub const ONLINE_TEXT_COLUMN: &str = "Online text";
pub const IDENTIFIER_COLUMN: &str = "Identifier";
pub const EMAIL_COLUMN: &str = "Email address";
pub const GRADE_COLUMN: &str = "Grade";
pub const FEEDBACK_COLUMN: &str = "Feedback comments";

#[derive(Debug, Clone)]
struct RosterColumns {
    full_name: usize,
    status: usize,
    online_text: Option<usize>,
    identifier: Option<usize>,
    email: Option<usize>,
    grade: Option<usize>,
    feedback: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Roster {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    header_map: HashMap<String, usize>,
    columns: RosterColumns,
}

/// Borrowed view of one gradebook row.
#[derive(Debug, Clone, Copy)]
pub struct RosterRow<'a> {
    index: usize,
    values: &'a [String],
    columns: &'a RosterColumns,
}

impl Roster {
    /// Reads a gradebook from disk, dispatching on the file extension.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(GraderError::RosterNotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase();

        let (headers, rows) = if matches!(extension.as_str(), "xlsx" | "xlsm" | "xls" | "xlsb") {
            read_excel_table(path)?
        } else {
            let data = fs::read(path).map_err(|err| {
                GraderError::RosterRead(format!("'{}': {err}", path.display()))
            })?;
            read_delimited_table(&data)?
        };

        let roster = Self::from_table(headers, rows)?;
        info!(
            path = %path.display(),
            rows = roster.len(),
            "Loaded gradebook"
        );
        Ok(roster)
    }

    /// Parses delimited gradebook text (tab, comma or semicolon separated).
    pub fn from_delimited_bytes(data: &[u8]) -> Result<Self> {
        let (headers, rows) = read_delimited_table(data)?;
        Self::from_table(headers, rows)
    }

    /// Builds a roster from an already parsed table, validating that the
    /// identity and status columns exist.
    pub fn from_table(mut headers: Vec<String>, mut rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some(first) = headers.first_mut() {
            *first = first.trim_start_matches('\u{FEFF}').trim().to_string();
        }
        align_row_lengths(&mut headers, &mut rows);

        let header_map = build_header_index_map(&headers);
        let lookup = |label: &str| header_map.get(&label.to_lowercase()).copied();

        let mut missing = Vec::new();
        let full_name = lookup(FULL_NAME_COLUMN);
        let status = lookup(STATUS_COLUMN);
        if status.is_none() {
            missing.push(STATUS_COLUMN.to_string());
        }
        if full_name.is_none() {
            missing.push(FULL_NAME_COLUMN.to_string());
        }

        let (Some(full_name), Some(status)) = (full_name, status) else {
            return Err(GraderError::MissingColumns(missing));
        };

        let columns = RosterColumns {
            full_name,
            status,
            online_text: lookup(ONLINE_TEXT_COLUMN),
            identifier: lookup(IDENTIFIER_COLUMN),
            email: lookup(EMAIL_COLUMN),
            grade: lookup(GRADE_COLUMN),
            feedback: lookup(FEEDBACK_COLUMN),
        };

        Ok(Self {
            headers,
            rows,
            header_map,
            columns,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by case-insensitive header label.
    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.header_map.get(&label.trim().to_lowercase()).copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = RosterRow<'_>> + '_ {
        self.rows
            .iter()
            .enumerate()
            .map(move |(index, values)| RosterRow {
                index,
                values,
                columns: &self.columns,
            })
    }

    /// Names of the students whose status marks them as having submitted,
    /// in roster order.
    pub fn submitted_names(&self, submitted_status: &str) -> Vec<String> {
        self.rows()
            .filter(|row| row.status() == submitted_status)
            .map(|row| row.full_name().to_string())
            .collect()
    }

    /// First row whose full name equals `name`.
    pub fn find_by_name(&self, name: &str) -> Option<RosterRow<'_>> {
        self.rows().find(|row| row.full_name() == name)
    }
}

impl<'a> RosterRow<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn values(&self) -> &'a [String] {
        self.values
    }

    pub fn full_name(&self) -> &'a str {
        self.cell(self.columns.full_name)
    }

    pub fn status(&self) -> &'a str {
        self.cell(self.columns.status)
    }

    /// Raw inline submission text, present when it is non-blank.
    pub fn online_text(&self) -> Option<&'a str> {
        let raw = self
            .columns
            .online_text
            .and_then(|index| self.values.get(index))?;
        if raw.trim().is_empty() {
            None
        } else {
            Some(raw.as_str())
        }
    }

    pub fn identifier(&self) -> Option<&'a str> {
        self.optional_cell(self.columns.identifier)
    }

    pub fn email(&self) -> Option<&'a str> {
        self.optional_cell(self.columns.email)
    }

    pub fn feedback(&self) -> Option<&'a str> {
        self.optional_cell(self.columns.feedback)
    }

    /// Pre-existing grade, if the cell holds a number in range.
    pub fn grade(&self) -> Option<f64> {
        let raw = self.optional_cell(self.columns.grade)?;
        let value = match raw.replace(',', ".").parse::<f64>() {
            Ok(value) if value.is_finite() => value,
            _ => return None,
        };

        if (0.0..=100.0).contains(&value) {
            Some(value)
        } else {
            warn!(
                student = self.full_name(),
                grade = value,
                "Ignoring out-of-range grade from gradebook"
            );
            None
        }
    }

    fn cell(&self, index: usize) -> &'a str {
        self.values.get(index).map(|value| value.trim()).unwrap_or("")
    }

    fn optional_cell(&self, index: Option<usize>) -> Option<&'a str> {
        let value = self.cell(index?);
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

fn read_delimited_table(data: &[u8]) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let delimiter = detect_delimiter(data);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| GraderError::RosterRead(format!("unable to read headers: {err}")))?
        .iter()
        .map(|value| value.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|err| GraderError::RosterRead(format!("unable to read rows: {err}")))?;
        let values: Vec<String> = record.iter().map(str::to_string).collect();
        if values.iter().all(|value| value.trim().is_empty()) {
            continue;
        }
        rows.push(values);
    }

    Ok((headers, rows))
}

fn read_excel_table(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|err| GraderError::RosterRead(format!("unable to open the workbook: {err}")))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| GraderError::RosterRead("the workbook has no worksheets".into()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .ok_or_else(|| GraderError::RosterRead(format!("missing worksheet '{sheet_name}'")))?
        .map_err(|err| GraderError::RosterRead(format!("unable to read worksheet: {err}")))?;

    let mut rows_iter = range.rows();
    let header_row = rows_iter
        .next()
        .ok_or_else(|| GraderError::RosterRead("the worksheet is empty".into()))?;

    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell_to_string(cell).trim().to_string())
        .collect();
    let mut rows = Vec::new();
    for row in rows_iter {
        let values: Vec<String> = row.iter().map(cell_to_string).collect();
        if values.iter().all(|value| value.trim().is_empty()) {
            continue;
        }
        rows.push(values);
    }

    Ok((headers, rows))
}

fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::Empty => String::new(),
        _ => cell.to_string(),
    }
}

fn align_row_lengths(headers: &mut Vec<String>, rows: &mut [Vec<String>]) {
    let column_count = rows
        .iter()
        .map(Vec::len)
        .fold(headers.len(), usize::max);

    if headers.len() < column_count {
        headers.resize(column_count, String::new());
    }

    for row in rows.iter_mut() {
        row.resize(column_count, String::new());
    }
}

fn build_header_index_map(headers: &[String]) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (index, header) in headers.iter().enumerate() {
        let label = header.trim();
        let normalized = if label.is_empty() {
            format!("Column {}", index + 1)
        } else {
            label.to_string()
        };
        map.entry(normalized.to_lowercase()).or_insert(index);
    }
    map
}

/// Picks the delimiter that occurs most often on the first non-empty line.
fn detect_delimiter(data: &[u8]) -> u8 {
    let sample = String::from_utf8_lossy(&data[..data.len().min(64 * 1024)]);

    for line in sample.lines().take(5) {
        if line.trim().is_empty() {
            continue;
        }

        let counts = [
            (b'\t', line.matches('\t').count()),
            (b',', line.matches(',').count()),
            (b';', line.matches(';').count()),
        ];

        if let Some((delimiter, count)) = counts.iter().max_by_key(|(_, count)| *count) {
            if *count > 0 {
                return *delimiter;
            }
        }
    }

    b','
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRADEBOOK: &str = "\u{FEFF}Identifier,Full name,Email address,Status,Grade,Feedback comments,Online text\n\
Participant 1,Jane Doe,jane@example.edu,Submitted for grading,88,Nice work,<p>Answer</p>\n\
Participant 2,John Smith,john@example.edu,No submission,,,\n\
,,,,,,\n\
Participant 3,Ann Lee,,Submitted for grading,abc,,\n";

    #[test]
    fn parses_comma_separated_gradebook() {
        let roster = Roster::from_delimited_bytes(GRADEBOOK.as_bytes()).unwrap();
        assert_eq!(roster.len(), 3);
        assert_eq!(roster.headers()[0], "Identifier");

        let jane = roster.find_by_name("Jane Doe").unwrap();
        assert_eq!(jane.identifier(), Some("Participant 1"));
        assert_eq!(jane.email(), Some("jane@example.edu"));
        assert_eq!(jane.grade(), Some(88.0));
        assert_eq!(jane.feedback(), Some("Nice work"));
        assert_eq!(jane.online_text(), Some("<p>Answer</p>"));

        let ann = roster.find_by_name("Ann Lee").unwrap();
        assert_eq!(ann.email(), None);
        assert_eq!(ann.grade(), None);
        assert_eq!(ann.index(), 2);
    }

    #[test]
    fn submitted_names_follow_roster_order() {
        let roster = Roster::from_delimited_bytes(GRADEBOOK.as_bytes()).unwrap();
        assert_eq!(
            roster.submitted_names("Submitted for grading"),
            vec!["Jane Doe".to_string(), "Ann Lee".to_string()]
        );
    }

    #[test]
    fn detects_tab_delimiter() {
        let data = "Full name\tStatus\nJane Doe\tSubmitted for grading\n";
        let roster = Roster::from_delimited_bytes(data.as_bytes()).unwrap();
        assert_eq!(roster.find_by_name("Jane Doe").unwrap().status(), "Submitted for grading");
    }

    #[test]
    fn missing_status_column_is_fatal() {
        let data = "Full name,Email address\nJane Doe,jane@example.edu\n";
        match Roster::from_delimited_bytes(data.as_bytes()) {
            Err(GraderError::MissingColumns(columns)) => {
                assert_eq!(columns, vec!["Status".to_string()]);
            }
            other => panic!("expected missing column error, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_grade_is_ignored() {
        let data = "Full name,Status,Grade\nJane Doe,Submitted for grading,140\n";
        let roster = Roster::from_delimited_bytes(data.as_bytes()).unwrap();
        assert_eq!(roster.find_by_name("Jane Doe").unwrap().grade(), None);
    }

    #[test]
    fn online_text_keeps_surrounding_whitespace() {
        let data = "Full name,Status,Online text\n\
\" Jane Doe \",Submitted for grading,\"  indented\n  code  \"\n\
John Smith,Submitted for grading,\"   \"\n";
        let roster = Roster::from_delimited_bytes(data.as_bytes()).unwrap();

        let jane = roster.find_by_name("Jane Doe").unwrap();
        assert_eq!(jane.full_name(), "Jane Doe");
        assert_eq!(jane.online_text(), Some("  indented\n  code  "));
        assert_eq!(roster.find_by_name("John Smith").unwrap().online_text(), None);
    }

    #[test]
    fn loads_first_worksheet_of_xlsx() {
        use rust_xlsxwriter::Workbook;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradebook.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in ["Identifier", "Full name", "Status", "Grade", "Online text"]
            .iter()
            .enumerate()
        {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        sheet.write_string(1, 0, "Participant 1").unwrap();
        sheet.write_string(1, 1, "Jane Doe").unwrap();
        sheet.write_string(1, 2, "Submitted for grading").unwrap();
        sheet.write_number(1, 3, 88).unwrap();
        sheet.write_string(1, 4, "<p>Answer</p>").unwrap();
        sheet.write_string(3, 1, "John Smith").unwrap();
        sheet.write_string(3, 2, "No submission").unwrap();
        workbook.save(&path).unwrap();

        let roster = Roster::load(&path).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.headers()[1], "Full name");

        let jane = roster.find_by_name("Jane Doe").unwrap();
        assert_eq!(jane.identifier(), Some("Participant 1"));
        assert_eq!(jane.grade(), Some(88.0));
        assert_eq!(jane.online_text(), Some("<p>Answer</p>"));

        let john = roster.find_by_name("John Smith").unwrap();
        assert_eq!(john.identifier(), None);
        assert_eq!(john.status(), "No submission");
        assert_eq!(roster.submitted_names("Submitted for grading"), vec!["Jane Doe"]);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Roster::load(Path::new("/nonexistent/gradebook.csv")).unwrap_err();
        assert!(matches!(err, GraderError::RosterNotFound(_)));
    }
}
