//! Gradebook and statistics output.
//!
//! The gradebook projection keeps the learning platform's column layout so the
//! file can be re-imported: roster rows in roster order, a fixed column order,
//! and only the columns that actually exist.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::Utc;
use clap::ValueEnum;
use rust_xlsxwriter::{Format, Workbook};
use tracing::{info, warn};

use crate::error::{GraderError, Result};
use crate::roster::{Roster, FEEDBACK_COLUMN, GRADE_COLUMN};
use crate::submission::Submission;

pub const EXPORT_COLUMNS: &[&str] = &[
    "Identifier",
    "Full name",
    "Email address",
    "Status",
    "Grade",
    "Maximum Grade",
    "Grade can be changed",
    "Last modified (submission)",
    "Online text",
    "Last modified(grade)",
    "Feedback comments",
];

const REPORT_RULE_WIDTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
}

impl ExportFormat {
    /// Picks the format from a file extension, defaulting to CSV.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("xlsx") => Self::Xlsx,
            _ => Self::Csv,
        }
    }
}

/// Headers plus string rows, ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradebookTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Projects the roster onto the export columns, filling in grades and
/// feedback from the matching submissions.
pub fn project_gradebook(roster: &Roster, submissions: &[Submission]) -> GradebookTable {
    let mut by_name: HashMap<&str, &Submission> = HashMap::new();
    for submission in submissions {
        by_name.entry(submission.student_name()).or_insert(submission);
    }

    for submission in submissions {
        if roster.find_by_name(submission.student_name()).is_none() {
            warn!(
                student = submission.student_name(),
                "Student not found in gradebook; not exported"
            );
        }
    }

    let any_grade = submissions.iter().any(|s| s.grade().is_some());
    let any_feedback = submissions.iter().any(|s| s.feedback().is_some());

    let columns: Vec<(&str, Option<usize>)> = EXPORT_COLUMNS
        .iter()
        .filter_map(|label| {
            let index = roster.column_index(label);
            let derived = (*label == GRADE_COLUMN && any_grade)
                || (*label == FEEDBACK_COLUMN && any_feedback);
            (index.is_some() || derived).then_some((*label, index))
        })
        .collect();

    let rows = roster
        .rows()
        .map(|row| {
            let submission = by_name.get(row.full_name()).copied();
            columns
                .iter()
                .map(|(label, index)| {
                    let existing = index
                        .and_then(|index| row.values().get(index))
                        .cloned()
                        .unwrap_or_default();
                    match (*label, submission) {
                        (GRADE_COLUMN, Some(submission)) => submission
                            .grade()
                            .map(format_grade)
                            .unwrap_or(existing),
                        (FEEDBACK_COLUMN, Some(submission)) => submission
                            .feedback()
                            .map(str::to_string)
                            .unwrap_or(existing),
                        _ => existing,
                    }
                })
                .collect()
        })
        .collect();

    GradebookTable {
        headers: columns.iter().map(|(label, _)| label.to_string()).collect(),
        rows,
    }
}

pub fn format_grade(grade: f64) -> String {
    format!("{grade}")
}

pub fn write_gradebook_csv(table: &GradebookTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn build_gradebook_workbook(table: &GradebookTable) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Grades")?;

    let header_format = Format::new().set_bold();
    for (col_index, header) in table.headers.iter().enumerate() {
        sheet.write_string_with_format(0, col_index as u16, header, &header_format)?;
    }

    for (row_index, values) in table.rows.iter().enumerate() {
        let row = (row_index + 1) as u32;
        for (col_index, value) in values.iter().enumerate() {
            sheet.write_string(row, col_index as u16, value)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

pub fn write_gradebook(table: &GradebookTable, path: &Path, format: ExportFormat) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(GraderError::Export(format!(
                "the directory {} does not exist",
                parent.display()
            )));
        }
    }

    match format {
        ExportFormat::Csv => write_gradebook_csv(table, path)?,
        ExportFormat::Xlsx => fs::write(path, build_gradebook_workbook(table)?)?,
    }

    info!(
        path = %path.display(),
        rows = table.rows.len(),
        "Exported grades and feedback"
    );
    Ok(())
}

/// `<assignment>_grades.csv`, or a timestamped name when the assignment has
/// no name.
pub fn default_export_name(assignment_name: Option<&str>) -> String {
    match assignment_name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("{name}_grades.csv"),
        None => {
            let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
            format!("grades_{timestamp}.csv")
        }
    }
}

pub fn write_statistics_csv(metrics: &[(String, String)], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Metric", "Value"])?;
    for (metric, value) in metrics {
        writer.write_record([metric, value])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn statistics_report(assignment_name: &str, metrics: &[(String, String)]) -> String {
    let rule = "=".repeat(REPORT_RULE_WIDTH);
    let mut report = format!("Statistics Report for {assignment_name}\n{rule}\n\n");
    for (metric, value) in metrics {
        report.push_str(&format!("{metric}: {value}\n"));
    }
    report.push('\n');
    report.push_str(&rule);
    report
}
