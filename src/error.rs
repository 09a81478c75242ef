use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced to callers of the grader library.
///
/// Only roster-level and output-level failures appear here. Failures while
/// decoding a single submitted file never escape the pipeline; see
/// [`DecodeError`].
#[derive(Error, Debug)]
pub enum GraderError {
    #[error("Gradebook file not found: {}", .0.display())]
    RosterNotFound(PathBuf),

    #[error("Unable to read the gradebook: {0}")]
    RosterRead(String),

    #[error("Could not find required columns in gradebook: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Grade {0} is outside the allowed range 0-100")]
    GradeOutOfRange(f64),

    #[error("Unable to export: {0}")]
    Export(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GraderError>;

/// Failure while turning one submitted file into text.
///
/// Converted into a placeholder string at the file boundary.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unable to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unable to read the DOCX document: {0}")]
    Docx(String),

    #[error("Unable to extract text from the PDF document: {0}")]
    Pdf(String),

    #[error("Unable to read the archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
