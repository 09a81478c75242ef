use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{GraderError, Result};
use crate::roster::RosterRow;

pub const ADDITIONAL_SUBMISSION_SEPARATOR: &str = "\n\n--- ADDITIONAL SUBMISSION ---\n\n";
pub const EMBEDDED_IMAGE_NOTE: &str = "[Embedded image — not displayed]";

static NEXT_SUBMISSION_ID: AtomicU64 = AtomicU64::new(0);

/// An image found in a submission, kept as the original encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionImage {
    pub data: Vec<u8>,
    /// Short format tag such as `png` or `jpeg`.
    pub format: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
}

impl SubmissionImage {
    pub fn new(
        data: Vec<u8>,
        format: String,
        description: String,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            data,
            format,
            description,
            width,
            height,
        }
    }
}

/// One student's consolidated submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    id: u64,
    student_name: String,
    identifier: Option<String>,
    email: Option<String>,
    solution_text: String,
    images: Vec<SubmissionImage>,
    grade: Option<f64>,
    feedback: Option<String>,
}

impl Submission {
    /// Creates an empty submission with a fresh process-wide id.
    pub fn new(student_name: impl Into<String>) -> Self {
        Self {
            id: NEXT_SUBMISSION_ID.fetch_add(1, Ordering::Relaxed),
            student_name: student_name.into(),
            identifier: None,
            email: None,
            solution_text: String::new(),
            images: Vec::new(),
            grade: None,
            feedback: None,
        }
    }

    /// Builds a submission from inline HTML text.
    pub fn from_online_text(student_name: impl Into<String>, online_text: &str) -> Self {
        let mut submission = Self::new(student_name);
        submission.solution_text = process_online_text(online_text);
        submission
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn student_name(&self) -> &str {
        &self.student_name
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn solution_text(&self) -> &str {
        &self.solution_text
    }

    pub fn images(&self) -> &[SubmissionImage] {
        &self.images
    }

    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }

    pub fn grade(&self) -> Option<f64> {
        self.grade
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    /// Character count of the solution text.
    pub fn solution_length(&self) -> usize {
        self.solution_text.chars().count()
    }

    pub fn set_grade(&mut self, grade: f64) -> Result<()> {
        if !(0.0..=100.0).contains(&grade) {
            return Err(GraderError::GradeOutOfRange(grade));
        }
        self.grade = Some(grade);
        Ok(())
    }

    pub fn clear_grade(&mut self) {
        self.grade = None;
    }

    pub fn set_feedback(&mut self, feedback: impl Into<String>) {
        let feedback = feedback.into();
        self.feedback = if feedback.trim().is_empty() {
            None
        } else {
            Some(feedback)
        };
    }

    pub fn set_identifier(&mut self, identifier: impl Into<String>) {
        self.identifier = Some(identifier.into());
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.email = Some(email.into());
    }

    /// Copies identifier, email, grade and feedback from a gradebook row.
    /// `fallback_index` names the synthetic `ID_<n>` identifier used when the
    /// row has none.
    pub fn apply_roster_row(&mut self, row: Option<RosterRow<'_>>, fallback_index: usize) {
        let identifier = row
            .and_then(|row| row.identifier())
            .map(str::to_string)
            .unwrap_or_else(|| format!("ID_{fallback_index}"));
        self.identifier = Some(identifier);

        let Some(row) = row else {
            return;
        };
        self.email = row.email().map(str::to_string);
        if let Some(grade) = row.grade() {
            self.grade = Some(grade);
        }
        if let Some(feedback) = row.feedback() {
            self.feedback = Some(feedback.to_string());
        }
    }

    /// Appends one decoded file. The first content of an empty submission is
    /// stored as-is; anything after it gets a `--- FILE: <name> ---` marker.
    pub fn append_file(
        &mut self,
        file_name: &str,
        text: &str,
        images: Vec<SubmissionImage>,
        first_in_folder: bool,
    ) {
        if first_in_folder && self.solution_text.is_empty() {
            self.solution_text.push_str(text);
        } else {
            self.solution_text
                .push_str(&format!("\n\n--- FILE: {file_name} ---\n\n"));
            self.solution_text.push_str(text);
        }
        self.images.extend(images);
    }

    /// Folds another submission for the same student into this one.
    pub fn merge_additional(&mut self, other: Submission) {
        self.solution_text.push_str(ADDITIONAL_SUBMISSION_SEPARATOR);
        self.solution_text.push_str(&other.solution_text);
        self.images.extend(other.images);

        if self.identifier.is_none() {
            self.identifier = other.identifier;
        }
        if self.email.is_none() {
            self.email = other.email;
        }
        if self.grade.is_none() {
            self.grade = other.grade;
        }
        if self.feedback.is_none() {
            self.feedback = other.feedback;
        }
    }
}

/// Replaces `<img>` tags with a visible note, then strips the remaining markup.
pub fn process_online_text(online_text: &str) -> String {
    let annotated = img_tag_pattern().replace_all(online_text, EMBEDDED_IMAGE_NOTE);
    clean_html_text(&annotated)
}

/// Lightweight tag stripper for gradebook HTML: `<br>` becomes a newline,
/// other tags vanish and the common entities are unescaped. Text without
/// markup is returned unchanged.
pub fn clean_html_text(html_text: &str) -> String {
    if !(html_text.contains('<') && html_text.contains('>')) {
        return html_text.to_string();
    }

    let text = line_break_pattern().replace_all(html_text, "\n");
    let text = tag_pattern().replace_all(&text, "");
    text.replace("&nbsp;", " ")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

fn img_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)<img\b[^>]*>").expect("valid img tag pattern"))
}

fn line_break_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid line break pattern"))
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"))
}
