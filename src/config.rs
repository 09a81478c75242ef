use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

pub const DEFAULT_SUBMITTED_STATUS: &str = "Submitted for grading";
pub const DEFAULT_SOLUTION_EXTENSIONS: &[&str] = &[".txt", ".docx", ".pdf", ".html"];
pub const DEFAULT_EXCLUDED_KEYWORDS: &[&str] = &["readme", "instruction", "guide", "syllabus"];
pub const DEFAULT_HISTOGRAM_BINS: usize = 10;
pub const DEFAULT_HTML_WRAP_WIDTH: usize = 80;

const ENV_PREFIX: &str = "GRADER";

/// Tunables for extraction and reporting. Every field has a default, so an
/// empty configuration reproduces the stock gradebook behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraderConfig {
    /// Status value that marks a gradebook row as eligible.
    pub submitted_status: String,
    /// Lower-case suffixes accepted as solution files inside the archive.
    pub solution_extensions: Vec<String>,
    /// Base-name substrings that mark a file as course material.
    pub excluded_keywords: Vec<String>,
    pub histogram_bins: usize,
    pub html_wrap_width: usize,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            submitted_status: DEFAULT_SUBMITTED_STATUS.to_string(),
            solution_extensions: DEFAULT_SOLUTION_EXTENSIONS
                .iter()
                .map(|value| value.to_string())
                .collect(),
            excluded_keywords: DEFAULT_EXCLUDED_KEYWORDS
                .iter()
                .map(|value| value.to_string())
                .collect(),
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            html_wrap_width: DEFAULT_HTML_WRAP_WIDTH,
        }
    }
}

impl GraderConfig {
    /// Layers an optional TOML file under `GRADER_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("solution_extensions")
                    .with_list_parse_key("excluded_keywords"),
            )
            .build()?;

        let mut loaded: GraderConfig = settings.try_deserialize()?;
        loaded.normalize();
        Ok(loaded)
    }

    fn normalize(&mut self) {
        for extension in &mut self.solution_extensions {
            let trimmed = extension.trim().to_lowercase();
            *extension = if trimmed.starts_with('.') {
                trimmed
            } else {
                format!(".{trimmed}")
            };
        }
        for keyword in &mut self.excluded_keywords {
            *keyword = keyword.trim().to_lowercase();
        }
        self.excluded_keywords.retain(|keyword| !keyword.is_empty());
        if self.histogram_bins == 0 {
            self.histogram_bins = DEFAULT_HISTOGRAM_BINS;
        }
        if self.html_wrap_width == 0 {
            self.html_wrap_width = DEFAULT_HTML_WRAP_WIDTH;
        }
    }
}
