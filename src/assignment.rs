//! One assignment: its gradebook, extracted submissions and grading state.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::GraderConfig;
use crate::error::{GraderError, Result};
use crate::export::{self, ExportFormat, GradebookTable};
use crate::manifest::SubmissionManifest;
use crate::pipeline::ExtractionPipeline;
use crate::roster::Roster;
use crate::stats::SubmissionStatistics;
use crate::submission::Submission;

const UNNAMED_ASSIGNMENT: &str = "assignment";

#[derive(Debug, Clone, Default)]
pub struct Assignment {
    name: Option<String>,
    reference_solution: String,
    config: GraderConfig,
    roster: Option<Roster>,
    submissions: Vec<Submission>,
    expected_count: usize,
}

impl Assignment {
    pub fn new(config: GraderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Sets the name explicitly, or derives it from the archive file stem.
    pub fn set_name(&mut self, name: Option<&str>, archive_path: Option<&Path>) -> &str {
        let explicit = name.map(str::trim).filter(|name| !name.is_empty());
        let derived = archive_path
            .and_then(|path| path.file_stem())
            .and_then(|stem| stem.to_str());
        self.name = explicit.or(derived).map(str::to_string);
        self.name()
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNNAMED_ASSIGNMENT)
    }

    /// Stored for graders; extraction never reads it.
    pub fn set_reference_solution(&mut self, solution: impl Into<String>) {
        self.reference_solution = solution.into();
    }

    pub fn reference_solution(&self) -> &str {
        &self.reference_solution
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    /// Loads the gradebook and extracts every submission. Returns the number
    /// of students the gradebook lists as submitted.
    pub fn load_submissions(
        &mut self,
        roster_path: &Path,
        archive_path: Option<&Path>,
    ) -> Result<usize> {
        let roster = Roster::load(roster_path)?;
        if self.name.is_none() {
            self.set_name(None, archive_path);
        }

        let outcome = ExtractionPipeline::new(&self.config).extract(&roster, archive_path);
        self.expected_count = outcome.expected_count;
        self.submissions = outcome.submissions;
        self.roster = Some(roster);

        info!(
            assignment = self.name(),
            submissions = self.submissions.len(),
            "Loaded assignment"
        );
        Ok(self.expected_count)
    }

    pub fn roster(&self) -> Option<&Roster> {
        self.roster.as_ref()
    }

    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    pub fn submission(&self, index: usize) -> Option<&Submission> {
        self.submissions.get(index)
    }

    pub fn submission_mut(&mut self, index: usize) -> Option<&mut Submission> {
        self.submissions.get_mut(index)
    }

    pub fn find_submission_mut(&mut self, student_name: &str) -> Option<&mut Submission> {
        self.submissions
            .iter_mut()
            .find(|submission| submission.student_name() == student_name)
    }

    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    /// Students listed as submitted with no extracted content.
    pub fn missing_count(&self) -> usize {
        let missing = self.expected_count.saturating_sub(self.submissions.len());
        if missing > 0 {
            warn!(
                processed = self.submissions.len(),
                expected = self.expected_count,
                "Not every submitted student was processed"
            );
        }
        missing
    }

    pub fn statistics(&self) -> SubmissionStatistics {
        SubmissionStatistics::compute(&self.submissions, self.config.histogram_bins)
    }

    pub fn gradebook(&self) -> Result<GradebookTable> {
        let roster = self
            .roster
            .as_ref()
            .ok_or_else(|| GraderError::Export("no gradebook has been loaded".to_string()))?;
        Ok(export::project_gradebook(roster, &self.submissions))
    }

    /// Writes the gradebook projection. Without an explicit path the file is
    /// named after the assignment in the current directory.
    pub fn export(&self, output: Option<&Path>, format: Option<ExportFormat>) -> Result<PathBuf> {
        let path = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(export::default_export_name(self.name.as_deref())));
        let format = format.unwrap_or_else(|| ExportFormat::from_path(&path));

        export::write_gradebook(&self.gradebook()?, &path, format)?;
        Ok(path)
    }

    pub fn statistics_report(&self) -> String {
        export::statistics_report(self.name(), &self.statistics().metrics())
    }

    pub fn export_statistics(&self, path: &Path) -> Result<()> {
        export::write_statistics_csv(&self.statistics().metrics(), path)
    }

    pub fn manifest(&self) -> SubmissionManifest {
        SubmissionManifest::new(self.name(), self.expected_count, &self.submissions)
    }
}
