//! Gradebook + archive extraction into one submission per student.
//!
//! Order of work:
//! 1. eligible gradebook rows with inline text become submissions;
//! 2. archive folders with candidate files are resolved to a student, skipped
//!    when that student already has inline text, and otherwise decoded file
//!    by file;
//! 3. submissions that land on the same student name are merged with an
//!    `ADDITIONAL SUBMISSION` separator;
//! 4. the result is ordered by student name.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tracing::{info, warn};
use zip::ZipArchive;

use crate::archive::{group_archive, read_entry, FolderGroup, SolutionFileFilter};
use crate::config::GraderConfig;
use crate::decode::{DecodedFile, FormatDecoder};
use crate::error::{DecodeError, Result};
use crate::matching::IdentityMatcher;
use crate::roster::Roster;
use crate::submission::Submission;

/// Submissions produced by one extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    /// One entry per resolved student name, sorted by name.
    pub submissions: Vec<Submission>,
    /// Number of gradebook rows marked as submitted.
    pub expected_count: usize,
}

impl ExtractionOutcome {
    pub fn processed_count(&self) -> usize {
        self.submissions.len()
    }

    /// Students the gradebook lists as submitted but for whom no content was
    /// found. A positive value is a warning, not an error.
    pub fn missing_count(&self) -> usize {
        self.expected_count.saturating_sub(self.submissions.len())
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionPipeline {
    submitted_status: String,
    decoder: FormatDecoder,
    filter: SolutionFileFilter,
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        Self::new(&GraderConfig::default())
    }
}

impl ExtractionPipeline {
    pub fn new(config: &GraderConfig) -> Self {
        Self {
            submitted_status: config.submitted_status.clone(),
            decoder: FormatDecoder::new(config),
            filter: SolutionFileFilter::new(config),
        }
    }

    /// Extracts from a gradebook and an optional archive on disk. A missing or
    /// unreadable archive degrades to inline-text-only extraction.
    pub fn extract(&self, roster: &Roster, archive_path: Option<&Path>) -> ExtractionOutcome {
        let Some(path) = archive_path else {
            return self.extract_with_archive::<File>(roster, None);
        };

        if !path.is_file() {
            warn!(
                path = %path.display(),
                "Submission archive not found; using inline text only"
            );
            return self.extract_with_archive::<File>(roster, None);
        }

        let opened = File::open(path)
            .map_err(DecodeError::from)
            .and_then(|file| ZipArchive::new(BufReader::new(file)).map_err(Into::into));

        match opened {
            Ok(mut archive) => self.extract_with_archive(roster, Some(&mut archive)),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    "Unable to open submission archive ({err}); using inline text only"
                );
                self.extract_with_archive::<File>(roster, None)
            }
        }
    }

    /// Extracts from a gradebook and an already opened archive.
    pub fn extract_with_archive<R: Read + Seek>(
        &self,
        roster: &Roster,
        archive: Option<&mut ZipArchive<R>>,
    ) -> ExtractionOutcome {
        let submitted_names = roster.submitted_names(&self.submitted_status);
        let mut by_name: BTreeMap<String, Submission> = BTreeMap::new();

        for row in roster.rows() {
            if row.status() != self.submitted_status {
                continue;
            }
            let Some(online_text) = row.online_text() else {
                continue;
            };

            let mut submission = Submission::from_online_text(row.full_name(), online_text);
            submission.apply_roster_row(Some(row), row.index());
            insert_or_merge(&mut by_name, submission);
        }

        let from_online_text: HashSet<String> = by_name.keys().cloned().collect();
        info!(
            count = from_online_text.len(),
            "Extracted inline-text submissions"
        );

        if let Some(archive) = archive {
            let matcher = IdentityMatcher::new(submitted_names.iter().cloned());
            let groups = match group_archive(archive) {
                Ok(groups) => groups,
                Err(err) => {
                    warn!("Unable to list the submission archive: {err}");
                    Vec::new()
                }
            };
            info!(folders = groups.len(), "Grouped archive entries by folder");

            let mut created = 0usize;
            for group in &groups {
                let Some(submission) = self.build_folder_submission(
                    roster,
                    archive,
                    group,
                    &matcher,
                    &from_online_text,
                    created,
                ) else {
                    continue;
                };
                created += 1;
                insert_or_merge(&mut by_name, submission);
            }
        }

        let outcome = ExtractionOutcome {
            submissions: by_name.into_values().collect(),
            expected_count: submitted_names.len(),
        };

        info!(
            processed = outcome.processed_count(),
            expected = outcome.expected_count,
            "Successfully processed {} out of {} submissions",
            outcome.processed_count(),
            outcome.expected_count
        );
        if outcome.missing_count() > 0 {
            warn!(
                missing = outcome.missing_count(),
                "Some students submitted but no content was found for them"
            );
        }

        outcome
    }

    fn build_folder_submission<R: Read + Seek>(
        &self,
        roster: &Roster,
        archive: &mut ZipArchive<R>,
        group: &FolderGroup,
        matcher: &IdentityMatcher,
        from_online_text: &HashSet<String>,
        creation_index: usize,
    ) -> Option<Submission> {
        let candidates = self.filter.candidates(&group.entries);
        if candidates.is_empty() {
            return None;
        }

        let resolved = matcher.resolve(&group.folder);
        if from_online_text.contains(&resolved.name) {
            info!(
                folder = %group.folder,
                student = %resolved.name,
                "Skipping zip folder, already processed from online text"
            );
            return None;
        }

        let mut submission = Submission::new(resolved.name.clone());
        submission.apply_roster_row(roster.find_by_name(&resolved.name), creation_index);

        for (position, entry) in candidates.into_iter().enumerate() {
            let decoded = match read_entry(archive, entry) {
                Ok(data) => self.decoder.decode(&data, &entry.path),
                Err(err) => {
                    warn!(file = %entry.path, "Unable to read archive entry: {err}");
                    DecodedFile {
                        text: format!("[Error reading file: {}]", entry.file_name()),
                        images: Vec::new(),
                    }
                }
            };
            submission.append_file(entry.file_name(), &decoded.text, decoded.images, position == 0);
        }

        Some(submission)
    }
}

/// Loads the gradebook and runs the pipeline. Only gradebook problems are
/// returned as errors.
pub fn extract_submissions(
    roster_path: &Path,
    archive_path: Option<&Path>,
    config: &GraderConfig,
) -> Result<(Roster, ExtractionOutcome)> {
    let roster = Roster::load(roster_path)?;
    let outcome = ExtractionPipeline::new(config).extract(&roster, archive_path);
    Ok((roster, outcome))
}

fn insert_or_merge(by_name: &mut BTreeMap<String, Submission>, submission: Submission) {
    match by_name.entry(submission.student_name().to_string()) {
        Entry::Occupied(mut existing) => {
            info!(
                student = submission.student_name(),
                "Merged multiple submissions"
            );
            existing.get_mut().merge_additional(submission);
        }
        Entry::Vacant(slot) => {
            slot.insert(submission);
        }
    }
}
