//! JSON manifest of extracted submissions, images inlined as base64.

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as Base64Engine, Engine as _};
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::submission::{Submission, SubmissionImage};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionManifest {
    pub assignment_name: String,
    pub expected_count: usize,
    pub processed_count: usize,
    pub submissions: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: u64,
    pub student_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub solution_text: String,
    pub solution_length: usize,
    pub images: Vec<ManifestImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestImage {
    pub format: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub data_base64: String,
}

impl From<&SubmissionImage> for ManifestImage {
    fn from(image: &SubmissionImage) -> Self {
        Self {
            format: image.format.clone(),
            description: image.description.clone(),
            width: image.width,
            height: image.height,
            data_base64: Base64Engine.encode(&image.data),
        }
    }
}

impl From<&Submission> for ManifestEntry {
    fn from(submission: &Submission) -> Self {
        Self {
            id: submission.id(),
            student_name: submission.student_name().to_string(),
            identifier: submission.identifier().map(str::to_string),
            email: submission.email().map(str::to_string),
            solution_text: submission.solution_text().to_string(),
            solution_length: submission.solution_length(),
            images: submission.images().iter().map(ManifestImage::from).collect(),
            grade: submission.grade(),
            feedback: submission.feedback().map(str::to_string),
        }
    }
}

impl SubmissionManifest {
    pub fn new(assignment_name: &str, expected_count: usize, submissions: &[Submission]) -> Self {
        Self {
            assignment_name: assignment_name.to_string(),
            expected_count,
            processed_count: submissions.len(),
            submissions: submissions.iter().map(ManifestEntry::from).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        info!(
            path = %path.display(),
            submissions = self.processed_count,
            "Wrote submission manifest"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn manifest_uses_camel_case_and_base64_images() {
        let mut submission = Submission::new("Jane Doe");
        submission.append_file(
            "answer.docx",
            "text",
            vec![SubmissionImage::new(
                vec![1, 2, 3],
                "png".to_string(),
                "Image from document: image1.png".to_string(),
                4,
                5,
            )],
            true,
        );
        submission.set_identifier("P1");

        let manifest = SubmissionManifest::new("Lab 1", 2, &[submission]);
        let value: Value = serde_json::from_str(&manifest.to_json().unwrap()).unwrap();

        assert_eq!(value["assignmentName"], "Lab 1");
        assert_eq!(value["expectedCount"], 2);
        assert_eq!(value["processedCount"], 1);
        let entry = &value["submissions"][0];
        assert_eq!(entry["studentName"], "Jane Doe");
        assert_eq!(entry["solutionLength"], 4);
        assert!(entry.get("email").is_none());
        assert_eq!(entry["images"][0]["dataBase64"], "AQID");
        assert_eq!(entry["images"][0]["width"], 4);
    }
}
