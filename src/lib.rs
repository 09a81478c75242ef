//! Consolidates learning-platform assignment submissions.
//!
//! A gradebook export (one row per student) and an optional zip archive of
//! uploaded files are merged into one [`Submission`] per student, with the
//! text of every accepted file decoded and concatenated. Grades and feedback
//! can then be recorded and written back in the gradebook's own layout.

pub mod archive;
pub mod assignment;
mod cli;
pub mod config;
pub mod decode;
pub mod error;
pub mod export;
pub mod manifest;
pub mod matching;
pub mod pipeline;
pub mod roster;
pub mod stats;
pub mod submission;

pub use assignment::Assignment;
pub use cli::run;
pub use config::GraderConfig;
pub use error::{DecodeError, GraderError, Result};
pub use pipeline::{extract_submissions, ExtractionOutcome, ExtractionPipeline};
pub use roster::Roster;
pub use submission::{Submission, SubmissionImage};
