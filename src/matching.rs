//! Resolves an archive folder name to a roster student name.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::decode::base_name;

/// Which rule produced a resolved name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Normalized containment against a roster name.
    Roster,
    /// Upper-case "FIRST LAST" run found in the raw name.
    UppercaseRun,
    /// Nothing matched; the raw name is used as-is.
    Verbatim,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub name: String,
    pub kind: MatchKind,
}

#[derive(Debug, Clone)]
pub struct IdentityMatcher {
    roster: Vec<(String, String)>,
}

impl IdentityMatcher {
    /// `roster_names` keeps its iteration order; the first containment hit
    /// wins when several names qualify.
    pub fn new<I, S>(roster_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roster = roster_names
            .into_iter()
            .map(Into::into)
            .map(|name: String| {
                let normalized = normalize_identifier_label(&name);
                (name, normalized)
            })
            .collect();
        Self { roster }
    }

    /// Resolves the last path component of `folder_or_file` to a student name.
    pub fn resolve(&self, folder_or_file: &str) -> ResolvedName {
        let candidate = base_name(folder_or_file.trim_end_matches(['/', '\\']));
        let normalized_candidate = normalize_identifier_label(candidate);

        // Deliberate exception to plain containment: an empty label is a
        // substring of every name and would always hit the first student.
        if !normalized_candidate.is_empty() {
            let hit = self.roster.iter().find(|(_, normalized)| {
                !normalized.is_empty()
                    && (normalized.contains(&normalized_candidate)
                        || normalized_candidate.contains(normalized.as_str()))
            });
            if let Some((name, _)) = hit {
                debug!(candidate, student = %name, "Matched folder to roster name");
                return ResolvedName {
                    name: name.clone(),
                    kind: MatchKind::Roster,
                };
            }
        }

        if let Some(found) = uppercase_run_pattern().find(candidate) {
            warn!(candidate, name = found.as_str(), "No roster match; using upper-case name run");
            return ResolvedName {
                name: found.as_str().to_string(),
                kind: MatchKind::UppercaseRun,
            };
        }

        warn!(candidate, "No roster match; using the folder name verbatim");
        ResolvedName {
            name: candidate.to_string(),
            kind: MatchKind::Verbatim,
        }
    }
}

/// Lower-cases, then keeps only ASCII letters and digits.
pub fn normalize_identifier_label(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

fn uppercase_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Z]+\s*[A-Z]+").expect("valid upper-case run pattern"))
}
