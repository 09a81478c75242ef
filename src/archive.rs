//! Submission archive layout: per-student folders and the files in them.

use std::collections::HashMap;
use std::io::{Read, Seek};

use tracing::debug;
use zip::ZipArchive;

use crate::config::GraderConfig;
use crate::decode::base_name;
use crate::error::DecodeError;

/// One file inside the archive, addressed by its entry index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub index: usize,
    pub path: String,
}

impl ArchiveEntry {
    pub fn file_name(&self) -> &str {
        base_name(&self.path)
    }
}

/// Files sharing the same immediate parent directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderGroup {
    pub folder: String,
    pub entries: Vec<ArchiveEntry>,
}

/// Groups archive files by their immediate parent directory.
///
/// Folders are ordered by the entry index of their first file and files keep
/// archive order. Directory entries and files at the archive root are dropped.
pub fn group_by_folder<I, S>(paths: I) -> Vec<FolderGroup>
where
    I: IntoIterator<Item = (usize, S)>,
    S: AsRef<str>,
{
    let mut groups: Vec<FolderGroup> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (index, path) in paths {
        let path = path.as_ref();
        if path.ends_with('/') {
            continue;
        }

        let Some((folder, _)) = path.rsplit_once('/') else {
            debug!(path, "Ignoring file at the archive root");
            continue;
        };
        if folder.is_empty() {
            continue;
        }

        let position = *positions.entry(folder.to_string()).or_insert_with(|| {
            groups.push(FolderGroup {
                folder: folder.to_string(),
                entries: Vec::new(),
            });
            groups.len() - 1
        });

        groups[position].entries.push(ArchiveEntry {
            index,
            path: path.to_string(),
        });
    }

    groups
}

/// Groups the file entries of an opened zip archive.
pub fn group_archive<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Vec<FolderGroup>, DecodeError> {
    let mut paths = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        if entry.is_dir() {
            continue;
        }
        paths.push((index, entry.name().to_string()));
    }
    Ok(group_by_folder(paths))
}

/// Reads the full contents of one archive entry.
pub fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    entry: &ArchiveEntry,
) -> Result<Vec<u8>, DecodeError> {
    let mut file = archive.by_index(entry.index)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(data)
}

/// Decides which uploaded files count as solution content.
#[derive(Debug, Clone)]
pub struct SolutionFileFilter {
    extensions: Vec<String>,
    excluded_keywords: Vec<String>,
}

impl Default for SolutionFileFilter {
    fn default() -> Self {
        Self::new(&GraderConfig::default())
    }
}

impl SolutionFileFilter {
    pub fn new(config: &GraderConfig) -> Self {
        Self {
            extensions: config.solution_extensions.clone(),
            excluded_keywords: config.excluded_keywords.clone(),
        }
    }

    /// True when the extension is accepted and the base name carries no
    /// course-material keyword.
    pub fn is_candidate(&self, filename: &str) -> bool {
        let lowered = filename.to_lowercase();
        if !self
            .extensions
            .iter()
            .any(|extension| lowered.ends_with(extension.as_str()))
        {
            return false;
        }

        let base = base_name(&lowered);
        !self
            .excluded_keywords
            .iter()
            .any(|keyword| base.contains(keyword.as_str()))
    }

    pub fn candidates<'a>(&self, entries: &'a [ArchiveEntry]) -> Vec<&'a ArchiveEntry> {
        entries
            .iter()
            .filter(|entry| self.is_candidate(&entry.path))
            .collect()
    }
}
