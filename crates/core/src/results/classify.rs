//! Single-pass classification of the files in a finished workspace.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::AggregationError;

/// File name pattern of the primary results table.
const RESULTS_TABLE_PATTERN: &str = r"triPOD_Results\.txt$";

/// Suffix of generated thumbnails (`sample_chr1.png` -> `sample_chr1.resize.png`).
pub const THUMBNAIL_SUFFIX: &str = ".resize.png";

static RESULTS_TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(RESULTS_TABLE_PATTERN).expect("valid regex"));

static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(png|bmp|jpg)$").expect("valid regex"));

/// What a workspace file is, judged by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Source plot produced by the analysis.
    Image,
    /// Thumbnail previously derived from an image.
    Thumbnail,
    /// Primary results table.
    ResultsTable,
    /// BED region file.
    RegionFile,
    /// Anything else (input file, logs, ...).
    Other,
}

/// Classify a file by its name.
pub fn classify(file_name: &str) -> FileKind {
    if file_name.ends_with(THUMBNAIL_SUFFIX) {
        FileKind::Thumbnail
    } else if IMAGE_RE.is_match(file_name) {
        FileKind::Image
    } else if RESULTS_TABLE_RE.is_match(file_name) {
        FileKind::ResultsTable
    } else if file_name.ends_with(".bed") {
        FileKind::RegionFile
    } else {
        FileKind::Other
    }
}

/// Workspace files grouped by kind.
///
/// Entries are paths relative to the workspace root, forward-slash
/// separated, sorted lexicographically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceFiles {
    pub images: Vec<String>,
    pub thumbnails: Vec<String>,
    pub tables: Vec<String>,
    pub region_files: Vec<String>,
}

impl WorkspaceFiles {
    /// The single results table, or an error when there are none or several.
    pub fn results_table(&self) -> Result<&str, AggregationError> {
        match self.tables.as_slice() {
            [] => Err(AggregationError::MissingResultsTable),
            [only] => Ok(only.as_str()),
            many => Err(AggregationError::AmbiguousResultsTable(many.to_vec())),
        }
    }

    /// The region file, if any. With several, the first is used.
    pub fn region_file(&self) -> Option<&str> {
        if self.region_files.len() > 1 {
            tracing::warn!(
                count = self.region_files.len(),
                "Multiple region files in workspace, using the first",
            );
        }
        self.region_files.first().map(String::as_str)
    }
}

/// Recursively enumerate `root` and classify every regular file.
pub fn scan_workspace(root: &Path) -> Result<WorkspaceFiles, AggregationError> {
    let mut paths = Vec::new();
    collect_files(root, &mut paths)?;

    let mut rel_paths: Vec<String> = paths
        .iter()
        .filter_map(|p| p.strip_prefix(root).ok())
        .map(normalize_path)
        .collect();
    rel_paths.sort();

    let mut files = WorkspaceFiles::default();
    for rel in rel_paths {
        let name = rel.rsplit('/').next().unwrap_or(&rel);
        match classify(name) {
            FileKind::Image => files.images.push(rel),
            FileKind::Thumbnail => files.thumbnails.push(rel),
            FileKind::ResultsTable => files.tables.push(rel),
            FileKind::RegionFile => files.region_files.push(rel),
            FileKind::Other => {}
        }
    }
    Ok(files)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), AggregationError> {
    let entries = std::fs::read_dir(dir).map_err(|e| AggregationError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| AggregationError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| AggregationError::io(&path, e))?;
        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn normalize_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn classifies_by_name() {
        assert_eq!(classify("sample_chr1.png"), FileKind::Image);
        assert_eq!(classify("sample_chr1.JPG"), FileKind::Image);
        assert_eq!(classify("plot.bmp"), FileKind::Image);
        assert_eq!(classify("sample_chr1.resize.png"), FileKind::Thumbnail);
        assert_eq!(classify("sample_triPOD_Results.txt"), FileKind::ResultsTable);
        assert_eq!(classify("sample_triPOD_Regions.bed"), FileKind::RegionFile);
        assert_eq!(classify("sample.txt"), FileKind::Other);
        assert_eq!(classify("progress"), FileKind::Other);
    }

    #[test]
    fn scans_recursively_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir(root.join("plots")).unwrap();
        for name in [
            "input.txt",
            "x_triPOD_Results.txt",
            "x.bed",
            "plots/x_chr2.png",
            "plots/x_chr1.png",
            "plots/x_chr1.resize.png",
        ] {
            std::fs::write(root.join(name), b"").unwrap();
        }

        let files = scan_workspace(root).unwrap();
        assert_eq!(files.images, ["plots/x_chr1.png", "plots/x_chr2.png"]);
        assert_eq!(files.thumbnails, ["plots/x_chr1.resize.png"]);
        assert_eq!(files.results_table().unwrap(), "x_triPOD_Results.txt");
        assert_eq!(files.region_file(), Some("x.bed"));
    }

    #[test]
    fn missing_table_is_reported() {
        let files = WorkspaceFiles::default();
        assert_matches!(files.results_table(), Err(AggregationError::MissingResultsTable));
    }

    #[test]
    fn multiple_tables_are_ambiguous() {
        let files = WorkspaceFiles {
            tables: vec!["a_triPOD_Results.txt".into(), "b_triPOD_Results.txt".into()],
            ..Default::default()
        };
        assert_matches!(
            files.results_table(),
            Err(AggregationError::AmbiguousResultsTable(names)) if names.len() == 2
        );
    }

    #[test]
    fn missing_workspace_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = scan_workspace(&dir.path().join("gone"));
        assert_matches!(result, Err(AggregationError::Io { .. }));
    }
}
