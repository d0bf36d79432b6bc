//! Deterministic artifact naming.
//!
//! Every artifact path is derived from an identifier's file stem and a stage
//! directory, and every artifact path maps back to its identifier. Stages
//! never pass data to each other except through these paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::api::ObjectIdentifier;

pub const RAW_SUFFIX: &str = ".fits";
pub const PROCESSED_SUFFIX: &str = "_processed.fits";
pub const PREVIEW_SUFFIX: &str = "_processed.png";
pub const RESULTS_SUFFIX: &str = "_processed_results.json";
pub const METRICS_SUFFIX: &str = "_processed_metrics.png";

// Longest first so `_processed.fits` wins over `.fits`.
const KNOWN_SUFFIXES: [&str; 5] = [
    METRICS_SUFFIX,
    RESULTS_SUFFIX,
    PROCESSED_SUFFIX,
    PREVIEW_SUFFIX,
    RAW_SUFFIX,
];

/// Stage output directories for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub results_dir: PathBuf,
    pub viz_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(
        raw_dir: impl Into<PathBuf>,
        processed_dir: impl Into<PathBuf>,
        results_dir: impl Into<PathBuf>,
        viz_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            processed_dir: processed_dir.into(),
            results_dir: results_dir.into(),
            viz_dir: viz_dir.into(),
        }
    }

    /// Layout with the four stage directories under one root.
    pub fn under(root: &Path) -> Self {
        Self::new(
            root.join("raw"),
            root.join("processed"),
            root.join("results"),
            root.join("visualize"),
        )
    }

    pub fn raw_series(&self, id: &ObjectIdentifier) -> PathBuf {
        self.raw_dir.join(format!("{}{}", id.file_stem(), RAW_SUFFIX))
    }

    pub fn processed_series(&self, id: &ObjectIdentifier) -> PathBuf {
        self.processed_dir
            .join(format!("{}{}", id.file_stem(), PROCESSED_SUFFIX))
    }

    pub fn processed_preview(&self, id: &ObjectIdentifier) -> PathBuf {
        self.processed_dir
            .join(format!("{}{}", id.file_stem(), PREVIEW_SUFFIX))
    }

    pub fn results(&self, id: &ObjectIdentifier) -> PathBuf {
        self.results_dir
            .join(format!("{}{}", id.file_stem(), RESULTS_SUFFIX))
    }

    pub fn metrics_plot(&self, id: &ObjectIdentifier) -> PathBuf {
        self.viz_dir.join(format!("{}{}", id.file_stem(), METRICS_SUFFIX))
    }

    /// Create all stage directories.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [&self.raw_dir, &self.processed_dir, &self.results_dir, &self.viz_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Recover the identifier from any artifact path.
    ///
    /// Returns `None` when the file name carries none of the known suffixes.
    /// The recovered identifier is the file stem, so `TIC 1` comes back as
    /// `TIC_1`; both name the same artifacts.
    pub fn identifier_from_path(path: &Path) -> Option<ObjectIdentifier> {
        let name = path.file_name()?.to_str()?;
        KNOWN_SUFFIXES
            .iter()
            .find_map(|suffix| name.strip_suffix(suffix))
            .filter(|stem| !stem.is_empty())
            .and_then(|stem| ObjectIdentifier::new(stem).ok())
    }
}

/// Write `bytes` to `path` through a sibling temporary file and a rename.
///
/// Readers see either the previous file or the complete new one. Parent
/// directories are created as needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temporary_path(path);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

/// Sibling path used while an artifact is being written.
pub fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Files in `dir` whose names end with `suffix`, sorted by name.
///
/// `.fits` also matches `_processed.fits`; callers that want raw series only
/// must use [`list_raw_series`].
pub fn list_with_suffix(dir: &Path, suffix: &str) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(suffix));
        if matches && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Raw series files in `dir`, excluding processed products.
pub fn list_raw_series(dir: &Path) -> io::Result<Vec<PathBuf>> {
    Ok(list_with_suffix(dir, RAW_SUFFIX)?
        .into_iter()
        .filter(|p| {
            !p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(PROCESSED_SUFFIX))
        })
        .collect())
}
