//! Input discovery.
//!
//! Resolves the configured input into the list of `.tpx3` files to process.

use crate::{Error, Result};
use hermes_core::ProcessingConfig;
use std::path::{Path, PathBuf};

/// Extension of raw Timepix3 files.
pub const TPX3_EXTENSION: &str = "tpx3";

/// True if `path` carries the `.tpx3` extension (case-insensitive).
#[must_use]
pub fn is_tpx3(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(TPX3_EXTENSION))
}

/// Every `.tpx3` file directly inside `dir`, sorted by path.
///
/// # Errors
/// Returns [`Error::FileNotFound`] if `dir` does not exist.
pub fn list_tpx3_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::FileNotFound(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_tpx3(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Files selected by `config`: one file, or the whole folder in batch mode.
///
/// # Errors
/// Returns [`Error::FileNotFound`] for a missing input and
/// [`Error::UnsupportedExtension`] for a single file that is not `.tpx3`.
pub fn input_files(config: &ProcessingConfig) -> Result<Vec<PathBuf>> {
    let Some(name) = &config.raw_tpx3_file else {
        let files = list_tpx3_files(&config.raw_tpx3_folder)?;
        if files.is_empty() {
            log::warn!(
                "no .{TPX3_EXTENSION} files in {}",
                config.raw_tpx3_folder.display()
            );
        }
        return Ok(files);
    };

    let path = config.raw_tpx3_folder.join(name);
    if !is_tpx3(&path) {
        return Err(Error::UnsupportedExtension(path));
    }
    if !path.is_file() {
        return Err(Error::FileNotFound(path));
    }
    Ok(vec![path])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_tpx3() {
        assert!(is_tpx3(Path::new("run_001.tpx3")));
        assert!(is_tpx3(Path::new("RUN.TPX3")));
        assert!(!is_tpx3(Path::new("run.bin")));
        assert!(!is_tpx3(Path::new("tpx3")));
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.tpx3", "a.tpx3", "notes.txt", "c.TPX3"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.tpx3")).unwrap();

        let files = list_tpx3_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.tpx3", "b.tpx3", "c.TPX3"]);
    }

    #[test]
    fn test_single_file_checks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), b"").unwrap();
        let mut config = ProcessingConfig {
            raw_tpx3_folder: dir.path().to_path_buf(),
            raw_tpx3_file: Some("data.bin".into()),
            ..ProcessingConfig::default()
        };
        assert!(matches!(
            input_files(&config),
            Err(Error::UnsupportedExtension(_))
        ));

        config.raw_tpx3_file = Some("missing.tpx3".into());
        assert!(matches!(input_files(&config), Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_missing_folder() {
        let config = ProcessingConfig {
            raw_tpx3_folder: PathBuf::from("/nonexistent/hermes/input"),
            ..ProcessingConfig::default()
        };
        assert!(matches!(input_files(&config), Err(Error::FileNotFound(_))));
    }
}
