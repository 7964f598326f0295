//! Benchmark discovery and naming.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};

/// File extension (without the dot) of Dice benchmark programs.
pub const BENCHMARK_EXTENSION: &str = "dice";

/// Lists the benchmark files directly inside `dir`, sorted by file name.
///
/// Only regular files (after following symlinks) with a `.dice` extension,
/// compared case-insensitively, are returned. Entries that cannot be read,
/// such as dangling symlinks, are logged and skipped.
pub fn discover_benchmarks(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::InvalidBenchmarkDir(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(
                    path = ?err.path(),
                    error = %err,
                    "skipping unreadable directory entry"
                );
                continue;
            }
        };
        if entry.file_type().is_file() && has_benchmark_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn has_benchmark_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(BENCHMARK_EXTENSION))
}

/// Table row label for a benchmark file name: extension stripped,
/// underscores escaped for LaTeX.
#[must_use]
pub fn display_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    stem.replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_strips_extension_and_escapes_underscores() {
        assert_eq!(display_name("alarm_net.dice"), "alarm\\_net");
        assert_eq!(display_name("caesar.dice"), "caesar");
        assert_eq!(display_name("no_extension"), "no\\_extension");
    }

    #[test]
    fn discovers_only_dice_files_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.dice", "a.DICE", "notes.txt", "c.dice.bak"] {
            std::fs::write(dir.path().join(name), "true").expect("write");
        }
        std::fs::create_dir(dir.path().join("nested.dice")).expect("mkdir");

        let found = discover_benchmarks(dir.path()).expect("discover");
        let names: Vec<_> = found
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, vec!["a.DICE", "b.dice"]);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.dice"), "true").expect("write");
        std::os::unix::fs::symlink(dir.path().join("gone.dice"), dir.path().join("b.dice"))
            .expect("symlink");

        let found = discover_benchmarks(dir.path()).expect("discover");
        assert_eq!(found, vec![dir.path().join("a.dice")]);
    }

    #[test]
    fn missing_directory_is_a_configuration_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing");
        let err = discover_benchmarks(&missing).expect_err("should fail");
        assert!(matches!(err, Error::InvalidBenchmarkDir(p) if p == missing));
    }
}
