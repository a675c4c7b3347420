//! Glob resolution against the build root.

use std::path::Path;

use glob::glob;
use tracing::warn;

use crate::bundle::pipeline::BuildError;
use crate::model::{FileGlob, FileSet};

/// Expands `input` into the files to build, relative to `root`.
///
/// A pattern is matched with `root` as its base, in the glob crate's natural
/// order; no matches is an empty set. An explicit list is returned unchanged.
/// This performs blocking filesystem I/O.
///
/// # Errors
///
/// Returns [`BuildError::Resolution`] if the pattern is malformed.
pub fn resolve(root: &Path, input: &FileGlob) -> Result<FileSet, BuildError> {
    let pattern = match input {
        FileGlob::Files(files) => return Ok(files.clone()),
        FileGlob::Pattern(pattern) => pattern,
    };

    // Only `pattern` may contain glob syntax; the root is matched literally.
    let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
    let full_pattern = Path::new(&escaped_root).join(pattern);
    let paths = glob(&full_pattern.to_string_lossy()).map_err(|e| BuildError::Resolution {
        pattern: pattern.clone(),
        source: e,
    })?;

    let mut files = FileSet::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => {
                let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                files.push(relative);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Skipping unreadable glob entry"),
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("styles")).unwrap();
        fs::write(dir.path().join("index.js"), b"").unwrap();
        fs::write(dir.path().join("styles/a.css"), b"").unwrap();
        fs::write(dir.path().join("styles/b.styl"), b"").unwrap();
        dir
    }

    #[test]
    fn test_pattern_is_relative_to_root() {
        let dir = fixture();
        let files = resolve(dir.path(), &FileGlob::from("styles/*")).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("styles/a.css"), PathBuf::from("styles/b.styl")]
        );
    }

    #[test]
    fn test_directories_are_skipped() {
        let dir = fixture();
        let files = resolve(dir.path(), &FileGlob::from("*")).unwrap();
        assert_eq!(files, vec![PathBuf::from("index.js")]);
    }

    #[test]
    fn test_no_matches_is_empty() {
        let dir = fixture();
        let files = resolve(dir.path(), &FileGlob::from("**/*.coffee")).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_file_list_passes_through() {
        let list = vec!["missing.js", "a.css", "missing.js"];
        let files = resolve(Path::new("/nonexistent"), &FileGlob::from(list)).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("missing.js"),
                PathBuf::from("a.css"),
                PathBuf::from("missing.js")
            ]
        );
    }

    #[test]
    fn test_root_with_glob_metacharacters() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("site[v2]*?");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.css"), b"").unwrap();

        let files = resolve(&root, &FileGlob::from("*.css")).unwrap();
        assert_eq!(files, vec![PathBuf::from("a.css")]);
    }

    #[test]
    fn test_malformed_pattern() {
        let dir = fixture();
        let err = resolve(dir.path(), &FileGlob::from("styles/[*.css")).unwrap_err();
        assert!(matches!(err, BuildError::Resolution { .. }));
    }
}
