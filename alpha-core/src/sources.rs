//! Discovery of the source files that make up a package.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::CoreResult;

/// Extension of Alpha source files.
pub const SOURCE_EXTENSION: &str = "al";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub contents: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        SourceFile {
            path: path.into(),
            contents: contents.into(),
        }
    }

    pub fn read(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        Ok(SourceFile::new(path, contents))
    }
}

/// Every `*.al` file below `root`, ordered by path.
pub fn load_sources(root: impl AsRef<Path>) -> CoreResult<Vec<SourceFile>> {
    let root = root.as_ref();
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION)
        {
            files.push(SourceFile::read(path)?);
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(root = %root.display(), files = files.len(), "loaded package sources");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use pretty_assertions::assert_eq;

    #[test]
    fn finds_nested_sources_in_path_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        let nested = root.join("nested");
        fs::create_dir_all(&nested).expect("create nested dir");
        fs::write(root.join("b.al"), "package demo;").expect("write b");
        fs::write(root.join("a.al"), "package demo;").expect("write a");
        fs::write(nested.join("c.al"), "package demo;").expect("write c");
        fs::write(root.join("notes.txt"), "not a source").expect("write notes");

        let files = load_sources(root).expect("load");
        let names: Vec<_> = files
            .iter()
            .map(|file| file.path.strip_prefix(root).expect("under root").to_path_buf())
            .collect();
        assert_eq!(
            names,
            [
                PathBuf::from("a.al"),
                PathBuf::from("b.al"),
                PathBuf::from("nested/c.al"),
            ]
        );
        assert_eq!(files[0].contents, "package demo;");
    }

    #[test]
    fn missing_root_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_sources(dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, CoreError::SourceIo(_)));
    }
}
