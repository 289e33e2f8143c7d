//! Mapping between Unreal class names and source files.
//!
//! UnrealScript sources live in a fixed layout under each configured root:
//! `<root>/<PACKAGE>/Classes/<CLASS>.uc` corresponds to `PACKAGE.CLASS`.
//! Roots come from the launch/attach request and are tried in order.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceMapError {
    #[error("source roots do not exist: {}", .0.join(", "))]
    MissingRoots(Vec<String>),

    #[error("unexpected source path format: {0}")]
    BadSourcePath(String),
}

#[derive(Debug, Default)]
pub struct SourceMap {
    roots: Vec<PathBuf>,
}

impl SourceMap {
    /// Build a map over the configured roots; every root must exist.
    pub fn new(roots: Vec<PathBuf>) -> Result<Self, SourceMapError> {
        let missing: Vec<String> = roots
            .iter()
            .filter(|root| !root.is_dir())
            .map(|root| root.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SourceMapError::MissingRoots(missing));
        }
        Ok(Self { roots })
    }

    /// Derive `PACKAGE.CLASS` from a source path. The class is the file stem
    /// and the package is the directory above `Classes`.
    pub fn source_to_class(path: &str) -> Result<String, SourceMapError> {
        let bad = || SourceMapError::BadSourcePath(path.to_owned());
        let source = Path::new(path);
        let class = source.file_stem().and_then(|s| s.to_str()).ok_or_else(bad)?;
        let package = source
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .and_then(|s| s.to_str())
            .ok_or_else(bad)?;
        Ok(format!("{package}.{class}"))
    }

    /// Resolve a `PACKAGE.CLASS` name to the first matching file under the
    /// configured roots.
    pub fn class_to_source(&self, class_name: &str) -> Option<PathBuf> {
        let (package, class) = class_name.split_once('.')?;
        self.roots
            .iter()
            .map(|root| {
                root.join(package)
                    .join("Classes")
                    .join(format!("{class}.uc"))
            })
            .find(|candidate| candidate.is_file())
    }
}
