use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    LineNo,
    error::{Error, Result},
};

/// Source text of a script and where it came from. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    path: PathBuf,
    source: String,
}

impl Script {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            source,
        })
    }

    /// An in-memory script; `name` doubles as its path.
    pub fn from_source(name: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            path: name.into(),
            source: source.into(),
        }
    }

    /// Display name: the file stem of the path.
    pub fn name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("script")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The directory holding the script, if the path has one.
    pub fn directory(&self) -> Option<&Path> {
        self.path.parent().filter(|dir| !dir.as_os_str().is_empty())
    }

    /// 1-based source line, without its line terminator.
    pub fn line(&self, line: LineNo) -> Option<&str> {
        let index = usize::try_from(line).ok()?.checked_sub(1)?;
        self.source.lines().nth(index)
    }

    pub fn line_count(&self) -> usize {
        self.source.lines().count()
    }
}
