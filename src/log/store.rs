//! Reading the log file into an ordered list of lines.

use crate::error::{Result, ViewerError};
use std::path::{Path, PathBuf};

/// The lines of the log file at the instant it was read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogLines {
    lines: Vec<String>,
}

impl LogLines {
    /// Split text on line boundaries. A trailing line without a terminator
    /// is kept; a final terminator does not produce an empty line.
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// Number of lines, including a trailing partial line.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when the log holds no lines at all.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines in file order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Iterate in display order: newest first when `newest_first` is set,
    /// file order otherwise.
    pub fn display_order(&self, newest_first: bool) -> Box<dyn Iterator<Item = &str> + '_> {
        if newest_first {
            Box::new(self.iter().rev())
        } else {
            Box::new(self.iter())
        }
    }
}

impl<S: Into<String>> FromIterator<S> for LogLines {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            lines: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Reads a log file. Holds nothing between calls.
#[derive(Debug, Clone)]
pub struct LineStore {
    path: PathBuf,
}

impl LineStore {
    /// Store backed by the file at `path`. Nothing is read until [`read_lines`](Self::read_lines).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file. Invalid UTF-8 is replaced rather than rejected,
    /// so a torn multi-byte character from a concurrent writer cannot fail
    /// the request.
    pub async fn read_lines(&self) -> Result<LogLines> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ViewerError::log_read_error(&self.path, e))?;
        Ok(LogLines::from_text(&String::from_utf8_lossy(&bytes)))
    }
}
