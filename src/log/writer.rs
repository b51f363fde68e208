//! Appending lines to the log file.

use crate::error::{Result, ViewerError};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Greeting printed before reading messages interactively.
pub const INTERACTIVE_BANNER: &str = "Logger started. Type messages to log. Type 'exit' to quit.";

/// Input line that ends an interactive session.
pub const EXIT_COMMAND: &str = "exit";

/// Appends one line per message to a log file.
#[derive(Debug, Clone)]
pub struct LogWriter {
    path: PathBuf,
}

impl LogWriter {
    /// Writer appending to `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `message` as a single line, creating the file if needed.
    ///
    /// Line breaks inside the message become spaces so one call always adds
    /// exactly one line. The line and its terminator go out in one write.
    pub async fn append(&self, message: &str) -> Result<()> {
        let mut line = one_line(message);
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| open_error(&self.path, e))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Appended {} bytes to {}", line.len(), self.path.display());
        Ok(())
    }

    /// Join command-line words with single spaces and append them as one line.
    pub async fn append_words<S: AsRef<str>>(&self, words: &[S]) -> Result<()> {
        let message = words
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(" ");
        self.append(&message).await
    }

    /// Read lines from `input` and append each one until `exit` or end of input.
    ///
    /// The banner is written to `output` first. Returns the number of lines
    /// appended.
    pub async fn run_interactive<R, W>(&self, input: R, mut output: W) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        output
            .write_all(format!("{}\n", INTERACTIVE_BANNER).as_bytes())
            .await?;
        output.flush().await?;

        let mut lines = input.lines();
        let mut count = 0;
        while let Some(line) = lines.next_line().await? {
            if line == EXIT_COMMAND {
                break;
            }
            self.append(&line).await?;
            count += 1;
        }
        Ok(count)
    }
}

fn one_line(message: &str) -> String {
    message
        .trim_end_matches(['\r', '\n'])
        .replace(['\r', '\n'], " ")
}

fn open_error(path: &Path, source: std::io::Error) -> ViewerError {
    ViewerError::Io(std::io::Error::new(
        source.kind(),
        format!("Failed to open log file {}: {}", path.display(), source),
    ))
}
