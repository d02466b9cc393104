use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::runner::Tool;

pub type PipeResult<T> = Result<T, PipeError>;

#[derive(Debug, Error)]
pub enum PipeError {
    #[error("{} not found", .path.display())]
    NotFound { path: PathBuf },

    #[error("{} already exists; pass --overwrite to replace it", .path.display())]
    OutputExists { path: PathBuf },

    #[error("failed to start {tool} ({program})")]
    Spawn {
        tool: Tool,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} {}{}", format_code(.code), format_stderr(.stderr))]
    ToolFailed {
        tool: Tool,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unusable probe output: {0}")]
    Metadata(String),

    #[error("invalid frame rate: {0}")]
    FrameRate(String),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    InvalidArgument(String),
}

impl PipeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PipeError::Io {
            path: path.into(),
            source,
        }
    }
}

fn format_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{trimmed}")
    }
}
