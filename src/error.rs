use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tool `{0}` is not available")]
    ToolUnavailable(String),

    #[error("Tool `{tool}` exited with status {status}")]
    ToolFailed { tool: String, status: i32 },

    #[error("Tool `{tool}` timed out after {timeout:?}")]
    ToolTimeout { tool: String, timeout: Duration },

    #[error("Malformed telemetry: {0}")]
    Malformed(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Frame {got} received after frame {last}")]
    FrameOrder { last: u32, got: u32 },
}

impl Error {
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::Malformed(msg.into())
    }
}
