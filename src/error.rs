//! Error types.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The step of a delivery that was in flight when a failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Write,
    Read,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Connect => "connect",
            Stage::Write => "write",
            Stage::Read => "read",
        })
    }
}

/// Why a delivery to one endpoint failed. Never fatal to the rest of a batch.
///
/// A read that fails outright is not an error: it is reported as an empty
/// response, the same as a peer that closes without replying.
#[derive(Debug, Error)]
pub enum SendError {
    /// Endpoint unreachable, refused, or the host didn't resolve.
    #[error("connection failed: {0}")]
    Connect(#[source] io::Error),

    /// Reset or broken pipe while writing the frame.
    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    /// The configured bound for `Stage` expired.
    #[error("{0} timed out")]
    Timeout(Stage),
}

impl SendError {
    /// The I/O error kind behind the failure, if there is one.
    pub fn kind(&self) -> Option<io::ErrorKind> {
        match self {
            SendError::Connect(e) | SendError::Write(e) => Some(e.kind()),
            SendError::Timeout(_) => None,
        }
    }
}

/// Crate level errors: bad input, configuration and generation problems.
#[derive(Debug, Error)]
pub enum Error {
    #[error("payload is empty")]
    EmptyPayload,

    #[error("no endpoints to send to")]
    NoEndpoints,

    #[error("invalid endpoint '{0}': expected host:port or port")]
    InvalidEndpoint(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to parse {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("dataset has no column '{0}'")]
    MissingColumn(String),

    #[error("no dataset loaded, but a field reads column '{0}'")]
    MissingDataset(String),

    #[error("template variable '{0}' is not defined")]
    MissingVariable(String),

    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("value pool for {0} is empty")]
    EmptyPool(String),

    #[error("invalid range {min}..={max} for {field}")]
    InvalidRange { field: String, min: u64, max: u64 },

    #[error("invalid field reference '{0}': expected SEG-N, e.g. ORC-5")]
    InvalidField(String),

    #[error("invalid timestamp format '{0}'")]
    InvalidTimestampFormat(String),

    #[error("message sequence number exhausted")]
    SequenceExhausted,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
