use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing command-line configuration.
    Config,
    /// The table could not be read, or returned something unusable.
    Read,
    /// Results could not be written out.
    Output,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("the {0} flag is required")]
    MissingFlag(&'static str),
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("could not load fixture {}", path.display())]
    Fixture {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid column regex: {0}")]
    Regex(#[from] regex::Error),
    #[error("Incorrect number of lat/long pairs in row {row_key} ({count} cells)")]
    OddCellCount { row_key: String, count: usize },
    #[error("could not read {target}")]
    Read {
        target: String,
        #[source]
        source: Box<Error>,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn read(target: impl Into<String>, source: Error) -> Self {
        Error::Read {
            target: target.into(),
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingFlag(_) | Error::Fixture { .. } | Error::InvalidEndpoint(_) => {
                ErrorKind::Config
            }
            Error::Io(_) => ErrorKind::Output,
            Error::Read { source, .. } => match source.kind() {
                ErrorKind::Output => ErrorKind::Output,
                _ => ErrorKind::Read,
            },
            _ => ErrorKind::Read,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Decode(value.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(value: base64::DecodeError) -> Self {
        Error::Decode(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
