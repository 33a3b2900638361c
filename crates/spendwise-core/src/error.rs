//! Error types for Spendwise
//!
//! Every pipeline stage translates failures from its underlying libraries
//! (image, reqwest, serde_json) into one of these variants at its own boundary.
//! A reconciliation mismatch is not an error; see `ReceiptResult::total_valid`.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Which remote call a transport failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportStage {
    /// API key to bearer token exchange with the identity service
    TokenExchange,
    /// Text generation or chat inference call
    Inference,
    /// Speech recognition call
    Speech,
}

impl fmt::Display for TransportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenExchange => write!(f, "Auth"),
            Self::Inference => write!(f, "API"),
            Self::Speech => write!(f, "Speech API"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing credentials: {0}")]
    Credentials(String),

    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("Image encode error: {0}")]
    ImageEncode(String),

    #[error("{stage} error: {detail}")]
    Transport {
        stage: TransportStage,
        detail: String,
    },

    #[error("{message}")]
    Parse { message: String, raw: String },

    #[error("No speech detected in audio")]
    NoSpeech,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a transport error from a failed HTTP exchange
    pub fn transport(stage: TransportStage, detail: impl Into<String>) -> Self {
        Error::Transport {
            stage,
            detail: detail.into(),
        }
    }

    /// Map a reqwest failure (connect, timeout, body decode) for a stage
    pub fn from_reqwest(stage: TransportStage, err: reqwest::Error) -> Self {
        let detail = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else {
            err.to_string()
        };
        Error::transport(stage, detail)
    }

    /// Coarse error category for collaborators
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Credentials(_) => ErrorKind::Credentials,
            Error::ImageDecode(_) | Error::ImageEncode(_) => ErrorKind::ImageDecode,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Parse { .. } | Error::NoSpeech => ErrorKind::Parse,
            Error::Config(_) | Error::InvalidData(_) | Error::Io(_) | Error::Json(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Raw model text retained for manual recovery, if this failure has one
    pub fn raw(&self) -> Option<&str> {
        match self {
            Error::Parse { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// Convert into the serialisable failure value handed to callers
    pub fn to_report(&self) -> FailureReport {
        FailureReport {
            error: self.to_string(),
            kind: self.kind(),
            raw: self.raw().map(str::to_string),
        }
    }
}

/// Error category tag carried on failure reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Credentials,
    ImageDecode,
    Transport,
    Parse,
    Internal,
}

/// Structured failure value: `{"error": ..., "kind": ..., "raw": ...}`
///
/// Callers treat any failure report as "no expenses extracted" and may show
/// `raw` to the user for manual correction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl From<Error> for FailureReport {
    fn from(err: Error) -> Self {
        err.to_report()
    }
}
