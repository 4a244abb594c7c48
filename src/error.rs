use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("IO error while reading bundle: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse bundle manifest: {0}")]
    ManifestParse(#[from] serde_json::Error),
    #[error("Partition {0:?} not found in bundle")]
    PartitionNotFound(String),
    #[error("Invalid manifest: {reason}")]
    InvalidManifest {
        reason: String,
        #[source]
        source: Option<Box<Error>>,
    },
    #[error("Device reported flash failure: {0}")]
    FlashFailed(DeviceError),
    #[error("Timed out waiting for the flashing transport")]
    Timeout,
}

impl Error {
    pub(crate) fn invalid_manifest(reason: impl Into<String>, source: Option<Error>) -> Self {
        Error::InvalidManifest {
            reason: reason.into(),
            source: source.map(Box::new),
        }
    }
}

/// Structured outcome of the vendor flashing capability. The raw result
/// code space is opaque; `0` is success, everything else is carried
/// through unmodified for the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceError {
    pub code: i32,
    pub message: Option<String>,
}

impl DeviceError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        DeviceError {
            code,
            message: Some(message.into()),
        }
    }
}

impl From<i32> for DeviceError {
    fn from(code: i32) -> Self {
        DeviceError {
            code,
            message: None,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "code {} ({})", self.code, msg),
            None => write!(f, "code {}", self.code),
        }
    }
}

impl std::error::Error for DeviceError {}
