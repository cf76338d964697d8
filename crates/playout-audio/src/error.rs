//! Output error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("No render device available")]
    DeviceUnavailable,

    #[error("Device format not usable: {0}")]
    FormatNegotiation(String),

    #[error("Device buffer busy")]
    BufferBusy,

    #[error("Engine not ready: {0}")]
    NotReady(&'static str),

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type OutputResult<T> = Result<T, OutputError>;
