use thiserror::Error;

/// Startup-fatal configuration failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Configuration parse error: {0}")]
    Parse(String),

    #[error("Invalid register layout: {0}")]
    Layout(String),
}

/// Device I/O failures. Always recoverable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Protocol error: {0}")]
    ProtocolError(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Register offset {offset} (width {width}) outside raw block of {len} words")]
    OutOfRange { offset: usize, width: usize, len: usize },
}

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Routine not found: {0}")]
    UnknownRoutine(String),

    #[error("Output error: {0}")]
    Output(String),
}

impl From<std::io::Error> for ConnectorError {
    fn from(err: std::io::Error) -> Self {
        ConnectorError::Output(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        ConnectorError::Output(format!("JSON error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for TransportError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        TransportError::Timeout
    }
}
