pub mod error;

pub use error::{ConfigError, ConnectorError, DecodeError, TransportError};
