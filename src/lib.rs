//! Motion Controller Connector Library
//!
//! Polls a motion controller over Modbus TCP, decodes its register blocks and
//! control windows into named values, and drives the routine request/response
//! handshake (invoke, cancel, wait for completion).

pub mod cli;
pub mod config;
pub mod devices;
pub mod modbus;
pub mod output;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::{Configuration, RegisterType, Routine, Settings};
pub use devices::{ControlState, HistoryEntry, Register, RegisterBlock};
pub use modbus::{ModbusClient, ModbusClientTrait, TransportGate};
#[cfg(any(test, feature = "mock"))]
pub use modbus::MockModbusClient;
pub use output::{ConsoleFormatter, CsvFormatter, DataFormatter, DataSender, JsonFormatter};
pub use services::{Connector, ConnectorSnapshot, PollHandle, PollReport, PollStats, Publisher};
pub use utils::error::{ConfigError, ConnectorError, DecodeError, TransportError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
