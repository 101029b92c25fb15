pub mod client;
pub mod codec;
pub mod gate;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod protocol;

pub use client::{ModbusClient, ModbusClientTrait};
pub use gate::{GateStats, TransportGate};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockModbusClient;
pub use protocol::ModbusRequest;
