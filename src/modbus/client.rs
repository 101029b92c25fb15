use async_trait::async_trait;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use crate::config::Configuration;
use crate::utils::error::TransportError;

#[async_trait]
pub trait ModbusClientTrait: Send + Sync {
    async fn read_input_registers(
        &self,
        start_addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    async fn write_multiple_registers(
        &self,
        start_addr: u16,
        values: &[u16],
    ) -> Result<(), TransportError>;
}

/// Modbus-TCP master for a single device.
///
/// The connection is opened lazily on the first transaction and reused until a
/// transport failure, after which the next call reconnects.
pub struct ModbusClient {
    target: String,
    unit_id: u8,
    timeout: Duration,
    context: Mutex<Option<Context>>,
}

impl ModbusClient {
    pub fn new(target: String, unit_id: u8, timeout: Duration) -> Self {
        info!("🔌 Modbus TCP target: {} (unit {}, timeout {:?})", target, unit_id, timeout);
        Self {
            target,
            unit_id,
            timeout,
            context: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        Self::new(config.target(), config.settings.unit_id, config.timeout())
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    async fn connect(&self) -> Result<Context, TransportError> {
        let socket_addr = tokio::net::lookup_host(&self.target)
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", self.target, e)))?
            .next()
            .ok_or_else(|| TransportError::ConnectFailed(format!("{}: no address resolved", self.target)))?;

        let ctx = timeout(self.timeout, tcp::connect_slave(socket_addr, Slave(self.unit_id)))
            .await?
            .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", self.target, e)))?;

        debug!("Connected to {}", socket_addr);
        Ok(ctx)
    }
}

#[async_trait]
impl ModbusClientTrait for ModbusClient {
    async fn read_input_registers(
        &self,
        start_addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let mut guard = self.context.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let Some(ctx) = guard.as_mut() else {
            return Err(TransportError::ConnectFailed(self.target.clone()));
        };

        let (outcome, reconnect) = match timeout(self.timeout, ctx.read_input_registers(start_addr, count)).await {
            Ok(Ok(Ok(words))) if words.len() == count as usize => (Ok(words), false),
            Ok(Ok(Ok(words))) => (
                Err(TransportError::ProtocolError(format!(
                    "expected {} registers, got {}",
                    count,
                    words.len()
                ))),
                false,
            ),
            Ok(Ok(Err(exception))) => (
                Err(TransportError::ProtocolError(format!("Modbus exception: {:?}", exception))),
                false,
            ),
            Ok(Err(e)) => (Err(TransportError::ProtocolError(e.to_string())), true),
            Err(_) => (Err(TransportError::Timeout), true),
        };

        if reconnect {
            warn!("🔌 Dropping connection to {} after failed read", self.target);
            *guard = None;
        }
        outcome
    }

    async fn write_multiple_registers(
        &self,
        start_addr: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        let mut guard = self.context.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let Some(ctx) = guard.as_mut() else {
            return Err(TransportError::ConnectFailed(self.target.clone()));
        };

        let (outcome, reconnect) = match timeout(self.timeout, ctx.write_multiple_registers(start_addr, values)).await {
            Ok(Ok(Ok(()))) => (Ok(()), false),
            Ok(Ok(Err(exception))) => (
                Err(TransportError::ProtocolError(format!("Modbus exception: {:?}", exception))),
                false,
            ),
            Ok(Err(e)) => (Err(TransportError::ProtocolError(e.to_string())), true),
            Err(_) => (Err(TransportError::Timeout), true),
        };

        if reconnect {
            warn!("🔌 Dropping connection to {} after failed write", self.target);
            *guard = None;
        }
        outcome
    }
}
