use log::debug;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::client::ModbusClientTrait;
use super::codec;
use super::protocol::ModbusRequest;
use crate::utils::error::TransportError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub transactions: u64,
    pub failures: u64,
}

/// Serializes all device I/O for one connector.
///
/// The lock is held for the full round trip, so reads and writes issued from
/// the poll loop and from callers are totally ordered on the wire.
pub struct TransportGate {
    client: Arc<dyn ModbusClientTrait>,
    lock: Mutex<()>,
    transactions: AtomicU64,
    failures: AtomicU64,
}

impl TransportGate {
    pub fn new(client: Arc<dyn ModbusClientTrait>) -> Self {
        Self {
            client,
            lock: Mutex::new(()),
            transactions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub async fn read_registers(&self, start: u16, count: u16) -> Result<Vec<u16>, TransportError> {
        let request = ModbusRequest::ReadInputRegisters { start, count };
        let _guard = self.lock.lock().await;
        let result = self.client.read_input_registers(start, count).await;
        self.record(&request, result.as_ref().err());
        result
    }

    pub async fn write_registers(&self, start: u16, values: &[u16]) -> Result<(), TransportError> {
        let request = ModbusRequest::WriteMultipleRegisters {
            start,
            values: values.to_vec(),
        };
        let _guard = self.lock.lock().await;
        let result = self.client.write_multiple_registers(start, values).await;
        self.record(&request, result.as_ref().err());
        result
    }

    pub async fn write_register(&self, start: u16, value: u16) -> Result<(), TransportError> {
        self.write_registers(start, &[value]).await
    }

    pub async fn write_int32(&self, start: u16, value: i32) -> Result<(), TransportError> {
        self.write_registers(start, &codec::encode_int32(value)).await
    }

    pub async fn write_float(&self, start: u16, value: f32) -> Result<(), TransportError> {
        self.write_registers(start, &codec::encode_float(value)).await
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            transactions: self.transactions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn record(&self, request: &ModbusRequest, error: Option<&TransportError>) {
        self.transactions.fetch_add(1, Ordering::Relaxed);
        match error {
            Some(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                debug!("✖ {} failed: {}", request, e);
            }
            None => debug!("✔ {}", request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::mock::MockModbusClient;
    use std::time::Duration;

    #[tokio::test]
    async fn test_read_and_write_go_through_client() {
        let mock = Arc::new(MockModbusClient::new());
        mock.set_registers(100, &[7, 8]);
        let gate = TransportGate::new(mock.clone());

        assert_eq!(gate.read_registers(100, 2).await.unwrap(), vec![7, 8]);
        gate.write_float(31000, 1.5).await.unwrap();
        assert_eq!(mock.registers(31000, 2), vec![0x0000, 0x3FC0]);
        gate.write_int32(40000, -2).await.unwrap();
        assert_eq!(mock.registers(40000, 2), vec![0xFFFE, 0xFFFF]);

        assert_eq!(gate.stats(), GateStats { transactions: 3, failures: 0 });
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let mock = Arc::new(MockModbusClient::new());
        mock.fail_at(500);
        let gate = TransportGate::new(mock.clone());

        assert!(gate.read_registers(500, 1).await.is_err());
        assert!(gate.write_register(500, 1).await.is_err());
        assert_eq!(gate.stats(), GateStats { transactions: 2, failures: 2 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_never_overlap() {
        let mock = Arc::new(MockModbusClient::with_latency(Duration::from_millis(2)));
        let gate = Arc::new(TransportGate::new(mock.clone()));

        let mut handles = Vec::new();
        for i in 0..16u16 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    gate.read_registers(i, 4).await.map(|_| ())
                } else {
                    gate.write_registers(i, &[i, i]).await
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(mock.requests().len(), 16);
        assert_eq!(mock.overlapping_transactions(), 0);
    }
}
