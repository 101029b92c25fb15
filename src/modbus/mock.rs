//! In-memory Modbus device used by tests and offline runs.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::client::ModbusClientTrait;
use super::codec;
use super::protocol::ModbusRequest;
use crate::utils::error::TransportError;

#[derive(Default)]
pub struct MockModbusClient {
    registers: Mutex<BTreeMap<u16, u16>>,
    requests: Mutex<Vec<ModbusRequest>>,
    failing: Mutex<HashSet<u16>>,
    latency: Duration,
    in_flight: AtomicBool,
    overlaps: AtomicUsize,
}

impl MockModbusClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transaction sleeps for `latency` while marked in flight.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn set_registers(&self, start: u16, values: &[u16]) {
        if let Ok(mut map) = self.registers.lock() {
            for (i, value) in values.iter().enumerate() {
                map.insert(start.wrapping_add(i as u16), *value);
            }
        }
    }

    pub fn set_float(&self, start: u16, value: f32) {
        self.set_registers(start, &codec::encode_float(value));
    }

    pub fn registers(&self, start: u16, count: u16) -> Vec<u16> {
        match self.registers.lock() {
            Ok(map) => (0..count)
                .map(|i| map.get(&start.wrapping_add(i)).copied().unwrap_or(0))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Transactions starting at `start` fail until `recover` is called.
    pub fn fail_at(&self, start: u16) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(start);
        }
    }

    pub fn recover(&self, start: u16) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(&start);
        }
    }

    pub fn requests(&self) -> Vec<ModbusRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<(u16, Vec<u16>)> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                ModbusRequest::WriteMultipleRegisters { start, values } => Some((start, values)),
                ModbusRequest::ReadInputRegisters { .. } => None,
            })
            .collect()
    }

    pub fn clear_requests(&self) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.clear();
        }
    }

    /// Number of transactions that began while another was still in flight.
    pub fn overlapping_transactions(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    async fn transact(&self, request: ModbusRequest) -> Result<(), TransportError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let start = request.start();
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.store(false, Ordering::SeqCst);

        let failing = self.failing.lock().map(|f| f.contains(&start)).unwrap_or(false);
        if failing {
            return Err(TransportError::ConnectFailed(format!("mock failure at {}", start)));
        }
        Ok(())
    }
}

#[async_trait]
impl ModbusClientTrait for MockModbusClient {
    async fn read_input_registers(
        &self,
        start_addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.transact(ModbusRequest::ReadInputRegisters {
            start: start_addr,
            count,
        })
        .await?;
        Ok(self.registers(start_addr, count))
    }

    async fn write_multiple_registers(
        &self,
        start_addr: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        self.transact(ModbusRequest::WriteMultipleRegisters {
            start: start_addr,
            values: values.to_vec(),
        })
        .await?;
        self.set_registers(start_addr, values);
        Ok(())
    }
}
