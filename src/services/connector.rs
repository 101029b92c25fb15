use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};

use crate::config::{Configuration, Routine, ROUTINE_PARAMETER_SLOTS};
use crate::devices::{ControlState, Register, RegisterBlock};
use crate::modbus::codec;
use crate::modbus::protocol::{
    ACTIVE_ROUTINE_ADDR, CANCEL_SENTINEL, CONTROL_WINDOW_LEN, FLOAT_CONTROL_START, INT_CONTROL_START,
    REQUEST_COUNT_ADDR,
};
use crate::modbus::{GateStats, ModbusClient, ModbusClientTrait, TransportGate};
use crate::utils::error::ConnectorError;

/// Read-failure bookkeeping for the poll loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollStats {
    pub ticks: u64,
    pub block_failures: u64,
    pub control_failures: u64,
    pub last_success: Option<DateTime<Utc>>, // last tick without any failure
    pub last_error: Option<String>,
}

/// Outcome of a single poll tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub blocks_updated: usize,
    pub blocks_failed: usize,
    pub control_updated: bool,
}

impl PollReport {
    pub fn is_clean(&self) -> bool {
        self.blocks_failed == 0 && self.control_updated
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectorSnapshot {
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub busy: bool,
    pub control: ControlState,
    pub blocks: Vec<RegisterBlock>,
    pub stats: PollStats,
    pub transport: GateStats,
}

struct ConnectorState {
    blocks: BTreeMap<String, RegisterBlock>,
    control: ControlState,
    stats: PollStats,
}

/// Connector for one Modbus-TCP motion device.
///
/// Register blocks and control state are written only by the poll tick; every
/// reader gets a copy.
#[derive(Clone)]
pub struct Connector {
    config: Arc<Configuration>,
    gate: Arc<TransportGate>,
    state: Arc<RwLock<ConnectorState>>,
}

impl Connector {
    pub fn new(config: Configuration) -> Result<Self, ConnectorError> {
        let client = ModbusClient::from_config(&config);
        Self::with_client(config, Arc::new(client))
    }

    pub fn with_client(config: Configuration, client: Arc<dyn ModbusClientTrait>) -> Result<Self, ConnectorError> {
        config.validate()?;

        info!("🚀 Initializing connector for {}", config.target());
        info!(
            "📋 {} register blocks, {} routines, {} error codes",
            config.register_blocks.len(),
            config.routines.len(),
            config.error_codes.len()
        );

        let blocks = config
            .register_blocks
            .iter()
            .map(|(name, block)| (name.clone(), RegisterBlock::from_config(name, block)))
            .collect();

        Ok(Self {
            config: Arc::new(config),
            gate: Arc::new(TransportGate::new(client)),
            state: Arc::new(RwLock::new(ConnectorState {
                blocks,
                control: ControlState::default(),
                stats: PollStats::default(),
            })),
        })
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn connector_address(&self) -> &str {
        &self.config.settings.ip_address
    }

    // Catalog lookups delegate to the immutable configuration.

    pub fn routine_names(&self) -> Vec<String> {
        self.config.routine_names()
    }

    pub fn routine(&self, name: &str) -> Option<&Routine> {
        self.config.routine(name)
    }

    pub fn routine_index(&self, name: &str) -> Option<u16> {
        self.config.routine_index(name)
    }

    pub fn routine_name(&self, index: u16) -> String {
        self.config.routine_name(index)
    }

    pub fn routine_position(&self, index: u16) -> Option<usize> {
        self.config.routine_position(index)
    }

    pub fn register_groups(&self) -> Vec<String> {
        self.config.register_groups()
    }

    pub fn error_string(&self, code: i32) -> String {
        self.config.error_string(code)
    }

    // Snapshots

    pub async fn control(&self) -> ControlState {
        self.state.read().await.control.clone()
    }

    pub async fn busy(&self) -> bool {
        self.state.read().await.control.busy()
    }

    pub async fn stats(&self) -> PollStats {
        self.state.read().await.stats.clone()
    }

    pub async fn registers(&self, group: &str) -> Vec<Register> {
        let state = self.state.read().await;
        state
            .blocks
            .values()
            .flat_map(|b| b.registers.iter())
            .filter(|r| r.group == group)
            .cloned()
            .collect()
    }

    pub async fn snapshot(&self) -> ConnectorSnapshot {
        let state = self.state.read().await;
        ConnectorSnapshot {
            target: self.config.target(),
            timestamp: Utc::now(),
            busy: state.control.busy(),
            control: state.control.clone(),
            blocks: state.blocks.values().cloned().collect(),
            stats: state.stats.clone(),
            transport: self.gate.stats(),
        }
    }

    /// One poll tick: every configured block, then both control windows.
    ///
    /// Read failures never propagate; the affected values stay stale and the
    /// failure is counted in `PollStats`.
    pub async fn poll_once(&self) -> PollReport {
        let mut report = PollReport::default();
        let mut last_error: Option<String> = None;

        for (name, block) in &self.config.register_blocks {
            let result = self.gate.read_registers(block.start_address, block.count).await;
            let outcome = match result {
                Ok(raw) => {
                    let mut state = self.state.write().await;
                    match state.blocks.get_mut(name) {
                        Some(target) => target.update(&raw).map_err(ConnectorError::from),
                        None => Ok(()),
                    }
                }
                Err(e) => Err(ConnectorError::from(e)),
            };

            match outcome {
                Ok(()) => report.blocks_updated += 1,
                Err(e) => {
                    warn!(
                        "⚠️  Block '{}' [{}..{}) not updated: {}",
                        name,
                        block.start_address,
                        block.start_address as u32 + block.count as u32,
                        e
                    );
                    report.blocks_failed += 1;
                    last_error = Some(format!("{}: {}", name, e));
                }
            }
        }

        let ints = self.gate.read_registers(INT_CONTROL_START, CONTROL_WINDOW_LEN).await;
        let floats = self.gate.read_registers(FLOAT_CONTROL_START, CONTROL_WINDOW_LEN).await;
        let control = match (ints, floats) {
            (Ok(ints), Ok(floats)) => self
                .config
                .settings
                .profile
                .decode(&ints, &floats, &self.config)
                .map_err(ConnectorError::from),
            (Err(e), _) | (_, Err(e)) => Err(ConnectorError::from(e)),
        };

        let mut state = self.state.write().await;
        match control {
            Ok(control) => {
                state.control = control;
                report.control_updated = true;
            }
            Err(e) => {
                warn!("⚠️  Control windows not updated: {}", e);
                state.stats.control_failures += 1;
                last_error = Some(format!("control: {}", e));
            }
        }

        state.stats.ticks += 1;
        state.stats.block_failures += report.blocks_failed as u64;
        if report.is_clean() {
            state.stats.last_success = Some(Utc::now());
        }
        if last_error.is_some() {
            state.stats.last_error = last_error;
        }

        debug!(
            "🔄 Tick {}: {} blocks updated, {} failed, control {}",
            state.stats.ticks,
            report.blocks_updated,
            report.blocks_failed,
            if report.control_updated { "updated" } else { "stale" }
        );
        report
    }

    /// Spawns the poll loop.
    ///
    /// The first tick runs after `StartupDelay`; the loop then sleeps the full
    /// interval after every tick (fixed delay). Stopping, or dropping the
    /// handle, ends the loop at the next interval boundary.
    pub fn start(&self) -> PollHandle {
        let (shutdown, mut stop_rx) = watch::channel(false);
        let connector = self.clone();
        let startup_delay = self.config.startup_delay();
        let interval = self.config.interval();

        let task = tokio::spawn(async move {
            info!(
                "🔄 Poll loop for {} starting in {:?} (interval {:?})",
                connector.config.target(),
                startup_delay,
                interval
            );

            tokio::select! {
                _ = sleep(startup_delay) => {}
                _ = stop_rx.changed() => {
                    info!("🛑 Poll loop stopped before first tick");
                    return;
                }
            }

            loop {
                connector.poll_once().await;

                if *stop_rx.borrow() {
                    break;
                }
                tokio::select! {
                    _ = sleep(interval) => {}
                    _ = stop_rx.changed() => break,
                }
            }

            info!("🛑 Poll loop for {} stopped", connector.config.target());
        });

        PollHandle { shutdown, task }
    }

    /// Triggers a routine on the device.
    ///
    /// Parameters go to the float control window, the routine index to 30002,
    /// and finally `response_count + 1` to the request counter at 30000, which
    /// is what the device watches for.
    pub async fn invoke(&self, routine_index: u16, parameters: &[f32]) -> Result<(), ConnectorError> {
        if parameters.len() > ROUTINE_PARAMETER_SLOTS {
            return Err(ConnectorError::InvalidParameters(format!(
                "{} parameters given, the device accepts at most {}",
                parameters.len(),
                ROUTINE_PARAMETER_SLOTS
            )));
        }

        if self.busy().await {
            warn!("⚠️  Invoking routine {} while a previous request is outstanding", routine_index);
        }

        if !parameters.is_empty() {
            let words: Vec<u16> = parameters.iter().flat_map(|p| codec::encode_float(*p)).collect();
            self.gate.write_registers(FLOAT_CONTROL_START, &words).await?;
        }
        self.gate.write_register(ACTIVE_ROUTINE_ADDR, routine_index).await?;

        let request_count = self.control().await.response_count.wrapping_add(1);
        self.gate.write_register(REQUEST_COUNT_ADDR, request_count).await?;

        {
            let mut state = self.state.write().await;
            state.control.request_count = request_count;
            state.control.active_routine = routine_index;
        }

        info!(
            "▶️  Routine {} ({}) requested with {:?}, request count {}",
            routine_index,
            self.config.routine_name(routine_index),
            parameters,
            request_count
        );
        Ok(())
    }

    /// Invokes a configured routine; parameters not given fall back to the
    /// configured defaults. Returns the device routine index.
    pub async fn invoke_by_name(&self, name: &str, parameters: &[f32]) -> Result<u16, ConnectorError> {
        let index = self
            .config
            .routine_index(name)
            .ok_or_else(|| ConnectorError::UnknownRoutine(name.to_string()))?;

        if parameters.len() > ROUTINE_PARAMETER_SLOTS {
            return Err(ConnectorError::InvalidParameters(format!(
                "routine '{}' takes at most {} parameters",
                name, ROUTINE_PARAMETER_SLOTS
            )));
        }

        let mut values = self
            .config
            .default_parameters(name)
            .unwrap_or_else(|| vec![0.0; ROUTINE_PARAMETER_SLOTS]);
        values[..parameters.len()].copy_from_slice(parameters);

        self.invoke(index, &values).await?;
        Ok(index)
    }

    /// Asks the device to abort whatever routine is running.
    pub async fn cancel_routine(&self) -> Result<(), ConnectorError> {
        self.gate.write_register(REQUEST_COUNT_ADDR, CANCEL_SENTINEL).await?;
        info!("⏹️  Cancel requested");
        Ok(())
    }

    /// Waits for the device to catch up with the last request.
    ///
    /// Relies on a running poll loop to refresh the counters. A zero `limit`
    /// waits forever. Returns `false` when the limit elapsed first.
    pub async fn wait_until_idle(&self, limit: Duration) -> bool {
        let started = Instant::now();
        loop {
            if !self.busy().await {
                return true;
            }
            match next_pause(started, limit, self.config.interval()) {
                Some(pause) => sleep(pause).await,
                None => return false,
            }
        }
    }

    /// Like `wait_until_idle`, but drives the ticks itself, starting right
    /// away. For callers that have no poll loop running.
    pub async fn poll_until_idle(&self, limit: Duration) -> bool {
        let started = Instant::now();
        loop {
            self.poll_once().await;
            if !self.busy().await {
                return true;
            }
            match next_pause(started, limit, self.config.interval()) {
                Some(pause) => sleep(pause).await,
                None => return false,
            }
        }
    }

    /// Raw words of an arbitrary register range, for diagnostics.
    pub async fn read_raw(&self, start: u16, count: u16) -> Result<Vec<u16>, ConnectorError> {
        Ok(self.gate.read_registers(start, count).await?)
    }
}

// Sleep before the next busy check: one interval, cut short at the limit.
// `None` once the limit has passed; a zero limit never runs out.
fn next_pause(started: Instant, limit: Duration, interval: Duration) -> Option<Duration> {
    if limit.is_zero() {
        return Some(interval);
    }
    let remaining = limit.checked_sub(started.elapsed())?;
    if remaining.is_zero() {
        return None;
    }
    Some(interval.min(remaining))
}

/// Explicit stop handle for a running poll loop.
pub struct PollHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Signals the loop and waits for it to finish its current tick.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("❌ Poll loop ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
