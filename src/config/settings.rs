use clap::ArgMatches;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::utils::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "MotionKits.json";

/// Number of routine parameters the device exposes.
pub const ROUTINE_PARAMETER_SLOTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegisterType {
    #[default]
    Int16,
    Int32,
    Float,
    Hex16,
}

impl RegisterType {
    /// Number of consecutive 16-bit words the value occupies.
    pub fn width(&self) -> usize {
        match self {
            RegisterType::Int16 | RegisterType::Hex16 => 1,
            RegisterType::Int32 | RegisterType::Float => 2,
        }
    }
}

/// Selects how the two control windows are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControlProfile {
    #[default]
    Standard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Settings {
    #[serde(rename = "IPAddress", default = "default_ip_address")]
    pub ip_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_interval")]
    pub interval: u64, // milliseconds between poll ticks
    #[serde(default = "default_timeout")]
    pub timeout: u64, // per-transaction timeout in milliseconds
    #[serde(default)]
    pub unit_id: u8,
    #[serde(default = "default_startup_delay")]
    pub startup_delay: u64,
    #[serde(default)]
    pub profile: ControlProfile,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ip_address: default_ip_address(),
            port: default_port(),
            interval: default_interval(),
            timeout: default_timeout(),
            unit_id: 0,
            startup_delay: default_startup_delay(),
            profile: ControlProfile::default(),
        }
    }
}

fn default_ip_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    502
}

fn default_interval() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    3000
}

fn default_startup_delay() -> u64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterConfig {
    #[serde(default = "default_register_name")]
    pub name: String,
    #[serde(default)]
    pub offset: u16,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default)]
    pub reg_type: RegisterType,
}

fn default_register_name() -> String {
    "RegisterName".to_string()
}

fn default_group() -> String {
    "Default".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterBlockConfig {
    #[serde(default = "default_start_address")]
    pub start_address: u16,
    #[serde(default = "default_count")]
    pub count: u16,
    #[serde(default)]
    pub registers: Vec<RegisterConfig>,
}

fn default_start_address() -> u16 {
    20000
}

fn default_count() -> u16 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoutineParameter {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub default_value: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Routine {
    #[serde(default)]
    pub index: u16,
    #[serde(default)]
    pub timeout: u64, // milliseconds, 0 = no limit
    #[serde(default)]
    pub parameters: Vec<RoutineParameter>,
}

// On-disk shape. Error code keys stay strings so JSON and TOML share one path.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConfigDocument {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    register_blocks: BTreeMap<String, RegisterBlockConfig>,
    #[serde(default)]
    routine: BTreeMap<String, Routine>,
    #[serde(default)]
    error_code: BTreeMap<String, String>,
}

/// Device description loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub settings: Settings,
    pub register_blocks: BTreeMap<String, RegisterBlockConfig>,
    pub routines: BTreeMap<String, Routine>,
    pub error_codes: BTreeMap<i32, String>,
}

impl Configuration {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("📄 Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.display().to_string())
            } else {
                ConfigError::Parse(format!("{}: {}", path.display(), e))
            }
        })?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let document: ConfigDocument =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(format!("JSON error: {}", e)))?;
        Self::from_document(document)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let document: ConfigDocument =
            toml::from_str(content).map_err(|e| ConfigError::Parse(format!("TOML error: {}", e)))?;
        Self::from_document(document)
    }

    fn from_document(document: ConfigDocument) -> Result<Self, ConfigError> {
        let mut error_codes = BTreeMap::new();
        for (key, text) in document.error_code {
            let code: i32 = key
                .trim()
                .parse()
                .map_err(|_| ConfigError::Parse(format!("ErrorCode key '{}' is not an integer", key)))?;
            error_codes.insert(code, text);
        }

        let config = Self {
            settings: document.settings,
            register_blocks: document.register_blocks,
            routines: document.routine,
            error_codes,
        };

        debug!(
            "Configuration: {} register blocks, {} routines, {} error codes",
            config.register_blocks.len(),
            config.routines.len(),
            config.error_codes.len()
        );
        Ok(config)
    }

    /// Command line overrides for the target device.
    pub fn apply_overrides(&mut self, matches: &ArgMatches) -> Result<(), ConfigError> {
        if let Some(address) = matches.get_one::<String>("address") {
            self.settings.ip_address = address.clone();
        }
        if let Some(port) = matches.get_one::<String>("port") {
            self.settings.port = port
                .parse()
                .map_err(|_| ConfigError::Parse(format!("Invalid port: {}", port)))?;
        }
        if let Some(interval) = matches.get_one::<String>("interval") {
            self.settings.interval = interval
                .parse()
                .map_err(|_| ConfigError::Parse(format!("Invalid interval: {}", interval)))?;
        }
        Ok(())
    }

    /// Checks the timing settings, that every register fits its block, and
    /// that routine indices are unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.interval == 0 {
            return Err(ConfigError::Layout("Interval must be at least 1 ms".to_string()));
        }
        if self.settings.timeout == 0 {
            return Err(ConfigError::Layout("Timeout must be at least 1 ms".to_string()));
        }

        for (block_name, block) in &self.register_blocks {
            for register in &block.registers {
                let end = register.offset as usize + register.reg_type.width();
                if end > block.count as usize {
                    return Err(ConfigError::Layout(format!(
                        "register '{}' in block '{}' needs words {}..{} but the block holds {}",
                        register.name, block_name, register.offset, end, block.count
                    )));
                }
            }
            if block.start_address as u32 + block.count as u32 > u16::MAX as u32 + 1 {
                return Err(ConfigError::Layout(format!(
                    "block '{}' runs past the end of the address space",
                    block_name
                )));
            }
        }

        let mut seen = HashSet::new();
        for (name, routine) in &self.routines {
            if !seen.insert(routine.index) {
                return Err(ConfigError::Layout(format!(
                    "routine '{}' reuses device index {}",
                    name, routine.index
                )));
            }
            if routine.parameters.len() > ROUTINE_PARAMETER_SLOTS {
                warn!(
                    "⚠️  Routine '{}' declares {} parameters, only {} are sent",
                    name,
                    routine.parameters.len(),
                    ROUTINE_PARAMETER_SLOTS
                );
            }
        }
        Ok(())
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.settings.ip_address, self.settings.port)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.settings.interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.settings.timeout)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.settings.startup_delay)
    }

    pub fn routine_names(&self) -> Vec<String> {
        self.routines.keys().cloned().collect()
    }

    pub fn routine(&self, name: &str) -> Option<&Routine> {
        self.routines.get(name)
    }

    pub fn routine_index(&self, name: &str) -> Option<u16> {
        self.routines.get(name).map(|r| r.index)
    }

    /// Configured name for a device routine index, or `"unknown"`.
    pub fn routine_name(&self, index: u16) -> String {
        self.routines
            .iter()
            .find(|(_, r)| r.index == index)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Position of a device routine within `routine_names()`.
    pub fn routine_position(&self, index: u16) -> Option<usize> {
        self.routines.values().position(|r| r.index == index)
    }

    /// Configured defaults, padded with zeros to the device's parameter slots.
    pub fn default_parameters(&self, name: &str) -> Option<Vec<f32>> {
        self.routines.get(name).map(|routine| {
            let mut values: Vec<f32> = routine
                .parameters
                .iter()
                .take(ROUTINE_PARAMETER_SLOTS)
                .map(|p| p.default_value)
                .collect();
            values.resize(ROUTINE_PARAMETER_SLOTS, 0.0);
            values
        })
    }

    /// Text for a device result code, or `"Unknown(<code>)"`.
    pub fn error_string(&self, code: i32) -> String {
        self.error_codes
            .get(&code)
            .cloned()
            .unwrap_or_else(|| format!("Unknown({})", code))
    }

    /// Distinct register groups in first-seen order.
    pub fn register_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for block in self.register_blocks.values() {
            for register in &block.registers {
                if !groups.contains(&register.group) {
                    groups.push(register.group.clone());
                }
            }
        }
        groups
    }
}
