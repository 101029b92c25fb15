use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{RegisterBlockConfig, RegisterType};
use crate::modbus::codec;
use crate::utils::error::DecodeError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Register {
    pub name: String,
    pub group: String,
    pub offset: u16,
    pub reg_type: RegisterType,
    pub address: u16,
    pub value: String, // empty until the first successful read
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterBlock {
    pub name: String,
    pub start_address: u16,
    pub count: u16,
    pub registers: Vec<Register>,
    pub last_update: Option<DateTime<Utc>>,
}

impl RegisterBlock {
    pub fn from_config(name: &str, config: &RegisterBlockConfig) -> Self {
        let registers = config
            .registers
            .iter()
            .map(|r| Register {
                name: r.name.clone(),
                group: r.group.clone(),
                offset: r.offset,
                reg_type: r.reg_type,
                address: config.start_address.wrapping_add(r.offset),
                value: String::new(),
            })
            .collect();

        Self {
            name: name.to_string(),
            start_address: config.start_address,
            count: config.count,
            registers,
            last_update: None,
        }
    }

    /// Decodes every register from a freshly read block.
    ///
    /// Values are only committed when all registers decode; otherwise the
    /// previous values stay in place.
    pub fn update(&mut self, raw: &[u16]) -> Result<(), DecodeError> {
        let values = self
            .registers
            .iter()
            .map(|r| codec::decode(raw, r.offset as usize, r.reg_type))
            .collect::<Result<Vec<_>, _>>()?;

        for (register, value) in self.registers.iter_mut().zip(values) {
            register.value = value;
        }
        self.last_update = Some(Utc::now());
        Ok(())
    }

    pub fn register(&self, name: &str) -> Option<&Register> {
        self.registers.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegisterConfig;

    fn block_config() -> RegisterBlockConfig {
        RegisterBlockConfig {
            start_address: 100,
            count: 4,
            registers: vec![
                RegisterConfig {
                    name: "Temp".to_string(),
                    offset: 0,
                    group: "Sensors".to_string(),
                    reg_type: RegisterType::Int16,
                },
                RegisterConfig {
                    name: "Speed".to_string(),
                    offset: 2,
                    group: "Axis".to_string(),
                    reg_type: RegisterType::Float,
                },
            ],
        }
    }

    #[test]
    fn test_address_is_start_plus_offset() {
        let block = RegisterBlock::from_config("Status", &block_config());
        assert_eq!(block.register("Temp").unwrap().address, 100);
        assert_eq!(block.register("Speed").unwrap().address, 102);
        assert!(block.register("Temp").unwrap().value.is_empty());
    }

    #[test]
    fn test_update_decodes_all_registers() {
        let mut block = RegisterBlock::from_config("Status", &block_config());
        block.update(&[425, 0, 0x0000, 0x4020]).unwrap();
        assert_eq!(block.register("Temp").unwrap().value, "425");
        assert_eq!(block.register("Speed").unwrap().value, "2.5");
        assert!(block.last_update.is_some());
    }

    #[test]
    fn test_short_read_keeps_previous_values() {
        let mut block = RegisterBlock::from_config("Status", &block_config());
        block.update(&[1, 0, 0, 0]).unwrap();
        assert!(block.update(&[2, 0]).is_err());
        assert_eq!(block.register("Temp").unwrap().value, "1");
    }
}
