use std::fmt;

/// Fixed control register map shared with the device firmware.
pub const REQUEST_COUNT_ADDR: u16 = 30000;
pub const ACTIVE_ROUTINE_ADDR: u16 = 30002;
pub const INT_CONTROL_START: u16 = 30000;
pub const FLOAT_CONTROL_START: u16 = 31000;
pub const CONTROL_WINDOW_LEN: u16 = 100;

/// Written to the request counter to abort whatever routine is running.
pub const CANCEL_SENTINEL: u16 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum ModbusRequest {
    ReadInputRegisters {
        start: u16,
        count: u16,
    },
    WriteMultipleRegisters {
        start: u16,
        values: Vec<u16>,
    },
}

impl ModbusRequest {
    pub fn start(&self) -> u16 {
        match self {
            ModbusRequest::ReadInputRegisters { start, .. } => *start,
            ModbusRequest::WriteMultipleRegisters { start, .. } => *start,
        }
    }
}

impl fmt::Display for ModbusRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModbusRequest::ReadInputRegisters { start, count } => {
                write!(f, "read {} input registers @{}", count, start)
            }
            ModbusRequest::WriteMultipleRegisters { start, values } => {
                write!(f, "write {} registers @{}", values.len(), start)
            }
        }
    }
}
