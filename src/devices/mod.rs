pub mod control;
pub mod register_block;

pub use control::{ControlState, HistoryEntry, HISTORY_SLOTS};
pub use register_block::{Register, RegisterBlock};
