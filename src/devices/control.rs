use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{Configuration, ControlProfile, ROUTINE_PARAMETER_SLOTS};
use crate::modbus::codec;
use crate::utils::error::DecodeError;

pub const HISTORY_SLOTS: usize = 3;

// Word offsets inside the integer control window (30000..30100).
const REQUEST_COUNT: usize = 0;
const RESPONSE_COUNT: usize = 1;
const ACTIVE_ROUTINE: usize = 2;
const HISTORY_RUN_COUNT: usize = 10;
const HISTORY_ROUTINE: usize = 20;
const HISTORY_RESULT: usize = 30;

// Word offsets inside the float control window (31000..31100).
const PARAMETERS: usize = 0;
const HISTORY_ELAPSED: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub run_count: u16,
    pub routine_name: String,
    pub result: String,
    pub elapsed_ms: f32,
}

/// Session state derived from the control windows on every poll tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlState {
    pub request_count: u16,
    pub response_count: u16,
    pub active_routine: u16,
    pub routine_parameters: [f32; ROUTINE_PARAMETER_SLOTS],
    pub history: [HistoryEntry; HISTORY_SLOTS],
    pub updated_at: Option<DateTime<Utc>>,
}

impl ControlState {
    /// A routine is outstanding while the device has not caught up with the
    /// last request.
    pub fn busy(&self) -> bool {
        self.request_count != self.response_count
    }
}

impl ControlProfile {
    pub fn decode(
        &self,
        int_regs: &[u16],
        float_regs: &[u16],
        config: &Configuration,
    ) -> Result<ControlState, DecodeError> {
        match self {
            ControlProfile::Standard => decode_standard(int_regs, float_regs, config),
        }
    }
}

fn decode_standard(
    int_regs: &[u16],
    float_regs: &[u16],
    config: &Configuration,
) -> Result<ControlState, DecodeError> {
    let mut state = ControlState {
        request_count: codec::get_u16(int_regs, REQUEST_COUNT)?,
        response_count: codec::get_u16(int_regs, RESPONSE_COUNT)?,
        active_routine: codec::get_u16(int_regs, ACTIVE_ROUTINE)?,
        updated_at: Some(Utc::now()),
        ..ControlState::default()
    };

    for (i, parameter) in state.routine_parameters.iter_mut().enumerate() {
        *parameter = codec::get_float(float_regs, PARAMETERS + i * 2)?;
    }

    for (i, entry) in state.history.iter_mut().enumerate() {
        entry.run_count = codec::get_u16(int_regs, HISTORY_RUN_COUNT + i)?;
        entry.routine_name = config.routine_name(codec::get_u16(int_regs, HISTORY_ROUTINE + i)?);
        entry.result = config.error_string(codec::get_u16(int_regs, HISTORY_RESULT + i)? as i32);
        entry.elapsed_ms = codec::get_float(float_regs, HISTORY_ELAPSED + i * 2)?;
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Configuration {
        Configuration::from_json_str(
            r#"{
                "Routine": { "Home": { "Index": 1 }, "Move": { "Index": 2 } },
                "ErrorCode": { "0": "OK", "5": "Following error" }
            }"#,
        )
        .unwrap()
    }

    fn windows() -> (Vec<u16>, Vec<u16>) {
        let mut ints = vec![0u16; 100];
        let mut floats = vec![0u16; 100];
        ints[0] = 6;
        ints[1] = 5;
        ints[2] = 2;
        ints[10..13].copy_from_slice(&[5, 4, 3]);
        ints[20..23].copy_from_slice(&[2, 1, 9]);
        ints[30..33].copy_from_slice(&[0, 5, 7]);
        for (i, p) in [1.5f32, 2.5, -1.0, 0.0].iter().enumerate() {
            floats[i * 2..i * 2 + 2].copy_from_slice(&codec::encode_float(*p));
        }
        for (i, t) in [120.5f32, 80.0, 3.25].iter().enumerate() {
            floats[20 + i * 2..22 + i * 2].copy_from_slice(&codec::encode_float(*t));
        }
        (ints, floats)
    }

    #[test]
    fn test_standard_profile_decodes_counters_and_parameters() {
        let (ints, floats) = windows();
        let state = ControlProfile::Standard.decode(&ints, &floats, &config()).unwrap();
        assert_eq!(state.request_count, 6);
        assert_eq!(state.response_count, 5);
        assert_eq!(state.active_routine, 2);
        assert_eq!(state.routine_parameters, [1.5, 2.5, -1.0, 0.0]);
        assert!(state.busy());
    }

    #[test]
    fn test_standard_profile_resolves_history() {
        let (ints, floats) = windows();
        let state = ControlProfile::Standard.decode(&ints, &floats, &config()).unwrap();

        assert_eq!(state.history[0].run_count, 5);
        assert_eq!(state.history[0].routine_name, "Move");
        assert_eq!(state.history[0].result, "OK");
        assert_eq!(state.history[0].elapsed_ms, 120.5);

        assert_eq!(state.history[1].routine_name, "Home");
        assert_eq!(state.history[1].result, "Following error");

        assert_eq!(state.history[2].routine_name, "unknown");
        assert_eq!(state.history[2].result, "Unknown(7)");
        assert_eq!(state.history[2].elapsed_ms, 3.25);
    }

    #[test]
    fn test_idle_when_counters_match() {
        let (mut ints, floats) = windows();
        ints[1] = 6;
        let state = ControlProfile::Standard.decode(&ints, &floats, &config()).unwrap();
        assert!(!state.busy());
    }

    #[test]
    fn test_truncated_window_is_rejected() {
        let (ints, floats) = windows();
        assert!(ControlProfile::Standard.decode(&ints[..20], &floats, &config()).is_err());
    }
}
