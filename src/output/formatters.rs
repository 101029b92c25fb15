use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;

use crate::config::Routine;
use crate::devices::Register;
use crate::modbus::codec;
use crate::services::ConnectorSnapshot;

pub trait DataFormatter: Send + Sync {
    fn format_snapshot(&self, snapshot: &ConnectorSnapshot) -> String;
    fn format_registers(&self, group: &str, registers: &[Register]) -> String;
    fn format_routines(&self, routines: &BTreeMap<String, Routine>) -> String;
    fn format_raw(&self, start: u16, raw: &[u16]) -> String;
    fn format_header(&self) -> String;
}

pub fn formatter_for(name: &str) -> Option<Box<dyn DataFormatter>> {
    match name {
        "console" => Some(Box::new(ConsoleFormatter)),
        "json" => Some(Box::new(JsonFormatter)),
        "csv" => Some(Box::new(CsvFormatter)),
        _ => None,
    }
}

pub struct ConsoleFormatter;

impl DataFormatter for ConsoleFormatter {
    fn format_snapshot(&self, snapshot: &ConnectorSnapshot) -> String {
        let control = &snapshot.control;
        let mut output = format!(
            "📡 {} | {} | request {} / response {} | routine {}\n",
            snapshot.target,
            if snapshot.busy { "BUSY" } else { "idle" },
            control.request_count,
            control.response_count,
            control.active_routine
        );
        output.push_str(&format!("⚙️  Parameters: {:?}\n", control.routine_parameters));

        output.push_str("🕘 History:\n");
        for entry in &control.history {
            output.push_str(&format!(
                "  #{:<5} {:<20} {:<24} {:>10.1} ms\n",
                entry.run_count, entry.routine_name, entry.result, entry.elapsed_ms
            ));
        }

        for block in &snapshot.blocks {
            output.push_str(&format!("🔹 {} @{} x{}\n", block.name, block.start_address, block.count));
            for register in &block.registers {
                output.push_str(&format!(
                    "  {:<20} {:>6} {:<8} {}\n",
                    register.name, register.address, register.group, register.value
                ));
            }
        }

        let stats = &snapshot.stats;
        output.push_str(&format!(
            "📈 Ticks: {} | block failures: {} | control failures: {} | last success: {}\n",
            stats.ticks,
            stats.block_failures,
            stats.control_failures,
            stats
                .last_success
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string())
        ));
        if let Some(error) = &stats.last_error {
            output.push_str(&format!("❌ Last error: {}\n", error));
        }
        output
    }

    fn format_registers(&self, group: &str, registers: &[Register]) -> String {
        let mut output = format!("📊 Group: {}\n", group);
        for register in registers {
            output.push_str(&format!(
                "  {:<20} {:>6} {:?}: {}\n",
                register.name, register.address, register.reg_type, register.value
            ));
        }
        output
    }

    fn format_routines(&self, routines: &BTreeMap<String, Routine>) -> String {
        let mut output = String::from("🧭 Routines:\n");
        for (name, routine) in routines {
            output.push_str(&format!(
                "  [{}] {} (timeout {} ms)\n",
                routine.index, name, routine.timeout
            ));
            for parameter in &routine.parameters {
                output.push_str(&format!("      {} = {}\n", parameter.name, parameter.default_value));
            }
        }
        output
    }

    fn format_raw(&self, start: u16, raw: &[u16]) -> String {
        let mut output = format!("🔍 {} registers from {}:\n", raw.len(), start);
        for (i, chunk) in raw.chunks(8).enumerate() {
            output.push_str(&format!(
                "  {:>5}: {}\n",
                start as usize + i * 8,
                hex::encode_upper(codec::words_to_bytes(chunk))
            ));
        }
        output
    }

    fn format_header(&self) -> String {
        format!("🚀 Motion Connector - {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

pub struct JsonFormatter;

impl DataFormatter for JsonFormatter {
    fn format_snapshot(&self, snapshot: &ConnectorSnapshot) -> String {
        serde_json::to_string_pretty(snapshot).unwrap_or_default()
    }

    fn format_registers(&self, group: &str, registers: &[Register]) -> String {
        let result = json!({
            "group": group,
            "timestamp": Utc::now().timestamp(),
            "registers": registers,
        });
        serde_json::to_string_pretty(&result).unwrap_or_default()
    }

    fn format_routines(&self, routines: &BTreeMap<String, Routine>) -> String {
        serde_json::to_string_pretty(routines).unwrap_or_default()
    }

    fn format_raw(&self, start: u16, raw: &[u16]) -> String {
        let result = json!({
            "start": start,
            "count": raw.len(),
            "registers": raw,
            "hex": hex::encode(codec::words_to_bytes(raw)),
        });
        serde_json::to_string_pretty(&result).unwrap_or_default()
    }

    fn format_header(&self) -> String {
        String::new() // JSON doesn't need headers
    }
}

pub struct CsvFormatter;

impl DataFormatter for CsvFormatter {
    fn format_snapshot(&self, snapshot: &ConnectorSnapshot) -> String {
        let timestamp = snapshot.timestamp.to_rfc3339();
        let mut csv = String::new();
        for block in &snapshot.blocks {
            for register in &block.registers {
                csv.push_str(&format!(
                    "{},{},{},{},{},{}\n",
                    block.name, register.group, register.name, register.address, register.value, timestamp
                ));
            }
        }
        csv
    }

    fn format_registers(&self, group: &str, registers: &[Register]) -> String {
        let timestamp = Utc::now().to_rfc3339();
        registers
            .iter()
            .map(|r| format!("{},{},{},{},{}\n", group, r.name, r.address, r.value, timestamp))
            .collect()
    }

    fn format_routines(&self, routines: &BTreeMap<String, Routine>) -> String {
        let mut csv = String::from("Routine,Index,Timeout,Parameters\n");
        for (name, routine) in routines {
            let parameters: Vec<String> = routine
                .parameters
                .iter()
                .map(|p| format!("{}={}", p.name, p.default_value))
                .collect();
            csv.push_str(&format!("{},{},{},{}\n", name, routine.index, routine.timeout, parameters.join(";")));
        }
        csv
    }

    fn format_raw(&self, start: u16, raw: &[u16]) -> String {
        raw.iter()
            .enumerate()
            .map(|(i, w)| format!("{},{},{:04X}\n", start as usize + i, w, w))
            .collect()
    }

    fn format_header(&self) -> String {
        "Block,Group,Register,Address,Value,Timestamp\n".to_string()
    }
}
