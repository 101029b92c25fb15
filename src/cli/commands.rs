use anyhow::{anyhow, bail, Context};
use clap::ArgMatches;
use log::{info, warn};
use std::time::Duration;

use crate::output::{formatter_for, FileSender};
use crate::services::{Connector, Publisher};

/// Configures output from the global flags and runs the selected subcommand.
/// Returns `false` when no known subcommand was given.
pub async fn handle_subcommands(
    matches: &ArgMatches,
    connector: &Connector,
    publisher: &mut Publisher,
) -> anyhow::Result<bool> {
    if let Some(format) = matches.get_one::<String>("format") {
        let formatter = formatter_for(format).ok_or_else(|| anyhow!("Unknown output format: {}", format))?;
        info!("🎨 Using {} formatter", format);
        publisher.set_formatter(formatter);
    }

    if let Some(output_file) = matches.get_one::<String>("output-file") {
        let append = !matches.get_flag("overwrite");
        info!(
            "📝 Adding file output: {} ({})",
            output_file,
            if append { "append" } else { "overwrite" }
        );
        publisher.add_sender(Box::new(FileSender::new(output_file, append)));
    }

    match matches.subcommand() {
        Some(("monitor", _)) => monitor(connector, publisher).await?,
        Some(("status", _)) => {
            let report = connector.poll_once().await;
            if !report.is_clean() {
                warn!(
                    "⚠️  {} block(s) failed, control updated: {}",
                    report.blocks_failed,
                    report.control_updated
                );
            }
            publisher.publish_snapshot(&connector.snapshot().await).await;
        }
        Some(("routines", _)) => {
            let output = publisher.formatter().format_routines(&connector.config().routines);
            publisher.broadcast(&output).await;
        }
        Some(("groups", _)) => {
            publisher.broadcast(&connector.register_groups().join("\n")).await;
        }
        Some(("registers", sub)) => {
            connector.poll_once().await;
            let groups = match sub.get_one::<String>("group") {
                Some(group) => vec![group.clone()],
                None => connector.register_groups(),
            };
            for group in groups {
                let registers = connector.registers(&group).await;
                if registers.is_empty() {
                    println!("❌ No registers in group: {}", group);
                    println!("💡 Available groups: {}", connector.register_groups().join(", "));
                    continue;
                }
                let output = publisher.formatter().format_registers(&group, &registers);
                publisher.broadcast(&output).await;
            }
        }
        Some(("run", sub)) => run_routine(sub, connector, publisher).await?,
        Some(("cancel", _)) => {
            connector.cancel_routine().await?;
            println!("✅ Cancel request sent to {}", connector.connector_address());
        }
        Some(("error", sub)) => {
            let code: i32 = required(sub, "code")?
                .parse()
                .context("Result code must be an integer")?;
            println!("{}: {}", code, connector.error_string(code));
        }
        Some(("raw", sub)) => {
            let start: u16 = required(sub, "start")?.parse().context("Invalid start address")?;
            let count: u16 = required(sub, "count")?.parse().context("Invalid register count")?;
            let raw = connector.read_raw(start, count).await?;
            let output = publisher.formatter().format_raw(start, &raw);
            publisher.broadcast(&output).await;
        }
        _ => return Ok(false),
    }

    Ok(true)
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> anyhow::Result<&'a String> {
    matches
        .get_one::<String>(id)
        .ok_or_else(|| anyhow!("Missing argument: {}", id))
}

async fn monitor(connector: &Connector, publisher: &Publisher) -> anyhow::Result<()> {
    let interval = connector.config().interval();
    println!("🔄 Monitoring {}", connector.connector_address());
    println!("   ⏱️  Update interval: {:?}", interval);
    println!("   🛑 Press Ctrl+C to stop\n");

    let handle = connector.start();
    sleep_until_first_tick(connector).await;

    let mut interval_timer = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n🛑 Stopping monitor...");
                break;
            }
            _ = interval_timer.tick() => {
                publisher.publish_snapshot(&connector.snapshot().await).await;
            }
        }
    }

    handle.stop().await;

    let stats = connector.stats().await;
    println!("📊 Final Statistics:");
    println!("   🔁 Ticks: {}", stats.ticks);
    println!("   ❌ Block failures: {}", stats.block_failures);
    println!("   ❌ Control failures: {}", stats.control_failures);
    Ok(())
}

async fn sleep_until_first_tick(connector: &Connector) {
    let delay = connector.config().startup_delay();
    tokio::select! {
        _ = tokio::time::sleep(delay + Duration::from_millis(50)) => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

async fn run_routine(matches: &ArgMatches, connector: &Connector, publisher: &Publisher) -> anyhow::Result<()> {
    let name = required(matches, "routine")?;
    let parameters = matches
        .get_many::<String>("parameters")
        .map(|values| {
            values
                .map(|v| v.parse::<f32>().with_context(|| format!("Invalid parameter: {}", v)))
                .collect::<anyhow::Result<Vec<f32>>>()
        })
        .transpose()?
        .unwrap_or_default();

    let report = connector.poll_once().await;
    if !report.control_updated {
        bail!("Could not read the control registers of {}", connector.connector_address());
    }
    if connector.busy().await && !matches.get_flag("force") {
        bail!("A routine is still outstanding; use --force to invoke anyway or `cancel` it first");
    }

    let index = connector.invoke_by_name(name, &parameters).await?;
    println!("▶️  Routine {} (index {}) requested", name, index);

    if !matches.get_flag("wait") {
        return Ok(());
    }

    let limit = connector
        .routine(name)
        .map(|r| Duration::from_millis(r.timeout))
        .unwrap_or_default();

    let finished = tokio::select! {
        finished = connector.poll_until_idle(limit) => finished,
        _ = tokio::signal::ctrl_c() => false,
    };

    if !finished {
        bail!("Routine {} did not finish within {:?}", name, limit);
    }

    let control = connector.control().await;
    let last = &control.history[0];
    println!(
        "✅ {} finished: {} in {:.1} ms (run #{})",
        last.routine_name, last.result, last.elapsed_ms, last.run_count
    );
    publisher.publish_snapshot(&connector.snapshot().await).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::build_cli;
    use crate::config::Configuration;
    use crate::modbus::{MockModbusClient, ModbusClientTrait};
    use std::sync::Arc;

    fn connector(mock: Arc<MockModbusClient>) -> Connector {
        let config = Configuration::from_json_str(
            r#"{
                "Settings": { "StartupDelay": 0, "Interval": 10 },
                "Routine": { "Move": { "Index": 2, "Timeout": 500,
                    "Parameters": [ { "Name": "x", "Value": 1.0 } ] } }
            }"#,
        )
        .unwrap();
        Connector::with_client(config, mock as Arc<dyn ModbusClientTrait>).unwrap()
    }

    fn quiet_publisher() -> Publisher {
        let mut publisher = Publisher::new();
        publisher.clear_senders();
        publisher
    }

    #[tokio::test]
    async fn test_run_refuses_while_busy() {
        let mock = Arc::new(MockModbusClient::new());
        mock.set_registers(30000, &[4, 3]);
        let connector = connector(mock.clone());

        let matches = build_cli()
            .try_get_matches_from(["motion-connector", "run", "Move"])
            .unwrap();
        let result = handle_subcommands(&matches, &connector, &mut quiet_publisher()).await;

        assert!(result.is_err());
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn test_run_invokes_idle_device() {
        let mock = Arc::new(MockModbusClient::new());
        mock.set_registers(30000, &[3, 3]);
        let connector = connector(mock.clone());

        let matches = build_cli()
            .try_get_matches_from(["motion-connector", "run", "Move", "2.5"])
            .unwrap();
        assert!(handle_subcommands(&matches, &connector, &mut quiet_publisher()).await.unwrap());

        let writes = mock.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[1], (30002, vec![2]));
        assert_eq!(writes[2], (30000, vec![4]));
    }

    #[tokio::test]
    async fn test_cancel_writes_sentinel() {
        let mock = Arc::new(MockModbusClient::new());
        let connector = connector(mock.clone());

        let matches = build_cli()
            .try_get_matches_from(["motion-connector", "cancel"])
            .unwrap();
        assert!(handle_subcommands(&matches, &connector, &mut quiet_publisher()).await.unwrap());
        assert_eq!(mock.writes(), vec![(30000, vec![100])]);
    }

    #[tokio::test]
    async fn test_run_wait_with_default_startup_delay() {
        let mock = Arc::new(MockModbusClient::new());
        mock.set_registers(30000, &[3, 3]);
        let config = Configuration::from_json_str(
            r#"{
                "Settings": { "Interval": 100 },
                "Routine": { "Move": { "Index": 2, "Timeout": 500 } }
            }"#,
        )
        .unwrap();
        let connector = Connector::with_client(config, mock.clone() as Arc<dyn ModbusClientTrait>).unwrap();

        let device = mock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            device.set_registers(30001, &[4]);
        });

        let matches = build_cli()
            .try_get_matches_from(["motion-connector", "run", "Move", "--wait"])
            .unwrap();
        let started = std::time::Instant::now();
        assert!(handle_subcommands(&matches, &connector, &mut quiet_publisher()).await.unwrap());
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!connector.busy().await);
    }

    #[tokio::test]
    async fn test_zero_interval_config_never_reaches_monitor() {
        let config = Configuration::from_json_str(r#"{ "Settings": { "Interval": 0, "StartupDelay": 0 } }"#).unwrap();
        let result = Connector::with_client(config, Arc::new(MockModbusClient::new()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_overwrite_flag_keeps_only_latest_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routines.txt");
        let path_arg = path.to_string_lossy().to_string();
        let connector = connector(Arc::new(MockModbusClient::new()));

        for _ in 0..2 {
            let matches = build_cli()
                .try_get_matches_from(["motion-connector", "routines", "--overwrite", "--output-file", &path_arg])
                .unwrap();
            assert!(handle_subcommands(&matches, &connector, &mut quiet_publisher()).await.unwrap());
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("Routines:").count(), 1);

        let matches = build_cli()
            .try_get_matches_from(["motion-connector", "routines", "--output-file", &path_arg])
            .unwrap();
        assert!(handle_subcommands(&matches, &connector, &mut quiet_publisher()).await.unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("Routines:").count(), 2);
    }

    #[tokio::test]
    async fn test_raw_rejects_bad_start() {
        let connector = connector(Arc::new(MockModbusClient::new()));
        let matches = build_cli()
            .try_get_matches_from(["motion-connector", "raw", "abc", "4"])
            .unwrap();
        assert!(handle_subcommands(&matches, &connector, &mut quiet_publisher()).await.is_err());
    }
}
