use log::{debug, error, info};

use super::connector::ConnectorSnapshot;
use crate::output::{ConsoleFormatter, ConsoleSender, DataFormatter, DataSender};

/// Formats connector output once and fans it out to every sender.
pub struct Publisher {
    formatter: Box<dyn DataFormatter>,
    senders: Vec<Box<dyn DataSender>>,
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher {
    pub fn new() -> Self {
        Self {
            formatter: Box::new(ConsoleFormatter),
            senders: vec![Box::new(ConsoleSender)],
        }
    }

    pub fn set_formatter(&mut self, formatter: Box<dyn DataFormatter>) {
        debug!("🎨 Changed data formatter");
        self.formatter = formatter;
    }

    pub fn add_sender(&mut self, sender: Box<dyn DataSender>) {
        info!("📤 Added {} sender to {}", sender.sender_type(), sender.destination());
        self.senders.push(sender);
    }

    pub fn clear_senders(&mut self) {
        self.senders.clear();
    }

    pub fn formatter(&self) -> &dyn DataFormatter {
        self.formatter.as_ref()
    }

    /// Sends `data` to every sender. Individual failures are logged; the
    /// number of senders that succeeded is returned.
    pub async fn broadcast(&self, data: &str) -> usize {
        let mut success_count = 0;
        for sender in &self.senders {
            match sender.send(data).await {
                Ok(()) => success_count += 1,
                Err(e) => error!(
                    "❌ Failed to send data via {} to {}: {}",
                    sender.sender_type(),
                    sender.destination(),
                    e
                ),
            }
        }
        success_count
    }

    pub async fn publish_snapshot(&self, snapshot: &ConnectorSnapshot) -> usize {
        let output = format!(
            "{}{}",
            self.formatter.format_header(),
            self.formatter.format_snapshot(snapshot)
        );
        self.broadcast(&output).await
    }
}
