use async_trait::async_trait;
use log::{debug, error};
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::utils::error::ConnectorError;

#[async_trait]
pub trait DataSender: Send + Sync {
    async fn send(&self, data: &str) -> Result<(), ConnectorError>;
    fn sender_type(&self) -> &str;
    fn destination(&self) -> &str;
}

pub struct ConsoleSender;

#[async_trait]
impl DataSender for ConsoleSender {
    async fn send(&self, data: &str) -> Result<(), ConnectorError> {
        println!("{}", data);
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "console"
    }

    fn destination(&self) -> &str {
        "stdout"
    }
}

/// Writes each message as one line, either appended to the file or
/// replacing its previous content.
pub struct FileSender {
    file_path: String,
    append: bool,
}

impl FileSender {
    pub fn new<P: AsRef<Path>>(file_path: P, append: bool) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().to_string(),
            append,
        }
    }

    fn io_failure(&self, action: &str, e: std::io::Error) -> ConnectorError {
        error!("❌ Failed to {} {}: {}", action, self.file_path, e);
        ConnectorError::Output(format!("{} {}: {}", action, self.file_path, e))
    }
}

#[async_trait]
impl DataSender for FileSender {
    async fn send(&self, data: &str) -> Result<(), ConnectorError> {
        debug!(
            "📝 {} {} bytes to {}",
            if self.append { "Appending" } else { "Writing" },
            data.len(),
            self.file_path
        );

        let mut options = OpenOptions::new();
        options.create(true);
        if self.append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }

        let mut file = options
            .open(&self.file_path)
            .await
            .map_err(|e| self.io_failure("open", e))?;
        let line = format!("{}\n", data);
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.io_failure("write", e))?;
        file.flush().await.map_err(|e| self.io_failure("flush", e))?;
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "file"
    }

    fn destination(&self) -> &str {
        &self.file_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_sender_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.log");
        let sender = FileSender::new(&path, true);

        sender.send("first").await.unwrap();
        sender.send("second").await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
        assert_eq!(sender.sender_type(), "file");
    }

    #[tokio::test]
    async fn test_file_sender_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.json");
        let sender = FileSender::new(&path, false);

        sender.send("old").await.unwrap();
        sender.send("new").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[tokio::test]
    async fn test_file_sender_reports_missing_directory() {
        let sender = FileSender::new("/nonexistent/dir/out.log", true);
        assert!(matches!(sender.send("x").await, Err(ConnectorError::Output(_))));
    }
}
