pub mod formatters;
pub mod senders;

pub use formatters::{formatter_for, ConsoleFormatter, CsvFormatter, DataFormatter, JsonFormatter};
pub use senders::{ConsoleSender, DataSender, FileSender};
