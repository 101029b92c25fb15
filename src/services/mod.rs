pub mod connector;
pub mod publisher;

pub use connector::{Connector, ConnectorSnapshot, PollHandle, PollReport, PollStats};
pub use publisher::Publisher;
