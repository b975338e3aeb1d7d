use std::time::Duration;

#[derive(Debug, Clone)]
pub enum RconEvent {
    /// The connection dropped after an initially successful connect.
    Disconnect { reason: String },
    /// A reconnect attempt succeeded after `downtime` offline.
    Reconnect { downtime: Duration },
}
