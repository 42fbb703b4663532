use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

#[derive(Debug, Clone)]
pub struct LinkStatus {
    pub state: LinkState,
    pub dev: String,
    pub baud: u32,
    /// Successful opens since the link was created.
    pub connects: u32,
    pub last_connected: Option<Instant>,
    pub last_error: Option<String>,
}

impl LinkStatus {
    pub fn new(dev: &str, baud: u32) -> Self {
        Self {
            state: LinkState::Disconnected,
            dev: dev.to_string(),
            baud,
            connects: 0,
            last_connected: None,
            last_error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Time since the current session opened, if connected.
    pub fn uptime(&self) -> Option<Duration> {
        if !self.is_connected() { return None; }
        self.last_connected.map(|t| t.elapsed())
    }
}
