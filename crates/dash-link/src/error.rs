use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    /// Device absent or refused to open. Recoverable: the next attempt is throttled.
    #[error("serial device {dev} unavailable: {source}")]
    Unavailable {
        dev: String,
        #[source]
        source: io::Error,
    },

    /// A reconnect attempt was already made within the retry interval.
    #[error("serial device {dev}: reconnect throttled")]
    Throttled { dev: String },

    /// Read or write failed mid-session; the link is now disconnected.
    #[error("serial i/o on {dev}: {source}")]
    Io {
        dev: String,
        #[source]
        source: io::Error,
    },
}

impl LinkError {
    /// True for the "device not there" family, as opposed to a failure on an open link.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LinkError::Unavailable { .. } | LinkError::Throttled { .. })
    }
}
