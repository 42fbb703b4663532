pub mod doctor;
pub mod error;
pub mod opener;
pub mod serial;
pub mod shutdown;
pub mod state;
pub mod throttle;
mod lines;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use std::future::Future;

pub use error::LinkError;
pub use opener::{Opener, SerialOpener};
pub use serial::{LinkConfig, SerialLink};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
pub use state::{LinkState, LinkStatus};

/// What the rest of the system needs from a device link.
///
/// `send` is best-effort: implementations drop payloads while the device is
/// absent. `read_line` returns `None` when nothing arrived in time.
pub trait Link: Send + Sync {
    fn send(&self, payload: &[u8]) -> impl Future<Output = Result<(), LinkError>> + Send;

    fn read_line(&self) -> impl Future<Output = Option<String>> + Send;

    /// False while the device is absent. Checked after `send` to tell a
    /// written payload from a dropped one.
    fn is_connected(&self) -> bool {
        true
    }
}

impl<O: Opener> Link for SerialLink<O> {
    async fn send(&self, payload: &[u8]) -> Result<(), LinkError> {
        SerialLink::send(self, payload).await
    }

    async fn read_line(&self) -> Option<String> {
        SerialLink::read_line(self).await
    }

    fn is_connected(&self) -> bool {
        SerialLink::is_connected(self)
    }
}
