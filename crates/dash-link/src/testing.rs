//! In-memory stand-ins for serial devices and links.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::io::DuplexStream;

use crate::error::LinkError;
use crate::opener::Opener;
use crate::Link;

const PIPE_CAPACITY: usize = 4096;

/// Opener backed by `tokio::io::duplex`; the far end plays the device.
#[derive(Debug)]
pub struct MemoryOpener {
    available: AtomicBool,
    attempts: AtomicUsize,
    devices: Mutex<Vec<DuplexStream>>,
}

impl MemoryOpener {
    pub fn absent() -> Self {
        Self { available: AtomicBool::new(false), attempts: AtomicUsize::new(0), devices: Mutex::new(Vec::new()) }
    }

    pub fn present() -> Self {
        let o = Self::absent();
        o.plug();
        o
    }

    pub fn plug(&self) {
        self.available.store(true, Ordering::SeqCst);
    }

    /// Makes the device disappear; open ports see end of stream.
    pub fn unplug(&self) {
        self.available.store(false, Ordering::SeqCst);
        self.devices.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn open_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Far end of the most recently opened port.
    pub fn take_device(&self) -> Option<DuplexStream> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner).pop()
    }
}

impl Opener for MemoryOpener {
    type Port = DuplexStream;

    fn open(&self, dev: &str, _baud: u32) -> io::Result<DuplexStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("{dev}: no such device")));
        }
        let (near, far) = tokio::io::duplex(PIPE_CAPACITY);
        self.devices.lock().unwrap_or_else(PoisonError::into_inner).push(far);
        Ok(near)
    }
}

/// Link that replays canned lines and records everything sent.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    lines: Mutex<VecDeque<String>>,
    sent: Mutex<Vec<Vec<u8>>>,
    fail_sends: AtomicBool,
    absent: AtomicBool,
}

impl ScriptedLink {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: Mutex::new(lines.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn push_line(&self, line: impl Into<String>) {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).push_back(line.into());
    }

    /// Sent payloads as text, for line-protocol assertions.
    pub fn sent(&self) -> Vec<String> {
        self.sent_bytes().iter().map(|b| String::from_utf8_lossy(b).into_owned()).collect()
    }

    pub fn sent_bytes(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// While absent, sends succeed but nothing is recorded, like an unplugged port.
    pub fn set_absent(&self, absent: bool) {
        self.absent.store(absent, Ordering::SeqCst);
    }
}

impl Link for ScriptedLink {
    async fn send(&self, payload: &[u8]) -> Result<(), LinkError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(LinkError::Io {
                dev: "scripted".into(),
                source: io::Error::new(io::ErrorKind::BrokenPipe, "scripted failure"),
            });
        }
        if !self.absent.load(Ordering::SeqCst) {
            self.sent.lock().unwrap_or_else(PoisonError::into_inner).push(payload.to_vec());
        }
        Ok(())
    }

    async fn read_line(&self) -> Option<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }

    fn is_connected(&self) -> bool {
        !self.absent.load(Ordering::SeqCst)
    }
}
