use std::fmt::Display;
use std::io;
use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::LinkError;
use crate::lines::LineBuffer;
use crate::opener::{Opener, SerialOpener};
use crate::state::{LinkState, LinkStatus};
use crate::throttle::RetryThrottle;

const READ_CHUNK: usize = 256;

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Minimum gap between reconnect attempts.
    pub retry_interval: Duration,
    /// Upper bound on a single `read_line` while connected.
    pub read_timeout: Duration,
    /// Sleep after a failed reconnect inside `read_line`, so pollers don't spin.
    pub idle_backoff: Duration,
    /// Upper bound on a single write + flush.
    pub write_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(1),
            read_timeout: Duration::from_millis(500),
            idle_backoff: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
        }
    }
}

struct Reader<P> {
    half: Option<ReadHalf<P>>,
    lines: LineBuffer,
}

/// Line-oriented serial link that reopens its device after unplug/replug.
///
/// The device being absent is a normal state: `send` drops the payload and
/// `read_line` returns `None`. Reconnects happen lazily from either call and
/// are throttled to one attempt per `retry_interval`.
pub struct SerialLink<O: Opener = SerialOpener> {
    dev: String,
    baud: u32,
    cfg: LinkConfig,
    opener: O,
    // held for the whole reconnect attempt; serializes concurrent callers
    connect: Mutex<RetryThrottle>,
    reader: Mutex<Reader<O::Port>>,
    writer: Mutex<Option<WriteHalf<O::Port>>>,
    status: StdMutex<LinkStatus>,
}

impl SerialLink<SerialOpener> {
    pub fn serial(dev: &str, baud: u32, cfg: LinkConfig) -> Self {
        Self::with_opener(dev, baud, cfg, SerialOpener)
    }
}

impl<O: Opener> SerialLink<O> {
    pub fn with_opener(dev: &str, baud: u32, cfg: LinkConfig, opener: O) -> Self {
        Self {
            dev: dev.to_string(),
            baud,
            connect: Mutex::new(RetryThrottle::new(cfg.retry_interval)),
            cfg,
            opener,
            reader: Mutex::new(Reader { half: None, lines: LineBuffer::default() }),
            writer: Mutex::new(None),
            status: StdMutex::new(LinkStatus::new(dev, baud)),
        }
    }

    pub fn dev(&self) -> &str {
        &self.dev
    }

    pub fn status(&self) -> LinkStatus {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn state(&self) -> LinkState {
        self.status().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Opens the device now unless already connected. Throttled like any other attempt,
    /// successful or not, so a port that opens and dies at once is retried at
    /// most once per `retry_interval`.
    pub async fn connect(&self) -> Result<(), LinkError> {
        let mut throttle = self.connect.lock().await;
        if self.is_connected() { return Ok(()); }
        if !throttle.allow() {
            return Err(LinkError::Throttled { dev: self.dev.clone() });
        }

        match self.opener.open(&self.dev, self.baud) {
            Ok(port) => {
                let (rd, wr) = tokio::io::split(port);
                {
                    let mut reader = self.reader.lock().await;
                    reader.half = Some(rd);
                    reader.lines.clear();
                }
                *self.writer.lock().await = Some(wr);
                self.update_status(|st| {
                    st.state = LinkState::Connected;
                    st.connects += 1;
                    st.last_connected = Some(Instant::now());
                    st.last_error = None;
                });
                info!("serial: connected {} @ {}", self.dev, self.baud);
                Ok(())
            }
            Err(e) => {
                debug!("serial: {} not available: {}", self.dev, e);
                self.update_status(|st| st.last_error = Some(e.to_string()));
                Err(LinkError::Unavailable { dev: self.dev.clone(), source: e })
            }
        }
    }

    /// Writes `payload` followed by `\n`.
    ///
    /// Returns `Ok(())` without writing when the device is absent. A failed or
    /// timed-out write disconnects the link and is reported as [`LinkError::Io`].
    pub async fn send(&self, payload: &[u8]) -> Result<(), LinkError> {
        if !self.is_connected() {
            if let Err(e) = self.connect().await {
                trace!("serial: dropped {} bytes for {}: {}", payload.len(), self.dev, e);
                return Ok(());
            }
        }

        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.extend_from_slice(payload);
        frame.push(b'\n');

        let mut writer = self.writer.lock().await;
        let Some(wr) = writer.as_mut() else { return Ok(()); };

        let res = tokio::time::timeout(self.cfg.write_timeout, async {
            wr.write_all(&frame).await?;
            wr.flush().await
        })
        .await;

        let err = match res {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(_) => io::Error::new(io::ErrorKind::TimedOut, "write timed out"),
        };
        *writer = None;
        drop(writer);
        self.mark_disconnected(&err);
        Err(LinkError::Io { dev: self.dev.clone(), source: err })
    }

    /// Next complete line, or `None` when nothing arrived within the read timeout.
    ///
    /// While the device is absent this sleeps `idle_backoff` before returning,
    /// so callers can poll in a tight loop.
    pub async fn read_line(&self) -> Option<String> {
        if !self.is_connected() && self.connect().await.is_err() {
            tokio::time::sleep(self.cfg.idle_backoff).await;
            return None;
        }

        let deadline = Instant::now() + self.cfg.read_timeout;
        let mut reader = tokio::time::timeout_at(deadline, self.reader.lock()).await.ok()?;
        let Reader { half, lines } = &mut *reader;

        if let Some(line) = lines.next_line() {
            return Some(line);
        }
        let rd = half.as_mut()?;

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match tokio::time::timeout_at(deadline, rd.read(&mut chunk)).await {
                Err(_) => return None,
                Ok(Ok(0)) => {
                    *half = None;
                    lines.clear();
                    self.mark_disconnected("end of stream");
                    return None;
                }
                Ok(Ok(n)) => {
                    lines.extend(&chunk[..n]);
                    if let Some(line) = lines.next_line() {
                        return Some(line);
                    }
                }
                Ok(Err(e)) => {
                    *half = None;
                    lines.clear();
                    self.mark_disconnected(&e);
                    return None;
                }
            }
        }
    }

    /// Releases the device handle. A later `send`/`read_line` may reopen it.
    pub async fn close(&self) {
        let _throttle = self.connect.lock().await;
        {
            let mut reader = self.reader.lock().await;
            reader.half = None;
            reader.lines.clear();
        }
        *self.writer.lock().await = None;
        let was_connected = self.is_connected();
        self.update_status(|st| st.state = LinkState::Disconnected);
        if was_connected {
            info!("serial: closed {}", self.dev);
        }
    }

    fn mark_disconnected(&self, reason: impl Display) {
        let was_connected = self.is_connected();
        self.update_status(|st| {
            st.state = LinkState::Disconnected;
            st.last_error = Some(reason.to_string());
        });
        // the writer may be busy; a stale half fails on its next use anyway
        if let Ok(mut w) = self.writer.try_lock() {
            *w = None;
        }
        if was_connected {
            warn!("serial: lost {}: {}", self.dev, reason);
        }
    }

    fn update_status(&self, f: impl FnOnce(&mut LinkStatus)) {
        let mut st = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut st);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryOpener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn link(opener: &Arc<MemoryOpener>) -> SerialLink<Arc<MemoryOpener>> {
        SerialLink::with_opener("/dev/ttyTEST0", 115200, LinkConfig::default(), Arc::clone(opener))
    }

    #[tokio::test(start_paused = true)]
    async fn absent_device_is_opened_at_most_once_per_interval() {
        let opener = Arc::new(MemoryOpener::absent());
        let link = link(&opener);

        for _ in 0..100 {
            assert!(link.send(b"SET_GPS;SPEED;0").await.is_ok());
            tokio::time::advance(Duration::from_micros(900)).await;
        }
        assert_eq!(opener.open_attempts(), 1);
        assert_eq!(link.state(), LinkState::Disconnected);
        assert!(link.status().last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn read_while_absent_backs_off() {
        let opener = Arc::new(MemoryOpener::absent());
        let link = link(&opener);

        let start = Instant::now();
        assert_eq!(link.read_line().await, None);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(opener.open_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_times_out_without_error() {
        let opener = Arc::new(MemoryOpener::present());
        let link = link(&opener);
        link.connect().await.unwrap();
        let _device = opener.take_device().unwrap();

        let start = Instant::now();
        assert_eq!(link.read_line().await, None);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(500), "{waited:?}");
        assert!(waited < Duration::from_millis(600), "{waited:?}");
        assert!(link.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn partial_line_survives_timeout() {
        let opener = Arc::new(MemoryOpener::present());
        let link = link(&opener);
        link.connect().await.unwrap();
        let mut device = opener.take_device().unwrap();

        device.write_all(b"$GNGGA,12").await.unwrap();
        assert_eq!(link.read_line().await, None);

        device.write_all(b"3519.00*77\r\n").await.unwrap();
        assert_eq!(link.read_line().await.as_deref(), Some("$GNGGA,123519.00*77"));
    }

    #[tokio::test]
    async fn send_appends_newline() {
        let opener = Arc::new(MemoryOpener::present());
        let link = link(&opener);
        link.send(b"VOLUME;-20.0").await.unwrap();
        assert!(link.is_connected());

        let mut device = opener.take_device().unwrap();
        let mut buf = [0u8; 13];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"VOLUME;-20.0\n");
    }

    #[tokio::test]
    async fn write_failure_disconnects() {
        let opener = Arc::new(MemoryOpener::present());
        let link = link(&opener);
        link.connect().await.unwrap();
        drop(opener.take_device());

        let err = link.send(b"MUTE;ON").await.unwrap_err();
        assert!(matches!(err, LinkError::Io { .. }));
        assert!(!err.is_unavailable());
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn end_of_stream_disconnects() {
        let opener = Arc::new(MemoryOpener::present());
        let link = link(&opener);
        link.connect().await.unwrap();
        drop(opener.take_device());

        assert_eq!(link.read_line().await, None);
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn close_releases_handle() {
        let opener = Arc::new(MemoryOpener::present());
        let link = link(&opener);
        link.connect().await.unwrap();
        let mut device = opener.take_device().unwrap();

        link.close().await;
        assert_eq!(link.state(), LinkState::Disconnected);

        let mut buf = [0u8; 8];
        assert_eq!(device.read(&mut buf).await.unwrap(), 0);
    }

    /// Opens fine, then hits end of stream on the first read.
    struct DeadOnArrival(AtomicUsize);

    impl Opener for DeadOnArrival {
        type Port = DuplexStream;

        fn open(&self, _dev: &str, _baud: u32) -> io::Result<DuplexStream> {
            self.0.fetch_add(1, Ordering::SeqCst);
            let (near, _far) = tokio::io::duplex(64);
            Ok(near)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn port_that_dies_on_open_is_not_reopened_in_a_loop() {
        let opener = Arc::new(DeadOnArrival(AtomicUsize::new(0)));
        let link = SerialLink::with_opener("/dev/ttyUSB0", 115200, LinkConfig::default(), Arc::clone(&opener));

        let start = Instant::now();
        for _ in 0..50 {
            assert_eq!(link.read_line().await, None);
        }
        let elapsed = start.elapsed();
        let opens = opener.0.load(Ordering::SeqCst);
        assert!(elapsed >= Duration::from_secs(20), "{elapsed:?}");
        assert!(opens as u64 <= elapsed.as_secs() + 1, "{opens} opens in {elapsed:?}");
        assert_eq!(link.status().connects as usize, opens);
    }

    #[tokio::test(start_paused = true)]
    async fn sends_to_dead_port_keep_the_retry_interval() {
        let opener = Arc::new(DeadOnArrival(AtomicUsize::new(0)));
        let link = SerialLink::with_opener("/dev/ttyUSB0", 115200, LinkConfig::default(), Arc::clone(&opener));

        for _ in 0..100 {
            let _ = link.send(b"SET_GPS;SPEED;0").await;
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        let opens = opener.0.load(Ordering::SeqCst);
        assert!(opens <= 2, "{opens} opens in 1s");
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_replug() {
        let opener = Arc::new(MemoryOpener::present());
        let link = link(&opener);
        link.connect().await.unwrap();

        opener.unplug();
        assert_eq!(link.read_line().await, None);
        assert_eq!(link.state(), LinkState::Disconnected);

        // still absent: dropped silently
        link.send(b"SET_GPS;SPEED;12").await.unwrap();
        assert_eq!(link.state(), LinkState::Disconnected);

        opener.plug();
        tokio::time::advance(Duration::from_millis(1001)).await;
        link.send(b"SET_GPS;SPEED;12").await.unwrap();
        assert!(link.is_connected());
        assert_eq!(link.status().connects, 2);
    }
}
