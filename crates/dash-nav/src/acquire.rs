use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use dash_link::{Link, Shutdown};
use dash_proto::DisplayUpdate;

use crate::gnss::{FixParser, FixResult};

/// Where accepted fixes go (timestamp, position and speed come from the fix).
pub trait PositionSink: Send + Sync {
    fn record_position(&self, fix: &FixResult) -> impl Future<Output = anyhow::Result<()>> + Send;
}

#[derive(Debug, Clone)]
pub struct AcquireConfig {
    pub cycle: Duration,
    /// Lines read per cycle before giving up on a fix.
    pub max_lines_per_cycle: usize,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self { cycle: Duration::from_millis(200), max_lines_per_cycle: 64 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquireStats {
    pub cycles: u64,
    pub fixes: u64,
    pub recorded: u64,
    pub send_errors: u64,
    pub sink_errors: u64,
}

/// Receiver lines in, display updates and recorded positions out.
pub struct Acquisition {
    cfg: AcquireConfig,
    parser: FixParser,
    last_speed: Option<i64>,
    stats: AcquireStats,
}

impl Acquisition {
    pub fn new(cfg: AcquireConfig) -> Self {
        Self { cfg, parser: FixParser::new(), last_speed: None, stats: AcquireStats::default() }
    }

    pub fn stats(&self) -> &AcquireStats {
        &self.stats
    }

    /// Runs until `shutdown` fires.
    pub async fn run<R, D, S>(&mut self, receiver: &R, display: &D, sink: &S, mut shutdown: Shutdown) -> AcquireStats
    where
        R: Link,
        D: Link,
        S: PositionSink,
    {
        info!("acquire: started (cycle {:?})", self.cfg.cycle);
        while !shutdown.is_triggered() {
            self.stats.cycles += 1;
            let fix = tokio::select! {
                _ = shutdown.triggered() => break,
                fix = self.poll(receiver) => fix,
            };
            if let Some(fix) = fix {
                self.publish(&fix, display, sink).await;
            }
            if shutdown.sleep(self.cfg.cycle).await {
                break;
            }
        }
        info!("acquire: stopped after {} fixes ({} recorded)", self.stats.fixes, self.stats.recorded);
        self.stats.clone()
    }

    /// Drains receiver lines until one completes a fix.
    async fn poll<R: Link>(&mut self, receiver: &R) -> Option<FixResult> {
        for _ in 0..self.cfg.max_lines_per_cycle {
            let line = receiver.read_line().await?;
            if let Some(fix) = self.parser.feed(&line) {
                return Some(fix);
            }
        }
        None
    }

    async fn publish<D: Link, S: PositionSink>(&mut self, fix: &FixResult, display: &D, sink: &S) {
        self.stats.fixes += 1;
        debug!("acquire: fix {},{} {} km/h {}", fix.lat, fix.lon, fix.speed, fix.course);

        let updates = [
            DisplayUpdate::GpsSpeed(fix.speed),
            DisplayUpdate::GpsPosition { lat: fix.lat, lon: fix.lon },
            DisplayUpdate::GpsCourse(fix.course.to_string()),
        ];
        for u in &updates {
            if let Err(e) = display.send(u.to_line().as_bytes()).await {
                self.stats.send_errors += 1;
                warn!("acquire: display update failed: {}", e);
            }
        }

        if !self.should_record(fix.speed) {
            return;
        }
        match sink.record_position(fix).await {
            Ok(()) => self.stats.recorded += 1,
            Err(e) => {
                self.stats.sink_errors += 1;
                warn!("acquire: record_position failed: {:#}", e);
            }
        }
    }

    /// Standing still is recorded once, not every cycle.
    fn should_record(&mut self, speed: i64) -> bool {
        let parked = self.last_speed == Some(0) && speed == 0;
        self.last_speed = Some(speed);
        !parked
    }
}
