use anyhow::{Context, Result};
use std::time::Duration;

use dash_link::LinkConfig;
use dash_nav::{AcquireConfig, DynamicsProfile, ReceiverSettings};

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub headunit: HeadUnitCfg,
    pub receiver: ReceiverCfg,
    pub link: LinkCfg,
    pub acquire: AcquireCfg,
    pub storage: StorageCfg,
    pub dsp: DspCfg,
    pub media: MediaCfg,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
pub struct HeadUnitCfg {
    pub device: String,
    pub baud: u32,
}

impl Default for HeadUnitCfg {
    fn default() -> Self {
        Self { device: "/dev/ttyUSB0".into(), baud: 115200 }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
pub struct ReceiverCfg {
    pub device: String,
    pub baud: u32,
    pub rate_hz: u32,
    pub dynamics: DynamicsProfile,
}

impl Default for ReceiverCfg {
    fn default() -> Self {
        Self { device: "/dev/ttyACM0".into(), baud: 9600, rate_hz: 5, dynamics: DynamicsProfile::Automotive }
    }
}

impl ReceiverCfg {
    pub fn settings(&self) -> ReceiverSettings {
        ReceiverSettings { rate_hz: self.rate_hz, dynamics: self.dynamics }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
pub struct LinkCfg {
    pub retry_interval_ms: u64,
    pub read_timeout_ms: u64,
    pub idle_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self { retry_interval_ms: 1000, read_timeout_ms: 500, idle_ms: 1000, write_timeout_ms: 1000 }
    }
}

impl LinkCfg {
    pub fn to_config(&self) -> LinkConfig {
        LinkConfig {
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            idle_backoff: Duration::from_millis(self.idle_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
pub struct AcquireCfg {
    pub cycle_ms: u64,
}

impl Default for AcquireCfg {
    fn default() -> Self {
        Self { cycle_ms: 200 }
    }
}

impl AcquireCfg {
    pub fn to_config(&self) -> AcquireConfig {
        AcquireConfig { cycle: Duration::from_millis(self.cycle_ms), ..AcquireConfig::default() }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
pub struct StorageCfg {
    pub path: String,
}

impl Default for StorageCfg {
    fn default() -> Self {
        Self { path: "/var/lib/dashlink/positions.jsonl".into() }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct DspCfg {
    pub config_file: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
pub struct MediaCfg {
    pub now_playing_file: Option<String>,
    pub poll_ms: u64,
}

impl Default for MediaCfg {
    fn default() -> Self {
        Self { now_playing_file: None, poll_ms: 1000 }
    }
}

pub fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    parse_config(&s)
}

pub fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config toml")
}
