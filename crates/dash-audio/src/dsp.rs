use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::info;

pub const MAIN: usize = 0;
const FADERS: usize = 5;
const DEFAULT_VOLUME_DB: f64 = -30.0;

/// Volume and filter control of the audio processor. Fader 0 is main,
/// 1..=4 are the auxiliary channels.
pub trait DspControl: Send + Sync {
    fn main_volume(&self) -> Result<f64> {
        self.channel_volume(MAIN)
    }

    fn set_main_volume(&self, db: f64) -> Result<()> {
        self.set_channel_volume(MAIN, db)
    }

    fn main_mute(&self) -> Result<bool> {
        self.channel_mute(MAIN)
    }

    fn set_main_mute(&self, mute: bool) -> Result<()> {
        self.set_channel_mute(MAIN, mute)
    }

    fn channel_volume(&self, ch: usize) -> Result<f64>;
    fn set_channel_volume(&self, ch: usize, db: f64) -> Result<()>;
    fn channel_mute(&self, ch: usize) -> Result<bool>;
    fn set_channel_mute(&self, ch: usize, mute: bool) -> Result<()>;

    fn active_config(&self) -> Result<Value>;
    /// Replaces the filter configuration. Persisting it may touch the disk.
    fn set_active_config(&self, cfg: Value) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, Copy)]
struct Fader {
    volume: f64,
    mute: bool,
}

/// Faders kept in memory; the filter configuration is persisted as JSON.
#[derive(Debug)]
pub struct FileDsp {
    faders: Mutex<[Fader; FADERS]>,
    config: Mutex<Value>,
    config_file: Option<PathBuf>,
}

impl FileDsp {
    pub fn in_memory(config: Value) -> Self {
        Self {
            faders: Mutex::new([Fader { volume: DEFAULT_VOLUME_DB, mute: false }; FADERS]),
            config: Mutex::new(config),
            config_file: None,
        }
    }

    /// Loads the config file if it exists; it is (re)written on every change.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = if path.exists() {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?
        } else {
            info!("dsp: {} not found, starting with an empty config", path.display());
            Value::Object(Default::default())
        };
        let mut dsp = Self::in_memory(config);
        dsp.config_file = Some(path);
        Ok(dsp)
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    fn with_fader<T>(&self, ch: usize, f: impl FnOnce(&mut Fader) -> T) -> Result<T> {
        if ch >= FADERS {
            bail!("no fader {}", ch);
        }
        let mut faders = self.faders.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut faders[ch]))
    }
}

impl DspControl for FileDsp {
    fn channel_volume(&self, ch: usize) -> Result<f64> {
        self.with_fader(ch, |f| f.volume)
    }

    fn set_channel_volume(&self, ch: usize, db: f64) -> Result<()> {
        self.with_fader(ch, |f| f.volume = db)
    }

    fn channel_mute(&self, ch: usize) -> Result<bool> {
        self.with_fader(ch, |f| f.mute)
    }

    fn set_channel_mute(&self, ch: usize, mute: bool) -> Result<()> {
        self.with_fader(ch, |f| f.mute = mute)
    }

    fn active_config(&self) -> Result<Value> {
        Ok(self.config.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn set_active_config(&self, cfg: Value) -> Result<()> {
        if let Some(path) = &self.config_file {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir).await.with_context(|| format!("create {}", dir.display()))?;
            }
            let raw = serde_json::to_string_pretty(&cfg)?;
            tokio::fs::write(path, raw).await.with_context(|| format!("write {}", path.display()))?;
        }
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = cfg;
        Ok(())
    }
}
