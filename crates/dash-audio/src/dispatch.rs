use anyhow::Result;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use dash_proto::{DisplayUpdate, HeadUnitEvent};

use crate::dsp::DspControl;

const MAIN_MIN_DB: f64 = -100.0;
const FRONT_BASS: usize = 1;
const FRONT_BASS_MIN_DB: f64 = -50.0;
const REAR_BASS_GAIN: &str = "/filters/Rear Bass/parameters/gain";
const REAR_BASS_LIMIT_DB: f64 = 24.0;

/// Applies head-unit button events to the DSP and the power flag.
pub struct Dispatcher<D: DspControl> {
    dsp: Arc<D>,
    power: Arc<AtomicBool>,
}

impl<D: DspControl> Dispatcher<D> {
    pub fn new(dsp: Arc<D>, power: Arc<AtomicBool>) -> Self {
        Self { dsp, power }
    }

    pub fn dsp(&self) -> &D {
        &self.dsp
    }

    pub fn powered(&self) -> bool {
        self.power.load(Ordering::SeqCst)
    }

    /// Returns the line to show on the head-unit, if the event has one.
    pub async fn handle(&self, event: &HeadUnitEvent) -> Result<Option<DisplayUpdate>> {
        use HeadUnitEvent::*;
        match event {
            Volume => Ok(Some(DisplayUpdate::Volume(self.dsp.main_volume()?))),
            VolumeUp => self.step_main(1.0),
            VolumeDown => self.step_main(-1.0),
            Mute => {
                let muted = !self.dsp.main_mute()?;
                self.dsp.set_main_mute(muted)?;
                Ok(Some(DisplayUpdate::Mute(muted)))
            }
            FrontBassUp => self.step_front_bass(1.0),
            FrontBassDown => self.step_front_bass(-1.0),
            FrontBassMute => {
                let muted = !self.dsp.channel_mute(FRONT_BASS)?;
                self.dsp.set_channel_mute(FRONT_BASS, muted)?;
                Ok(None)
            }
            RearBassUp => self.edit_rear_bass(|g| (g + 1.0).floor()).await,
            RearBassDown => self.edit_rear_bass(|g| (g - 1.0).floor()).await,
            RearBassReset => self.edit_rear_bass(|_| 0.0).await,
            PowerOn | PowerOff => {
                let on = matches!(event, PowerOn);
                if self.power.swap(on, Ordering::SeqCst) != on {
                    info!("power {}", if on { "on" } else { "off" });
                }
                Ok(None)
            }
            Unknown(raw) => {
                warn!("unknown head-unit event {:?}", raw);
                Ok(None)
            }
        }
    }

    fn step_main(&self, delta: f64) -> Result<Option<DisplayUpdate>> {
        let v = (self.dsp.main_volume()? + delta).floor().clamp(MAIN_MIN_DB, 0.0);
        self.dsp.set_main_volume(v)?;
        Ok(Some(DisplayUpdate::Volume(self.dsp.main_volume()?)))
    }

    fn step_front_bass(&self, delta: f64) -> Result<Option<DisplayUpdate>> {
        let v = (self.dsp.channel_volume(FRONT_BASS)? + delta).floor().clamp(FRONT_BASS_MIN_DB, 0.0);
        self.dsp.set_channel_volume(FRONT_BASS, v)?;
        Ok(None)
    }

    async fn edit_rear_bass(&self, f: impl FnOnce(f64) -> f64) -> Result<Option<DisplayUpdate>> {
        let mut cfg = self.dsp.active_config()?;
        let Some(gain) = cfg.pointer_mut(REAR_BASS_GAIN) else {
            debug!("no rear bass filter in active config");
            return Ok(None);
        };
        let Some(current) = gain.as_f64() else {
            debug!("rear bass gain is not a number: {}", gain);
            return Ok(None);
        };
        *gain = Value::from(f(current).clamp(-REAR_BASS_LIMIT_DB, REAR_BASS_LIMIT_DB));
        self.dsp.set_active_config(cfg).await?;
        Ok(None)
    }
}
