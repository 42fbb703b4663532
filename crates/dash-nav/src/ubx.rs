//! UBX binary frames for receiver configuration.
//!
//! Wire layout: `B5 62 | class | id | len (u16 LE) | payload | ck_a ck_b`, with the
//! Fletcher checksum taken over class, id, length and payload.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use dash_link::Link;

pub const SYNC_1: u8 = 0xB5;
pub const SYNC_2: u8 = 0x62;
const HEADER_LEN: usize = 6;
const CHECKSUM_LEN: usize = 2;

pub const CLASS_CFG: u8 = 0x06;
pub const CLASS_MON: u8 = 0x0A;

pub const CFG_RATE: u8 = 0x08;
pub const CFG_CFG: u8 = 0x09;
pub const CFG_SBAS: u8 = 0x16;
pub const CFG_NAV5: u8 = 0x24;
pub const CFG_GNSS: u8 = 0x3E;
pub const MON_VER: u8 = 0x04;

const NAV5_LEN: usize = 36;
const NAV5_MASK_DYN: u16 = 0x0001;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short ({0} bytes)")]
    Truncated(usize),
    #[error("bad sync bytes {0:#04x} {1:#04x}")]
    BadSync(u8, u8),
    #[error("length field says {declared} payload bytes, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("checksum mismatch: expected {expected:04x}, computed {computed:04x}")]
    Checksum { expected: u16, computed: u16 },
}

/// Running two-accumulator checksum, seeded at zero per frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct Checksum {
    ck_a: u8,
    ck_b: u8,
}

impl Checksum {
    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.ck_a = self.ck_a.wrapping_add(b);
            self.ck_b = self.ck_b.wrapping_add(self.ck_a);
        }
    }

    pub fn result(self) -> (u8, u8) {
        (self.ck_a, self.ck_b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub class: u8,
    pub id: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(class: u8, id: u8, payload: Vec<u8>) -> Self {
        Self { class, id, payload }
    }

    /// Encodes the frame. Payloads never exceed u16 here; all builders are fixed-size.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.payload.len() as u16;
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len() + CHECKSUM_LEN);
        out.extend_from_slice(&[SYNC_1, SYNC_2, self.class, self.id]);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&self.payload);

        let mut ck = Checksum::default();
        ck.update(&out[2..]);
        let (a, b) = ck.result();
        out.push(a);
        out.push(b);
        out
    }

    /// Decodes exactly one frame; trailing bytes are an error.
    pub fn parse(bytes: &[u8]) -> Result<Frame, FrameError> {
        if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(FrameError::Truncated(bytes.len()));
        }
        if bytes[0] != SYNC_1 || bytes[1] != SYNC_2 {
            return Err(FrameError::BadSync(bytes[0], bytes[1]));
        }
        let declared = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
        let actual = bytes.len() - HEADER_LEN - CHECKSUM_LEN;
        if declared != actual {
            return Err(FrameError::LengthMismatch { declared, actual });
        }

        let body_end = HEADER_LEN + declared;
        let mut ck = Checksum::default();
        ck.update(&bytes[2..body_end]);
        let (a, b) = ck.result();
        let (ra, rb) = (bytes[body_end], bytes[body_end + 1]);
        if (a, b) != (ra, rb) {
            return Err(FrameError::Checksum {
                expected: u16::from_le_bytes([ra, rb]),
                computed: u16::from_le_bytes([a, b]),
            });
        }

        Ok(Frame::new(bytes[2], bytes[3], bytes[HEADER_LEN..body_end].to_vec()))
    }
}

/// Navigation dynamics model (`dynModel` in CFG-NAV5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicsProfile {
    Portable,
    Stationary,
    Pedestrian,
    #[default]
    Automotive,
    Sea,
    #[serde(rename = "airborne1g")]
    Airborne1g,
}

impl DynamicsProfile {
    pub fn code(self) -> u8 {
        match self {
            DynamicsProfile::Portable => 0,
            DynamicsProfile::Stationary => 2,
            DynamicsProfile::Pedestrian => 3,
            DynamicsProfile::Automotive => 4,
            DynamicsProfile::Sea => 5,
            DynamicsProfile::Airborne1g => 6,
        }
    }
}

pub fn rate_period_ms(hz: u32) -> u16 {
    let hz = hz.max(1);
    ((1000.0 / hz as f64).round() as u32).min(u16::MAX as u32) as u16
}

pub fn cfg_rate(hz: u32) -> Frame {
    let mut p = Vec::with_capacity(6);
    p.extend_from_slice(&rate_period_ms(hz).to_le_bytes());
    p.extend_from_slice(&1u16.to_le_bytes()); // navRate
    p.extend_from_slice(&0u16.to_le_bytes()); // timeRef: UTC
    Frame::new(CLASS_CFG, CFG_RATE, p)
}

pub fn cfg_nav5(profile: DynamicsProfile) -> Frame {
    let mut p = vec![0u8; NAV5_LEN];
    p[..2].copy_from_slice(&NAV5_MASK_DYN.to_le_bytes());
    p[2] = profile.code();
    Frame::new(CLASS_CFG, CFG_NAV5, p)
}

/// GPS, Galileo, GLONASS, SBAS, in the order the firmware lists them.
pub fn cfg_gnss() -> Frame {
    let mut p = Vec::with_capacity(16);
    for gnss_id in [0u8, 2, 6, 1] {
        p.extend_from_slice(&[gnss_id, 1, 0, 0]);
    }
    Frame::new(CLASS_CFG, CFG_GNSS, p)
}

pub fn cfg_sbas() -> Frame {
    Frame::new(CLASS_CFG, CFG_SBAS, vec![1, 1, 0, 12, 0, 0, 0, 3, 0, 0, 0, 0])
}

/// Save the current configuration to non-volatile storage.
pub fn cfg_save() -> Frame {
    let mut p = Vec::with_capacity(12);
    p.extend_from_slice(&0u32.to_le_bytes()); // clearMask
    p.extend_from_slice(&u32::MAX.to_le_bytes()); // saveMask
    p.extend_from_slice(&0u32.to_le_bytes()); // loadMask
    Frame::new(CLASS_CFG, CFG_CFG, p)
}

pub fn mon_ver_poll() -> Frame {
    Frame::new(CLASS_MON, MON_VER, Vec::new())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverSettings {
    pub rate_hz: u32,
    pub dynamics: DynamicsProfile,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self { rate_hz: 5, dynamics: DynamicsProfile::Automotive }
    }
}

/// Pushes the startup configuration through any link. Responses are not read.
pub struct ReceiverConfigurator<'a, L: Link> {
    link: &'a L,
    settings: ReceiverSettings,
}

impl<'a, L: Link> ReceiverConfigurator<'a, L> {
    pub fn new(link: &'a L, settings: ReceiverSettings) -> Self {
        Self { link, settings }
    }

    pub async fn set_update_rate(&self) -> bool {
        self.push("CFG-RATE", cfg_rate(self.settings.rate_hz)).await
    }

    pub async fn set_dynamics_profile(&self) -> bool {
        self.push("CFG-NAV5", cfg_nav5(self.settings.dynamics)).await
    }

    pub async fn set_constellations(&self) -> bool {
        self.push("CFG-GNSS", cfg_gnss()).await
    }

    pub async fn enable_sbas(&self) -> bool {
        self.push("CFG-SBAS", cfg_sbas()).await
    }

    pub async fn persist_configuration(&self) -> bool {
        self.push("CFG-CFG", cfg_save()).await
    }

    /// Sends all five frames in order; returns how many reached the device.
    /// Frames dropped because the receiver is absent do not count.
    pub async fn apply(&self) -> usize {
        let mut ok = 0;
        ok += self.set_update_rate().await as usize;
        ok += self.set_dynamics_profile().await as usize;
        ok += self.set_constellations().await as usize;
        ok += self.enable_sbas().await as usize;
        ok += self.persist_configuration().await as usize;
        if ok == 5 {
            info!("receiver config pushed ({} Hz, {:?})", self.settings.rate_hz, self.settings.dynamics);
        } else {
            warn!("receiver config incomplete: {}/5 frames written", ok);
        }
        ok
    }

    async fn push(&self, name: &str, frame: Frame) -> bool {
        match self.link.send(&frame.to_bytes()).await {
            Ok(()) if self.link.is_connected() => {
                debug!("sent {} ({} byte payload)", name, frame.payload.len());
                true
            }
            Ok(()) => {
                debug!("{} dropped, receiver not connected", name);
                false
            }
            Err(e) => {
                warn!("{} not sent: {}", name, e);
                false
            }
        }
    }
}
