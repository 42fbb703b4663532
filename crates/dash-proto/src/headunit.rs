//! Text protocol spoken with the head-unit: one command per line.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Single-word commands sent by the head-unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadUnitEvent {
    Volume,
    VolumeUp,
    VolumeDown,
    Mute,
    FrontBassUp,
    FrontBassDown,
    FrontBassMute,
    RearBassUp,
    RearBassDown,
    RearBassReset,
    PowerOn,
    PowerOff,
    Unknown(String),
}

impl HeadUnitEvent {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "VOLUME" => Self::Volume,
            "VOLUME_UP" => Self::VolumeUp,
            "VOLUME_DOWN" => Self::VolumeDown,
            "MUTE" => Self::Mute,
            "FRONT_BASS_UP" => Self::FrontBassUp,
            "FRONT_BASS_DOWN" => Self::FrontBassDown,
            "FRONT_BASS_MUTE" => Self::FrontBassMute,
            "REAR_BASS_UP" => Self::RearBassUp,
            "REAR_BASS_DOWN" => Self::RearBassDown,
            "REAR_BASS_RESET" => Self::RearBassReset,
            "POWER_ON" => Self::PowerOn,
            "POWER_OFF" => Self::PowerOff,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Lines pushed to the head-unit display, `KEY;FIELD;VALUE` or `KEY;VALUE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DisplayUpdate {
    Volume(f64),
    Mute(bool),
    GpsSpeed(i64),
    GpsPosition { lat: f64, lon: f64 },
    GpsCourse(String),
    TrackTitle(String),
    TrackArtist(String),
    /// Milliseconds.
    TrackDuration(u64),
    /// Milliseconds.
    TrackElapsed(u64),
}

impl DisplayUpdate {
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DisplayUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volume(v) => write!(f, "VOLUME;{}", Decibels(*v)),
            Self::Mute(on) => write!(f, "MUTE;{}", if *on { "ON" } else { "OFF" }),
            Self::GpsSpeed(kmh) => write!(f, "SET_GPS;SPEED;{}", kmh),
            Self::GpsPosition { lat, lon } => write!(f, "SET_GPS;POSITION;{},{}", lat, lon),
            Self::GpsCourse(label) => write!(f, "SET_GPS;COURSE;{}", clean(label)),
            Self::TrackTitle(s) => write!(f, "SET_TRACK;TITLE;{}", clean(s)),
            Self::TrackArtist(s) => write!(f, "SET_TRACK;ARTIST;{}", clean(s)),
            Self::TrackDuration(ms) => write!(f, "SET_TRACK;DURATION;{}", ms),
            Self::TrackElapsed(ms) => write!(f, "SET_TRACK;ELAPSED;{}", ms),
        }
    }
}

/// Shortest exact form, always with a fractional part: `-30.0`, `-30.25`.
struct Decibels(f64);

impl fmt::Display for Decibels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_finite() && self.0.fract() == 0.0 {
            write!(f, "{:.1}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

// The head-unit splits on ';' and reads up to '\n'.
fn clean(s: &str) -> String {
    s.chars()
        .map(|c| if c == ';' || c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_events() {
        assert_eq!(HeadUnitEvent::parse("VOLUME_UP\r"), HeadUnitEvent::VolumeUp);
        assert_eq!(HeadUnitEvent::parse("  REAR_BASS_RESET "), HeadUnitEvent::RearBassReset);
        assert_eq!(HeadUnitEvent::parse("POWER_OFF"), HeadUnitEvent::PowerOff);
        assert_eq!(HeadUnitEvent::parse("volume_up"), HeadUnitEvent::Unknown("volume_up".into()));
    }

    #[test]
    fn renders_display_lines() {
        assert_eq!(DisplayUpdate::Volume(-20.0).to_line(), "VOLUME;-20.0");
        assert_eq!(DisplayUpdate::Volume(-30.25).to_line(), "VOLUME;-30.25");
        assert_eq!(DisplayUpdate::Volume(-0.5).to_line(), "VOLUME;-0.5");
        assert_eq!(DisplayUpdate::Mute(true).to_line(), "MUTE;ON");
        assert_eq!(DisplayUpdate::GpsSpeed(41).to_line(), "SET_GPS;SPEED;41");
        assert_eq!(
            DisplayUpdate::GpsPosition { lat: 48.1173, lon: -11.516667 }.to_line(),
            "SET_GPS;POSITION;48.1173,-11.516667"
        );
        assert_eq!(DisplayUpdate::GpsCourse("ENE".into()).to_line(), "SET_GPS;COURSE;ENE");
        assert_eq!(DisplayUpdate::TrackElapsed(61_000).to_line(), "SET_TRACK;ELAPSED;61000");
    }

    #[test]
    fn free_text_cannot_break_framing() {
        let line = DisplayUpdate::TrackTitle("Rock; Roll\nPart 2".into()).to_line();
        assert_eq!(line, "SET_TRACK;TITLE;Rock  Roll Part 2");
    }
}
