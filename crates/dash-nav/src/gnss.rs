use anyhow::{Context, Result};
use serde::Serialize;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::trace;

const KNOTS_TO_KMH: f64 = 1.852;

const COMPASS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW", "NNW",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub enum FixType {
    #[default]
    NoFix = 1,
    Fix2d = 2,
    Fix3d = 3,
}

impl FixType {
    fn from_gsa(v: &str) -> Option<Self> {
        match v {
            "1" => Some(FixType::NoFix),
            "2" => Some(FixType::Fix2d),
            "3" => Some(FixType::Fix3d),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixResult {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
    pub speed_kmh: f64,
    /// `speed_kmh` truncated, as shown on the display.
    pub speed: i64,
    pub course: &'static str,
    pub course_deg: f64,
    pub sats: u8,
    pub hdop: f32,
    pub fix_type: FixType,
}

/// Everything learned so far, overwritten field by field as sentences arrive.
#[derive(Debug, Clone)]
struct RawFix {
    lat: Option<f64>,
    lon: Option<f64>,
    alt_m: f64,
    speed_kn: f64,
    course_deg: f64,
    time: Option<Time>,
    date: Option<Date>,
    fix_type: FixType,
    sats: u8,
    hdop: f32,
}

impl Default for RawFix {
    fn default() -> Self {
        Self {
            lat: None,
            lon: None,
            alt_m: 0.0,
            speed_kn: 0.0,
            course_deg: 0.0,
            time: None,
            date: None,
            fix_type: FixType::NoFix,
            sats: 0,
            hdop: 99.9,
        }
    }
}

#[derive(Debug, Default)]
pub struct FixParser {
    raw: RawFix,
}

impl FixParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fix_type(&self) -> FixType {
        self.raw.fix_type
    }

    /// Feeds one NMEA sentence. Returns a fix after a valid RMC while the
    /// receiver reports at least a 2D fix.
    pub fn feed(&mut self, line: &str) -> Option<FixResult> {
        // binary UBX replies can share a line with the next sentence
        let line = line.find('$').map_or("", |i| line[i..].trim());
        let Some(body) = sentence_body(line) else {
            trace!("nmea: ignored {:?}", line);
            return None;
        };

        let f: Vec<&str> = body.split(',').collect();
        let kind = f[0];
        if kind.len() < 5 || !kind.is_ascii() {
            trace!("nmea: ignored {:?}", line);
            return None;
        }

        match &kind[kind.len() - 3..] {
            "GGA" => self.gga(&f),
            "GSA" => self.gsa(&f),
            "VTG" => self.vtg(&f),
            "GLL" => self.gll(&f),
            "RMC" => return self.rmc(&f),
            _ => trace!("nmea: unhandled {}", kind),
        }
        None
    }

    fn gga(&mut self, f: &[&str]) {
        if f.len() < 10 {
            return;
        }
        self.set_time(f[1]);
        self.set_position(f[2], f[3], f[4], f[5]);
        if f[6] == "0" {
            self.raw.fix_type = FixType::NoFix;
        }
        if let Ok(sats) = f[7].parse() {
            self.raw.sats = sats;
        }
        if let Ok(hdop) = f[8].parse() {
            self.raw.hdop = hdop;
        }
        if let Ok(alt) = f[9].parse() {
            self.raw.alt_m = alt;
        }
    }

    fn gsa(&mut self, f: &[&str]) {
        if f.len() < 17 {
            return;
        }
        if let Some(t) = FixType::from_gsa(f[2]) {
            self.raw.fix_type = t;
        }
        if let Ok(hdop) = f[16].parse() {
            self.raw.hdop = hdop;
        }
    }

    fn vtg(&mut self, f: &[&str]) {
        if f.len() < 6 {
            return;
        }
        if let Ok(c) = f[1].parse() {
            self.raw.course_deg = c;
        }
        if let Ok(kn) = f[5].parse() {
            self.raw.speed_kn = kn;
        }
    }

    fn gll(&mut self, f: &[&str]) {
        if f.len() < 7 || f[6] != "A" {
            return;
        }
        self.set_position(f[1], f[2], f[3], f[4]);
        self.set_time(f[5]);
    }

    fn rmc(&mut self, f: &[&str]) -> Option<FixResult> {
        if f.len() < 10 {
            return None;
        }
        self.set_time(f[1]);
        if let Some(d) = parse_date(f[9]) {
            self.raw.date = Some(d);
        }
        if f[2] != "A" {
            return None;
        }
        self.set_position(f[3], f[4], f[5], f[6]);
        if let Ok(kn) = f[7].parse() {
            self.raw.speed_kn = kn;
        }
        // empty course when stationary: keep the last heading
        if let Ok(c) = f[8].parse() {
            self.raw.course_deg = c;
        }

        if self.raw.fix_type < FixType::Fix2d {
            return None;
        }
        self.snapshot()
    }

    fn set_time(&mut self, v: &str) {
        if let Some(t) = parse_time(v) {
            self.raw.time = Some(t);
        }
    }

    fn set_position(&mut self, lat: &str, ns: &str, lon: &str, ew: &str) {
        if let (Some(lat), Some(lon)) = (parse_deg_min(lat, ns), parse_deg_min(lon, ew)) {
            self.raw.lat = Some(lat);
            self.raw.lon = Some(lon);
        }
    }

    fn snapshot(&self) -> Option<FixResult> {
        let r = &self.raw;
        let timestamp = PrimitiveDateTime::new(r.date?, r.time?).assume_utc();
        let speed_kmh = r.speed_kn * KNOTS_TO_KMH;
        Some(FixResult {
            timestamp,
            lat: round6(r.lat?),
            lon: round6(r.lon?),
            alt_m: r.alt_m,
            speed_kmh,
            speed: speed_kmh.trunc() as i64,
            course: compass_direction(r.course_deg),
            course_deg: r.course_deg,
            sats: r.sats,
            hdop: r.hdop,
            fix_type: r.fix_type,
        })
    }
}

/// 16-point rose; each label covers 22.5 degrees centred on it.
pub fn compass_direction(deg: f64) -> &'static str {
    let d = deg.rem_euclid(360.0);
    let idx = ((d + 11.25) / 22.5).floor() as usize % COMPASS.len();
    COMPASS[idx]
}

/// Strips `$` and a valid `*hh` suffix. A bad checksum rejects the sentence.
fn sentence_body(line: &str) -> Option<&str> {
    let s = line.strip_prefix('$')?;
    match s.split_once('*') {
        None => Some(s),
        Some((body, hh)) => {
            let want = u8::from_str_radix(hh.get(..2)?, 16).ok()?;
            let got = body.bytes().fold(0u8, |acc, b| acc ^ b);
            if got == want {
                Some(body)
            } else {
                trace!("nmea: checksum {:02X} != {:02X}", got, want);
                None
            }
        }
    }
}

fn parse_deg_min(v: &str, hemi: &str) -> Option<f64> {
    if v.is_empty() || !v.is_ascii() {
        return None;
    }
    // lat: ddmm.mmmm, lon: dddmm.mmmm
    let dot = v.find('.').unwrap_or(v.len());
    if dot < 3 {
        return None;
    }
    let deg_len = dot - 2;
    let deg: f64 = v[..deg_len].parse().ok()?;
    let min: f64 = v[deg_len..].parse().ok()?;
    let out = deg + (min / 60.0);
    match hemi {
        "N" | "E" => Some(out),
        "S" | "W" => Some(-out),
        _ => None,
    }
}

// hhmmss[.sss]
fn parse_time(v: &str) -> Option<Time> {
    if v.len() < 6 || !v.is_ascii() {
        return None;
    }
    let h: u8 = v[0..2].parse().ok()?;
    let m: u8 = v[2..4].parse().ok()?;
    let secs: f64 = v[4..].parse().ok()?;
    let s = secs.trunc() as u8;
    let ms = ((secs.fract() * 1000.0).round() as u16).min(999);
    Time::from_hms_milli(h, m, s, ms).ok()
}

// ddmmyy, years taken as 20yy
fn parse_date(v: &str) -> Option<Date> {
    if v.len() != 6 || !v.is_ascii() {
        return None;
    }
    let d: u8 = v[0..2].parse().ok()?;
    let m: u8 = v[2..4].parse().ok()?;
    let y: i32 = v[4..6].parse().ok()?;
    Date::from_calendar_date(2000 + y, Month::try_from(m).ok()?, d).ok()
}

fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}

/// Replays a captured NMEA log through a fresh parser.
pub struct NmeaReplay {
    reader: BufReader<File>,
    parser: FixParser,
}

impl NmeaReplay {
    pub async fn open(path: &str) -> Result<Self> {
        let f = File::open(path).await.with_context(|| format!("open nmea file {}", path))?;
        Ok(Self { reader: BufReader::new(f), parser: FixParser::new() })
    }

    /// Next fix in the file, or `None` at end of file.
    pub async fn next_fix(&mut self) -> Result<Option<FixResult>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await.context("read nmea file")?;
            if n == 0 {
                return Ok(None);
            }
            if let Some(fix) = self.parser.feed(&line) {
                return Ok(Some(fix));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const GGA: &str = "$GNGGA,123519.00,4807.03800,N,01131.00000,E,1,08,0.9,545.4,M,46.9,M,,*77";
    const GSA_3D: &str = "$GNGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*27";
    const GSA_NONE: &str = "$GNGSA,A,1,,,,,,,,,,,,,99.99,99.99,99.99*2E";
    const RMC: &str = "$GNRMC,123519.00,A,4807.03800,N,01131.00000,E,22.4,84.4,230324,,,A*47";

    fn locked() -> FixParser {
        let mut p = FixParser::new();
        assert!(p.feed(GGA).is_none());
        assert!(p.feed(GSA_3D).is_none());
        p
    }

    #[test]
    fn full_fix_after_rmc() {
        let mut p = locked();
        let fix = p.feed(RMC).unwrap();
        assert_eq!(fix.timestamp, datetime!(2024-03-23 12:35:19 UTC));
        assert_eq!(fix.lat, 48.1173);
        assert_eq!(fix.lon, 11.516667);
        assert_eq!(fix.alt_m, 545.4);
        assert!((fix.speed_kmh - 41.4848).abs() < 1e-9);
        assert_eq!(fix.speed, 41);
        assert_eq!(fix.course, "E");
        assert_eq!(fix.sats, 8);
        assert_eq!(fix.hdop, 1.3);
        assert_eq!(fix.fix_type, FixType::Fix3d);
    }

    #[test]
    fn no_fix_until_gsa_reports_one() {
        let mut p = FixParser::new();
        p.feed(GGA);
        assert!(p.feed(RMC).is_none());
        p.feed(GSA_NONE);
        assert!(p.feed(RMC).is_none());
        p.feed(GSA_3D);
        assert!(p.feed(RMC).is_some());
    }

    #[test]
    fn void_rmc_and_lost_gga_gate_output() {
        let mut p = locked();
        assert!(p.feed("$GNRMC,123521.00,V,,,,,,,230324,,,N*61").is_none());
        p.feed("$GNGGA,123519.00,,,,,0,00,99.99,,,,,,*75");
        assert_eq!(p.fix_type(), FixType::NoFix);
        assert!(p.feed(RMC).is_none());
    }

    #[test]
    fn empty_course_keeps_previous_heading() {
        let mut p = locked();
        p.feed(RMC).unwrap();
        let fix = p.feed("$GNRMC,123520.00,A,4807.03800,N,01131.00000,E,0.0,,230324,,,A*6F").unwrap();
        assert_eq!(fix.speed, 0);
        assert_eq!(fix.course_deg, 84.4);
        assert_eq!(fix.course, "E");
    }

    #[test]
    fn southern_western_and_fractional_seconds() {
        let mut p = locked();
        let fix = p
            .feed("$GNRMC,235959.50,A,3352.12800,S,15112.56000,W,10.0,359.0,311224,,,A*7B")
            .unwrap();
        assert_eq!(fix.lat, -33.8688);
        assert_eq!(fix.lon, -151.209333);
        assert_eq!(fix.speed, 18);
        assert_eq!(fix.course, "N");
        assert_eq!(fix.timestamp, datetime!(2024-12-31 23:59:59.5 UTC));
    }

    #[test]
    fn vtg_and_gll_feed_the_accumulator() {
        let mut p = locked();
        assert!(p.feed("$GNVTG,84.4,T,,M,22.4,N,41.5,K,A*2F").is_none());
        assert!(p.feed("$GPGLL,4916.45,N,12311.12,W,225444,A*31").is_none());
        assert_eq!(round6(p.raw.lat.unwrap()), 49.274167);
        assert_eq!(round6(p.raw.lon.unwrap()), -123.185333);
        assert_eq!(p.raw.course_deg, 84.4);
        assert_eq!(p.raw.time, Time::from_hms(22, 54, 44).ok());
    }

    #[test]
    fn bad_checksum_and_junk_are_ignored() {
        let mut p = locked();
        assert!(p.feed(&RMC.replace("*47", "*48")).is_none());
        assert!(p.feed("").is_none());
        assert!(p.feed("garbage").is_none());
        assert!(p.feed("$GN").is_none());
        assert!(p.feed("$GNRMC,12").is_none());
        assert!(p.feed("$GNÅÅRMC,x").is_none());
        // still intact afterwards
        assert!(p.feed(RMC).is_some());
    }

    #[test]
    fn resyncs_after_binary_bytes() {
        let mut p = locked();
        let line = format!("\u{fffd}b\u{5}\u{1}\u{2}{RMC}");
        assert!(p.feed(&line).is_some());
    }

    #[test]
    fn sentence_without_checksum_is_accepted() {
        let mut p = locked();
        let bare = RMC.split('*').next().unwrap();
        assert!(p.feed(bare).is_some());
    }

    #[test]
    fn compass_sectors() {
        assert_eq!(compass_direction(0.0), "N");
        assert_eq!(compass_direction(11.24), "N");
        assert_eq!(compass_direction(11.25), "NNE");
        assert_eq!(compass_direction(90.0), "E");
        assert_eq!(compass_direction(348.75), "N");
        assert_eq!(compass_direction(348.7), "NNW");
        assert_eq!(compass_direction(-90.0), "W");
        assert_eq!(compass_direction(720.0), "N");
    }

    #[test]
    fn deg_min_edge_cases() {
        assert_eq!(parse_deg_min("4807.038", "X"), None);
        assert_eq!(parse_deg_min("07.0", "N"), None);
        assert_eq!(parse_deg_min("0000.000", "S"), Some(-0.0));
        assert!(parse_date("320324").is_none());
        assert!(parse_time("2561").is_none());
    }

    #[test]
    fn fix_serializes_with_rfc3339_timestamp() {
        let mut p = locked();
        let v = serde_json::to_value(p.feed(RMC).unwrap()).unwrap();
        assert_eq!(v["timestamp"], "2024-03-23T12:35:19Z");
        assert_eq!(v["course"], "E");
        assert_eq!(v["fix_type"], "Fix3d");
    }

    #[tokio::test]
    async fn replay_reads_a_capture() {
        let path = std::env::temp_dir().join(format!("dashlink-replay-{}.nmea", std::process::id()));
        let body = format!("{GGA}\r\n{GSA_3D}\r\nnoise\r\n{RMC}\r\n");
        tokio::fs::write(&path, body).await.unwrap();

        let mut r = NmeaReplay::open(path.to_str().unwrap()).await.unwrap();
        assert_eq!(r.next_fix().await.unwrap().unwrap().speed, 41);
        assert!(r.next_fix().await.unwrap().is_none());
        let _ = tokio::fs::remove_file(&path).await;
    }
}
