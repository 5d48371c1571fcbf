use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;

/// Color mode of a light, as reported by the light itself or by a segment's target light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ColorMode {
    Onoff,
    Brightness,
    ColorTemp,
    Hs,
    Xy,
    Rgb,
    Rgbw,
    Rgbww,
    White,
    Unknown,
}

/// Visual settings the current segment wants the managed light to have.
///
/// Every field is optional: a segment light that has never been given a
/// brightness or color simply has nothing to say about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentTarget {
    /// Target brightness (0-255).
    pub brightness: Option<u8>,
    pub color_mode: Option<ColorMode>,
    /// Color temperature in mireds.
    pub color_temp: Option<u16>,
    pub rgb_color: Option<[u8; 3]>,
}

impl SegmentTarget {
    /// The color component that goes with this target's color mode, if any.
    pub fn color(&self) -> Option<LightColor> {
        match self.color_mode? {
            ColorMode::ColorTemp => self.color_temp.map(LightColor::Temperature),
            ColorMode::Rgb => self.rgb_color.map(LightColor::Rgb),
            _ => None,
        }
    }
}

/// Color component of a turn-on command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightColor {
    /// Color temperature in mireds.
    Temperature(u16),
    Rgb([u8; 3]),
}

/// Parameters for turning the managed light on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOn {
    pub brightness: Option<u8>,
    /// Transition time in seconds.
    pub transition: Option<u32>,
    pub color: Option<LightColor>,
}

/// Whether the countdown timer is running.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TimerStatus {
    Active,
    #[default]
    Idle,
}

/// Persisted mirror of the countdown timer, used for display and for
/// recovering the countdown after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRecord {
    pub end_time: DateTime<Utc>,
    /// Human readable duration label (`H:MM:SS`).
    pub duration: String,
    pub status: TimerStatus,
}

impl TimerRecord {
    /// An idle record ending at `now`.
    pub fn idle(now: DateTime<Utc>) -> Self {
        Self {
            end_time: now,
            duration: format_duration(0),
            status: TimerStatus::Idle,
        }
    }
}

/// A change of the managed light, as classified by the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimmerStateChange {
    pub was_on: bool,
    pub is_on: bool,
    pub old_brightness: Option<u8>,
    pub new_brightness: Option<u8>,
}

/// Render a number of seconds as `H:MM:SS`.
///
/// Hours are never folded into days, so a week reads `168:00:00`.
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{}:{:02}:{:02}", hours, minutes, seconds)
}

/// `now + secs`, saturating instead of overflowing.
pub(crate) fn after(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    let delta = i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX);
    now.checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whole seconds elapsed from `then` to `now`, rounded to the nearest second.
pub(crate) fn seconds_between(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (now - then).num_milliseconds();
    (millis as f64 / 1000.0).round() as i64
}
