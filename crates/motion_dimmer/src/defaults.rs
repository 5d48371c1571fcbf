//! Timing constants and default settings.

/// Seconds a pump flash lasts before settling at the target brightness.
pub const PUMP_TIME: u64 = 1;

/// Off for less than this many seconds counts as a brief interruption.
pub const SMALL_TIME_OFF: i64 = 20;

/// Off for this many seconds or more resets the extension.
pub const LONG_TIME_OFF: i64 = 1200;

/// Extra seconds after a temporary disable before the light is forced off.
pub const DISABLE_BUFFER: u64 = 5;

/// Transition in seconds used for every turn-on.
pub const TRANSITION: u32 = 1;

/// Brightness drift (0-255 units) tolerated before a change counts as manual.
pub const BRIGHTNESS_TOLERANCE: i16 = 1;

pub const DEFAULT_MIN_BRIGHTNESS_PCT: f64 = 1.0;
pub const DEFAULT_TRIGGER_INTERVAL: u64 = 59;
pub const DEFAULT_EXTENSION_MAX: u64 = 600;
pub const DEFAULT_MANUAL_OVERRIDE: u64 = 600;
pub const DEFAULT_PREDICTION_SECS: u64 = 15;
pub const DEFAULT_PREDICTION_BRIGHTNESS_PCT: f64 = 10.0;
pub const DEFAULT_SEGMENT_SECONDS: u64 = 60;

/// Scale a 0-100 percentage to the 0-255 brightness range.
pub fn pct_to_brightness(pct: f64) -> u8 {
    if pct.is_nan() {
        return 0;
    }
    (pct * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pct_to_brightness() {
        assert_eq!(pct_to_brightness(0.0), 0);
        assert_eq!(pct_to_brightness(1.0), 3);
        assert_eq!(pct_to_brightness(10.0), 26);
        assert_eq!(pct_to_brightness(50.0), 128);
        assert_eq!(pct_to_brightness(100.0), 255);
        assert_eq!(pct_to_brightness(250.0), 255);
        assert_eq!(pct_to_brightness(-4.0), 0);
        assert_eq!(pct_to_brightness(f64::NAN), 0);
    }
}
