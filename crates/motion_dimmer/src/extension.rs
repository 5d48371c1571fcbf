use crate::defaults::LONG_TIME_OFF;
use crate::defaults::SMALL_TIME_OFF;

/// Compute the next on-duration extension from recent on/off history.
///
/// * still on: grow slowly, by a fifth of the time spent on
/// * off briefly: grow by the full time spent on
/// * off for a while: halve
/// * off for a long time: reset
///
/// The result is clamped to `[0, max]`.
pub fn next_extension(current: u64, on_secs: i64, off_secs: i64, max: u64) -> u64 {
    let current = i64::try_from(current).unwrap_or(i64::MAX);
    let total = if off_secs <= 0 {
        current.saturating_add(on_secs / 5)
    } else if off_secs < SMALL_TIME_OFF {
        current.saturating_add(on_secs)
    } else if off_secs < LONG_TIME_OFF {
        current - current / 2
    } else {
        0
    };

    let max = i64::try_from(max).unwrap_or(i64::MAX);
    total.clamp(0, max) as u64
}
