//! The boundary between the dimmer engine and whatever hosts it.
//!
//! The engine never touches entities, timers or a clock directly. It reads
//! settings and live state through [`DimmerPort`] and issues commands back
//! through it. Commands are fire-and-forget: the port may execute them in the
//! background, but their effect must be observable before the next engine
//! callback is dispatched.

use chrono::DateTime;
use chrono::Utc;

use crate::types::DimmerStateChange;
use crate::types::SegmentTarget;
use crate::types::TimerRecord;
use crate::types::TurnOn;

/// Read/command surface for one managed light.
///
/// Settings that have not been configured read as `None`. Percent settings
/// are already scaled to the 0-255 brightness range.
pub trait DimmerPort {
    /// Host-specific payload describing a change of the managed light.
    type StateChange;

    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    // Live state.

    /// True if any trigger is currently active.
    fn are_triggers_on(&self) -> bool;

    /// True if the managed light is physically on.
    fn is_dimmer_on(&self) -> bool;

    /// True if the user has automation switched on.
    fn is_on(&self) -> bool;

    /// True if the currently selected segment is enabled.
    fn is_segment_enabled(&self) -> bool;

    /// The end of the current temporary disable.
    ///
    /// An unreadable value must be reported as "now", i.e. already expired.
    fn disabled_until(&self) -> DateTime<Utc>;

    /// The persisted countdown timer record.
    fn timer(&self) -> TimerRecord;

    // Settings.

    /// Minimum brightness the light can reliably be turned on at.
    fn brightness_min(&self) -> Option<u8>;

    /// Maximum number of seconds the countdown may be extended by.
    fn extension_max(&self) -> Option<u64>;

    /// Seconds to suspend automation after a manual change.
    fn manual_override(&self) -> Option<u64>;

    fn prediction_brightness(&self) -> Option<u8>;

    fn prediction_secs(&self) -> Option<u64>;

    /// Target settings of the current segment.
    fn target(&self) -> SegmentTarget;

    /// Base on-duration of the current segment.
    fn seconds(&self) -> Option<u64>;

    /// Seconds between re-checks of the triggers. Zero disables re-checking.
    fn trigger_interval(&self) -> Option<u64>;

    /// Classify a raw light change into on/off and brightness transitions.
    fn classify_change(&self, change: &Self::StateChange) -> DimmerStateChange;

    // Commands.

    /// Cancel the countdown timer. Canceling an idle timer is a no-op.
    fn cancel_timer(&mut self);

    /// Cancel the periodic re-check timer. Canceling an idle timer is a no-op.
    fn cancel_periodic_timer(&mut self);

    /// Schedule the countdown to fire at `at`, replacing any running one.
    ///
    /// When it fires the host must call
    /// [`MotionDimmer::timer_callback`](crate::MotionDimmer::timer_callback).
    fn schedule_timer(&mut self, at: DateTime<Utc>, duration: &str);

    /// Schedule the periodic re-check, replacing any running one.
    ///
    /// Fires [`MotionDimmer::periodic_callback`](crate::MotionDimmer::periodic_callback).
    fn schedule_periodic_timer(&mut self, at: DateTime<Utc>);

    /// Schedule the end of a pump flash.
    ///
    /// Fires [`MotionDimmer::pump_callback`](crate::MotionDimmer::pump_callback).
    fn schedule_pump_timer(&mut self, at: DateTime<Utc>);

    fn set_temporarily_disabled(&mut self, until: DateTime<Utc>);

    fn turn_on_dimmer(&mut self, command: &TurnOn);

    fn turn_off_dimmer(&mut self);

    /// Run the companion automation. No-op if none is configured.
    fn turn_on_script(&mut self);

    /// Persist the countdown timer record for display and restart recovery.
    fn track_timer(&mut self, record: &TimerRecord);
}

/// Extra capabilities needed by the operator services.
pub trait ServicePort: DimmerPort {
    /// Switch automation on or off.
    fn set_automation_enabled(&mut self, enabled: bool);
}
