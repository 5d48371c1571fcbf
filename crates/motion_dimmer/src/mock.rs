//! In-memory port that records every command, for engine tests.

use std::fmt;

use chrono::DateTime;
use chrono::TimeDelta;
use chrono::TimeZone;
use chrono::Utc;

use crate::port::DimmerPort;
use crate::port::ServicePort;
use crate::types::seconds_between;
use crate::types::DimmerStateChange;
use crate::types::LightColor;
use crate::types::SegmentTarget;
use crate::types::TimerRecord;
use crate::types::TimerStatus;
use crate::types::TurnOn;

/// A recorded command. Times are seconds relative to the port's clock when
/// the command was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    CancelTimer,
    CancelPeriodicTimer,
    ScheduleTimer { secs: i64, duration: String },
    SchedulePeriodicTimer { secs: i64 },
    SchedulePumpTimer { secs: i64 },
    SetTemporarilyDisabled { secs: i64 },
    TurnOnDimmer(TurnOn),
    TurnOffDimmer,
    TurnOnScript,
    TrackTimer {
        secs: i64,
        duration: String,
        status: TimerStatus,
    },
    SetAutomationEnabled(bool),
}

impl Call {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Call::CancelTimer => "cancel_timer",
            Call::CancelPeriodicTimer => "cancel_periodic_timer",
            Call::ScheduleTimer { .. } => "schedule_timer",
            Call::SchedulePeriodicTimer { .. } => "schedule_periodic_timer",
            Call::SchedulePumpTimer { .. } => "schedule_pump_timer",
            Call::SetTemporarilyDisabled { .. } => "set_temporarily_disabled",
            Call::TurnOnDimmer(_) => "turn_on_dimmer",
            Call::TurnOffDimmer => "turn_off_dimmer",
            Call::TurnOnScript => "turn_on_script",
            Call::TrackTimer { .. } => "track_timer",
            Call::SetAutomationEnabled(_) => "set_automation_enabled",
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        match self {
            Call::ScheduleTimer { secs, duration } => {
                write!(f, " in={}s duration={}", secs, duration)
            }
            Call::SchedulePeriodicTimer { secs }
            | Call::SchedulePumpTimer { secs }
            | Call::SetTemporarilyDisabled { secs } => write!(f, " in={}s", secs),
            Call::TurnOnDimmer(command) => {
                match command.brightness {
                    Some(brightness) => write!(f, " brightness={}", brightness)?,
                    None => write!(f, " brightness=none")?,
                }
                if let Some(transition) = command.transition {
                    write!(f, " transition={}", transition)?;
                }
                match command.color {
                    Some(LightColor::Temperature(mireds)) => write!(f, " color_temp={}", mireds),
                    Some(LightColor::Rgb([r, g, b])) => write!(f, " rgb={},{},{}", r, g, b),
                    None => Ok(()),
                }
            }
            Call::TrackTimer {
                secs,
                duration,
                status,
            } => write!(f, " in={}s duration={} status={}", secs, duration, status),
            Call::SetAutomationEnabled(enabled) => write!(f, " {}", enabled),
            Call::CancelTimer | Call::CancelPeriodicTimer | Call::TurnOffDimmer | Call::TurnOnScript => {
                Ok(())
            }
        }
    }
}

/// Settings mirror the stock defaults: 1% minimum, 60s segment at full
/// brightness, 59s re-check, 600s extension and override.
#[derive(Debug, Clone)]
pub(crate) struct MockPort {
    pub now: DateTime<Utc>,

    pub triggers_on: bool,
    pub dimmer_on: bool,
    pub brightness: Option<u8>,
    pub automation_on: bool,
    pub segment_enabled: bool,
    pub disabled_until: DateTime<Utc>,
    pub timer: TimerRecord,

    pub brightness_min: Option<u8>,
    pub extension_max: Option<u64>,
    pub manual_override: Option<u64>,
    pub prediction_brightness: Option<u8>,
    pub prediction_secs: Option<u64>,
    pub target: SegmentTarget,
    pub seconds: Option<u64>,
    pub trigger_interval: Option<u64>,

    pub timer_at: Option<DateTime<Utc>>,
    pub periodic_at: Option<DateTime<Utc>>,
    pub pump_at: Option<DateTime<Utc>>,

    calls: Vec<Call>,
}

impl Default for MockPort {
    fn default() -> Self {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        Self {
            now,
            triggers_on: false,
            dimmer_on: false,
            brightness: None,
            automation_on: true,
            segment_enabled: true,
            disabled_until: now,
            timer: TimerRecord::idle(now),
            brightness_min: Some(3),
            extension_max: Some(600),
            manual_override: Some(600),
            prediction_brightness: Some(26),
            prediction_secs: Some(15),
            target: SegmentTarget {
                brightness: Some(255),
                ..Default::default()
            },
            seconds: Some(60),
            trigger_interval: Some(59),
            timer_at: None,
            periodic_at: None,
            pump_at: None,
            calls: Vec::new(),
        }
    }
}

impl MockPort {
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.calls.iter().map(Call::name).collect()
    }

    /// Render and clear the recorded commands, one per line.
    pub fn take_log(&mut self) -> String {
        let log = self
            .calls
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        self.calls.clear();
        log
    }

    pub fn advance(&mut self, secs: i64) {
        self.now += TimeDelta::seconds(secs);
    }

    /// Seconds until disabled-until, relative to now.
    pub fn disabled_in(&self) -> i64 {
        self.secs_until(self.disabled_until)
    }

    fn secs_until(&self, at: DateTime<Utc>) -> i64 {
        seconds_between(self.now, at)
    }
}

impl DimmerPort for MockPort {
    type StateChange = DimmerStateChange;

    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn are_triggers_on(&self) -> bool {
        self.triggers_on
    }

    fn is_dimmer_on(&self) -> bool {
        self.dimmer_on
    }

    fn is_on(&self) -> bool {
        self.automation_on
    }

    fn is_segment_enabled(&self) -> bool {
        self.segment_enabled
    }

    fn disabled_until(&self) -> DateTime<Utc> {
        self.disabled_until
    }

    fn timer(&self) -> TimerRecord {
        self.timer.clone()
    }

    fn brightness_min(&self) -> Option<u8> {
        self.brightness_min
    }

    fn extension_max(&self) -> Option<u64> {
        self.extension_max
    }

    fn manual_override(&self) -> Option<u64> {
        self.manual_override
    }

    fn prediction_brightness(&self) -> Option<u8> {
        self.prediction_brightness
    }

    fn prediction_secs(&self) -> Option<u64> {
        self.prediction_secs
    }

    fn target(&self) -> SegmentTarget {
        self.target.clone()
    }

    fn seconds(&self) -> Option<u64> {
        self.seconds
    }

    fn trigger_interval(&self) -> Option<u64> {
        self.trigger_interval
    }

    fn classify_change(&self, change: &DimmerStateChange) -> DimmerStateChange {
        *change
    }

    fn cancel_timer(&mut self) {
        self.timer_at = None;
        self.calls.push(Call::CancelTimer);
    }

    fn cancel_periodic_timer(&mut self) {
        self.periodic_at = None;
        self.calls.push(Call::CancelPeriodicTimer);
    }

    fn schedule_timer(&mut self, at: DateTime<Utc>, duration: &str) {
        self.timer_at = Some(at);
        let secs = self.secs_until(at);
        self.calls.push(Call::ScheduleTimer {
            secs,
            duration: duration.to_string(),
        });
    }

    fn schedule_periodic_timer(&mut self, at: DateTime<Utc>) {
        self.periodic_at = Some(at);
        let secs = self.secs_until(at);
        self.calls.push(Call::SchedulePeriodicTimer { secs });
    }

    fn schedule_pump_timer(&mut self, at: DateTime<Utc>) {
        self.pump_at = Some(at);
        let secs = self.secs_until(at);
        self.calls.push(Call::SchedulePumpTimer { secs });
    }

    fn set_temporarily_disabled(&mut self, until: DateTime<Utc>) {
        self.disabled_until = until;
        let secs = self.secs_until(until);
        self.calls.push(Call::SetTemporarilyDisabled { secs });
    }

    fn turn_on_dimmer(&mut self, command: &TurnOn) {
        self.dimmer_on = true;
        if command.brightness.is_some() {
            self.brightness = command.brightness;
        }
        self.calls.push(Call::TurnOnDimmer(command.clone()));
    }

    fn turn_off_dimmer(&mut self) {
        self.dimmer_on = false;
        self.calls.push(Call::TurnOffDimmer);
    }

    fn turn_on_script(&mut self) {
        self.calls.push(Call::TurnOnScript);
    }

    fn track_timer(&mut self, record: &TimerRecord) {
        self.timer = record.clone();
        let secs = self.secs_until(record.end_time);
        self.calls.push(Call::TrackTimer {
            secs,
            duration: record.duration.clone(),
            status: record.status,
        });
    }
}

impl ServicePort for MockPort {
    fn set_automation_enabled(&mut self, enabled: bool) {
        self.automation_on = enabled;
        self.calls.push(Call::SetAutomationEnabled(enabled));
    }
}
