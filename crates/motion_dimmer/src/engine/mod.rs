use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::defaults::BRIGHTNESS_TOLERANCE;
use crate::defaults::DEFAULT_PREDICTION_SECS;
use crate::defaults::DEFAULT_SEGMENT_SECONDS;
use crate::defaults::DISABLE_BUFFER;
use crate::defaults::PUMP_TIME;
use crate::defaults::TRANSITION;
use crate::extension::next_extension;
use crate::port::DimmerPort;
use crate::types::after;
use crate::types::format_duration;
use crate::types::seconds_between;
use crate::types::TimerRecord;
use crate::types::TimerStatus;
use crate::types::TurnOn;


/// What the periodic re-check does when the current segment is disabled
/// while the light is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentDisabledPolicy {
    /// Leave the light alone; the countdown turns it off.
    #[default]
    WaitForTimer,
    /// Turn the light off at the next periodic check.
    StopAtNextCheck,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimmerOptions {
    #[serde(default)]
    pub segment_disabled: SegmentDisabledPolicy,
}

/// Motion-activated adaptive dimmer for one light.
///
/// All decisions are made here; every observation and effect goes through
/// the port. Callbacks must be dispatched one at a time.
pub struct MotionDimmer<P> {
    port: P,
    options: DimmerOptions,

    is_prediction: bool,
    is_pumping: bool,
    was_dimmer_on: bool,

    /// Seconds added on top of the segment's base duration.
    additional_time: u64,
    dimmer_time_on: DateTime<Utc>,
    dimmer_time_off: DateTime<Utc>,

    timer_end_time: DateTime<Utc>,
    timer_duration: String,
}

impl<P: DimmerPort> MotionDimmer<P> {
    pub fn new(port: P) -> Self {
        Self::with_options(port, DimmerOptions::default())
    }

    pub fn with_options(port: P, options: DimmerOptions) -> Self {
        let now = port.now();
        Self {
            port,
            options,
            is_prediction: false,
            is_pumping: false,
            was_dimmer_on: false,
            additional_time: 0,
            dimmer_time_on: now,
            dimmer_time_off: now,
            timer_end_time: now,
            timer_duration: format_duration(0),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn is_prediction(&self) -> bool {
        self.is_prediction
    }

    pub fn is_pumping(&self) -> bool {
        self.is_pumping
    }

    pub fn additional_time(&self) -> u64 {
        self.additional_time
    }

    /// End of the countdown as last tracked.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.timer_end_time
    }

    /// Duration label of the countdown as last tracked.
    pub fn duration(&self) -> &str {
        &self.timer_duration
    }

    /// Seconds since the light was last turned on by a trigger.
    pub fn dimmer_on_seconds(&self) -> i64 {
        seconds_between(self.dimmer_time_on, self.port.now())
    }

    /// Seconds since the light was last turned off, or 0 while it is on.
    pub fn dimmer_off_seconds(&self) -> i64 {
        if self.port.is_dimmer_on() {
            return 0;
        }
        seconds_between(self.dimmer_time_off, self.port.now())
    }

    /// Automation is on, not temporarily disabled, and the segment is enabled.
    pub fn is_enabled(&self) -> bool {
        if !self.port.is_on() {
            debug!("Automation switched off");
            return false;
        }
        if self.is_temporarily_disabled() {
            debug!("Temporarily disabled until {}", self.port.disabled_until());
            return false;
        }
        self.port.is_segment_enabled()
    }

    pub fn is_temporarily_disabled(&self) -> bool {
        self.port.now() < self.port.disabled_until()
    }

    /// Update the on-duration extension from the light's recent history.
    pub fn add_time(&mut self) {
        let max = self.port.extension_max().unwrap_or(0);
        let on_secs = self.dimmer_on_seconds();
        let off_secs = self.dimmer_off_seconds();
        let extension = next_extension(self.additional_time, on_secs, off_secs, max);
        debug!(
            "Extension {}s -> {}s (on {}s, off {}s)",
            self.additional_time, extension, on_secs, off_secs
        );
        self.additional_time = extension;
    }

    // Callbacks.

    /// A trigger turned on.
    pub fn triggered_callback(&mut self) {
        if self.is_enabled() {
            self.start_dimmer(false);
        }
    }

    /// A predictor turned on.
    pub fn predictor_callback(&mut self) {
        if self.is_enabled() && !self.port.is_dimmer_on() {
            self.start_dimmer(true);
        }
    }

    /// The pump flash is over.
    pub fn pump_callback(&mut self) {
        if !self.is_pumping {
            debug!("Pump timer fired with no pump in progress");
            return;
        }
        if self.is_enabled() {
            self.start_dimmer(false);
        } else {
            self.is_pumping = false;
        }
    }

    /// Periodic re-check of the triggers while the light is on.
    pub fn periodic_callback(&mut self) {
        if self.is_enabled() {
            if self.port.are_triggers_on() {
                self.start_dimmer(false);
            } else {
                self.schedule_periodic_timer();
            }
            return;
        }

        if self.options.segment_disabled == SegmentDisabledPolicy::StopAtNextCheck
            && self.port.is_on()
            && !self.is_temporarily_disabled()
            && !self.port.is_segment_enabled()
            && self.port.is_dimmer_on()
        {
            info!("Segment disabled, turning off");
            self.stop_dimmer();
        }
    }

    /// The countdown expired.
    pub fn timer_callback(&mut self) {
        self.stop_dimmer();
    }

    /// The managed light changed. Changes the engine did not cause suspend
    /// automation for a while.
    pub fn dimmer_state_callback(&mut self, change: &P::StateChange) {
        if !self.is_enabled() {
            return;
        }

        let change = self.port.classify_change(change);
        if change.was_on != change.is_on {
            if change.is_on != self.port.are_triggers_on() && !self.is_prediction {
                info!(
                    "Light turned {} manually",
                    if change.is_on { "on" } else { "off" }
                );
                self.disable_temporarily();
            }
            return;
        }

        if change.old_brightness == change.new_brightness || self.is_pumping {
            return;
        }
        if let (Some(target), Some(new)) = (self.port.target().brightness, change.new_brightness) {
            if (i16::from(target) - i16::from(new)).abs() > BRIGHTNESS_TOLERANCE {
                info!("Brightness changed manually: {} (target {})", new, target);
                self.disable_temporarily();
            }
        }
    }

    /// Recover the countdown from the persisted timer record.
    pub fn init_timer(&mut self) {
        let record = self.port.timer();
        self.timer_end_time = record.end_time;
        self.timer_duration = record.duration.clone();

        if record.end_time > self.port.now() {
            info!("Resuming countdown until {}", record.end_time);
            self.restart_timer(record.end_time, record.duration);
        } else if record.status == TimerStatus::Active {
            info!("Countdown expired while stopped");
            self.timer_callback();
        }
    }

    // Actions.

    pub fn start_dimmer(&mut self, is_prediction: bool) {
        self.was_dimmer_on = !self.is_prediction && !self.is_pumping && self.port.is_dimmer_on();
        self.is_prediction = is_prediction;
        // A pump already in progress settles now instead of pumping again.
        let settling = std::mem::take(&mut self.is_pumping);

        if self.pump(settling) || self.predict() {
            return;
        }

        if !self.was_dimmer_on {
            self.dimmer_time_on = self.port.now();
        }
        self.add_time();

        info!("Turning on");
        self.turn_on_dimmer(None);
        self.schedule_timer();
        self.schedule_periodic_timer();

        if !self.was_dimmer_on {
            self.port.turn_on_script();
        }
    }

    /// Turn the light off, unless triggers are still active in which case
    /// the countdown restarts.
    pub fn stop_dimmer(&mut self) {
        if self.port.is_on() && !self.is_temporarily_disabled() {
            if self.port.are_triggers_on() && self.port.is_segment_enabled() {
                debug!("Triggers still active, restarting");
                self.start_dimmer(false);
                return;
            }

            info!("Turning off");
            self.is_prediction = false;
            self.is_pumping = false;
            self.port.cancel_timer();
            self.port.cancel_periodic_timer();
            self.port.turn_off_dimmer();
            self.dimmer_time_off = self.port.now();
        }

        let now = self.port.now();
        self.track_timer(TimerRecord::idle(now));
    }

    /// Suspend automation for the manual override period.
    pub fn disable_temporarily(&mut self) {
        match self.port.manual_override() {
            Some(seconds) if seconds > 0 => {
                self.extend_disable(seconds);
            }
            _ => debug!("No manual override period, staying enabled"),
        }
    }

    /// Push disabled-until out to `now + seconds`, never pulling it in.
    ///
    /// Also schedules a countdown shortly after the new end so the light is
    /// turned off once automation resumes. Returns false if an existing
    /// disable already lasts longer.
    pub(crate) fn extend_disable(&mut self, seconds: u64) -> bool {
        let now = self.port.now();
        let until = after(now, seconds);
        if self.port.disabled_until() >= until {
            debug!("Already disabled until {}", self.port.disabled_until());
            return false;
        }

        info!("Disabling for {}s until {}", seconds, until);
        let buffered = seconds.saturating_add(DISABLE_BUFFER);
        self.port
            .schedule_timer(after(now, buffered), &format_duration(buffered));
        self.port.set_temporarily_disabled(until);
        true
    }

    fn pump(&mut self, settling: bool) -> bool {
        if self.was_dimmer_on || settling || self.is_prediction {
            return false;
        }
        let (Some(target), Some(min)) = (self.port.target().brightness, self.port.brightness_min())
        else {
            return false;
        };
        if target >= min {
            return false;
        }

        info!("Pumping at {} before settling at {}", min, target);
        self.is_pumping = true;
        self.port.turn_on_dimmer(&TurnOn {
            brightness: Some(min),
            transition: Some(TRANSITION),
            color: None,
        });
        let at = after(self.port.now(), PUMP_TIME);
        self.port.schedule_pump_timer(at);
        true
    }

    fn predict(&mut self) -> bool {
        if !self.is_prediction {
            return false;
        }

        let target = self.port.target().brightness;
        let mut brightness = self.port.prediction_brightness().or(target);
        if let Some(min) = self.port.brightness_min() {
            brightness = brightness.map(|b| b.max(min));
        }
        if let Some(target) = target {
            brightness = brightness.map(|b| b.min(target));
        }

        let secs = self.port.prediction_secs().unwrap_or_else(|| {
            warn!(
                "Prediction duration unavailable, using {}s",
                DEFAULT_PREDICTION_SECS
            );
            DEFAULT_PREDICTION_SECS
        });

        info!("Predicting at {:?} for {}s", brightness, secs);
        self.turn_on_dimmer(brightness);
        let at = after(self.port.now(), secs);
        self.restart_timer(at, format_duration(secs));
        true
    }

    fn turn_on_dimmer(&mut self, brightness: Option<u8>) {
        let target = self.port.target();
        let command = TurnOn {
            brightness: brightness.or(target.brightness),
            transition: Some(TRANSITION),
            color: target.color(),
        };
        self.port.turn_on_dimmer(&command);
    }

    /// Base duration of the current segment plus the extension.
    fn seconds(&self) -> u64 {
        let base = self.port.seconds().unwrap_or_else(|| {
            warn!(
                "Segment duration unavailable, using {}s",
                DEFAULT_SEGMENT_SECONDS
            );
            DEFAULT_SEGMENT_SECONDS
        });
        base.saturating_add(self.additional_time)
    }

    fn schedule_timer(&mut self) {
        let secs = self.seconds();
        let at = after(self.port.now(), secs);
        self.restart_timer(at, format_duration(secs));
    }

    fn restart_timer(&mut self, at: DateTime<Utc>, duration: String) {
        self.port.cancel_timer();
        self.port.schedule_timer(at, &duration);
        self.track_timer(TimerRecord {
            end_time: at,
            duration,
            status: TimerStatus::Active,
        });
    }

    fn schedule_periodic_timer(&mut self) {
        let interval = match self.port.trigger_interval() {
            Some(interval) if interval > 0 => interval,
            _ => return,
        };
        let at = after(self.port.now(), interval);
        self.port.cancel_periodic_timer();
        self.port.schedule_periodic_timer(at);
    }

    fn track_timer(&mut self, record: TimerRecord) {
        self.timer_end_time = record.end_time;
        self.timer_duration = record.duration.clone();
        self.port.track_timer(&record);
    }
}
