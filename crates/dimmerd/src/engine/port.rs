//! [`DimmerPort`] backed by the daemon's entity store.

use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use motion_dimmer::defaults::pct_to_brightness;
use motion_dimmer::ColorMode;
use motion_dimmer::DimmerPort;
use motion_dimmer::DimmerStateChange;
use motion_dimmer::LightColor;
use motion_dimmer::SegmentTarget;
use motion_dimmer::ServicePort;
use motion_dimmer::TimerRecord;
use motion_dimmer::TurnOn;
use tracing::debug;
use tracing::warn;

use super::clock::Clock;
use super::entity::slugify;
use super::entity::ControlIds;
use super::message::LightChange;
use super::message::MessageSender;
use super::state::DateTimeState;
use super::state::LightState;
use super::state::ScriptState;
use super::state::SwitchState;
use super::timers::TimerKind;
use super::timers::TimerSlot;
use super::StateStore;
use crate::config::DimmerConfig;

pub struct HostPort {
    device_id: String,
    config: Arc<DimmerConfig>,
    ids: ControlIds,
    store: StateStore,
    clock: Arc<dyn Clock>,

    countdown: TimerSlot,
    periodic: TimerSlot,
    pump: TimerSlot,
}

impl HostPort {
    pub fn new(
        device_id: &str,
        config: Arc<DimmerConfig>,
        store: StateStore,
        clock: Arc<dyn Clock>,
        tx: MessageSender,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            ids: ControlIds::new(device_id),
            countdown: TimerSlot::new(device_id, TimerKind::Countdown, tx.clone()),
            periodic: TimerSlot::new(device_id, TimerKind::Periodic, tx.clone()),
            pump: TimerSlot::new(device_id, TimerKind::Pump, tx),
            config,
            store,
            clock,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn config(&self) -> &DimmerConfig {
        &self.config
    }

    pub fn ids(&self) -> &ControlIds {
        &self.ids
    }

    pub fn timer_slot(&mut self, kind: TimerKind) -> &mut TimerSlot {
        match kind {
            TimerKind::Countdown => &mut self.countdown,
            TimerKind::Periodic => &mut self.periodic,
            TimerKind::Pump => &mut self.pump,
        }
    }

    /// Slug of the selected segment, if a select option is set.
    pub fn current_segment(&self) -> Option<String> {
        let state = self.store.snapshot();
        let option = &state.selects.get(&self.config.select)?.option;
        Some(slugify(option))
    }

    fn segment_light(&self) -> Option<LightState> {
        let segment = self.current_segment()?;
        let id = self.ids.segment_light(&segment);
        self.store.snapshot().lights.get(&id).cloned()
    }

    fn number(&self, entity_id: &str) -> Option<f64> {
        let value = self.store.snapshot().numbers.get(entity_id)?.value;
        if value.is_finite() {
            Some(value)
        } else {
            warn!("{} is not a number", entity_id);
            None
        }
    }

    /// A whole number of seconds; negative values read as 0.
    fn seconds_setting(&self, entity_id: &str) -> Option<u64> {
        self.number(entity_id).map(|value| value.max(0.0).round() as u64)
    }

    fn brightness_setting(&self, entity_id: &str) -> Option<u8> {
        self.number(entity_id).map(pct_to_brightness)
    }

    /// Write the managed light. The dimmer already knows about its own
    /// commands, so nothing is reported back to the event loop.
    fn set_light(&mut self, new: LightState) {
        let entity_id = self.config.dimmer.clone();
        debug!("Set {}: on={} brightness={:?}", entity_id, new.on, new.brightness);
        self.store.update(|state| state.lights.insert(entity_id, new));
    }
}

impl DimmerPort for HostPort {
    type StateChange = LightChange;

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn are_triggers_on(&self) -> bool {
        let state = self.store.snapshot();
        self.config
            .triggers
            .iter()
            .any(|id| state.binary_sensors.get(id).is_some_and(|sensor| sensor.on))
    }

    fn is_dimmer_on(&self) -> bool {
        self.store
            .snapshot()
            .lights
            .get(&self.config.dimmer)
            .is_some_and(|light| light.on)
    }

    fn is_on(&self) -> bool {
        self.store
            .snapshot()
            .switches
            .get(&self.ids.control())
            .is_some_and(|switch| switch.on)
    }

    fn is_segment_enabled(&self) -> bool {
        self.segment_light().is_some_and(|light| light.on)
    }

    fn disabled_until(&self) -> DateTime<Utc> {
        let id = self.ids.disabled_until();
        let parsed = self
            .store
            .snapshot()
            .datetimes
            .get(&id)
            .and_then(DateTimeState::parse);
        parsed.unwrap_or_else(|| self.now())
    }

    fn timer(&self) -> TimerRecord {
        self.store
            .snapshot()
            .timers
            .get(&self.ids.timer())
            .cloned()
            .unwrap_or_else(|| TimerRecord::idle(self.now()))
    }

    fn brightness_min(&self) -> Option<u8> {
        self.brightness_setting(&self.ids.brightness_min())
    }

    fn extension_max(&self) -> Option<u64> {
        self.seconds_setting(&self.ids.extension_max())
    }

    fn manual_override(&self) -> Option<u64> {
        self.seconds_setting(&self.ids.manual_override())
    }

    fn prediction_brightness(&self) -> Option<u8> {
        self.brightness_setting(&self.ids.prediction_brightness())
    }

    fn prediction_secs(&self) -> Option<u64> {
        self.seconds_setting(&self.ids.prediction_secs())
    }

    fn target(&self) -> SegmentTarget {
        let Some(light) = self.segment_light() else {
            return SegmentTarget::default();
        };
        SegmentTarget {
            brightness: light.brightness,
            color_mode: light.color_mode,
            color_temp: light.color_temp,
            rgb_color: light.rgb_color,
        }
    }

    fn seconds(&self) -> Option<u64> {
        let segment = self.current_segment()?;
        self.seconds_setting(&self.ids.segment_seconds(&segment))
    }

    fn trigger_interval(&self) -> Option<u64> {
        self.seconds_setting(&self.ids.trigger_interval())
    }

    fn classify_change(&self, change: &LightChange) -> DimmerStateChange {
        // An off light has no brightness, whatever it last reported.
        let old = change.old.as_ref().filter(|light| light.on);
        DimmerStateChange {
            was_on: old.is_some(),
            is_on: change.new.on,
            old_brightness: old.and_then(|light| light.brightness),
            new_brightness: Some(&change.new)
                .filter(|light| light.on)
                .and_then(|light| light.brightness),
        }
    }

    fn cancel_timer(&mut self) {
        self.countdown.cancel();
    }

    fn cancel_periodic_timer(&mut self) {
        self.periodic.cancel();
    }

    fn schedule_timer(&mut self, at: DateTime<Utc>, duration: &str) {
        debug!("Countdown of {} until {}", duration, at);
        let now = self.now();
        self.countdown.schedule(now, at);
    }

    fn schedule_periodic_timer(&mut self, at: DateTime<Utc>) {
        let now = self.now();
        self.periodic.schedule(now, at);
    }

    fn schedule_pump_timer(&mut self, at: DateTime<Utc>) {
        let now = self.now();
        self.pump.schedule(now, at);
    }

    fn set_temporarily_disabled(&mut self, until: DateTime<Utc>) {
        let id = self.ids.disabled_until();
        self.store.update(|state| {
            state.datetimes.insert(id, DateTimeState::from_datetime(until))
        });
    }

    fn turn_on_dimmer(&mut self, command: &TurnOn) {
        let mut light = self
            .store
            .snapshot()
            .lights
            .get(&self.config.dimmer)
            .cloned()
            .unwrap_or_default();

        light.on = true;
        if command.brightness.is_some() {
            light.brightness = command.brightness;
        }
        match command.color {
            Some(LightColor::Temperature(mireds)) => {
                light.color_mode = Some(ColorMode::ColorTemp);
                light.color_temp = Some(mireds);
            }
            Some(LightColor::Rgb(rgb)) => {
                light.color_mode = Some(ColorMode::Rgb);
                light.rgb_color = Some(rgb);
            }
            None => {}
        }

        debug!(
            "{} on: brightness={:?} color={:?}",
            self.config.dimmer, light.brightness, command.color
        );
        self.set_light(light);
    }

    fn turn_off_dimmer(&mut self) {
        let mut light = self
            .store
            .snapshot()
            .lights
            .get(&self.config.dimmer)
            .cloned()
            .unwrap_or_default();
        light.on = false;

        debug!("{} off", self.config.dimmer);
        self.set_light(light);
    }

    fn turn_on_script(&mut self) {
        let Some(script) = self.config.script.clone() else {
            return;
        };
        debug!("Running {}", script);
        let now = self.now();
        self.store.update(|state| {
            state
                .scripts
                .insert(script, ScriptState { last_run: Some(now) })
        });
    }

    fn track_timer(&mut self, record: &TimerRecord) {
        let id = self.ids.timer();
        let record = record.clone();
        self.store.update(|state| state.timers.insert(id, record));
    }
}

impl ServicePort for HostPort {
    fn set_automation_enabled(&mut self, enabled: bool) {
        let id = self.ids.control();
        self.store
            .update(|state| state.switches.insert(id, SwitchState { on: enabled }));
    }
}
