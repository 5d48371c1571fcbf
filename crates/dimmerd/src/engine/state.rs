use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::DateTime;
use chrono::Utc;
use motion_dimmer::ColorMode;
use motion_dimmer::TimerRecord;
use serde::Deserialize;
use serde::Serialize;

/// State of a light entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LightState {
    /// Whether the light is on or off.
    pub on: bool,

    /// Brightness level (0-255), if supported.
    #[serde(default)]
    pub brightness: Option<u8>,

    #[serde(default)]
    pub color_mode: Option<ColorMode>,

    /// Color temperature in mireds.
    #[serde(default)]
    pub color_temp: Option<u16>,

    #[serde(default)]
    pub rgb_color: Option<[u8; 3]>,
}

/// State of a binary sensor entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BinarySensorState {
    /// Whether the sensor is active (motion detected, door open, ...)
    pub on: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NumberState {
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SwitchState {
    pub on: bool,
}

/// A datetime entity. Kept as text so a malformed value survives until a
/// reader decides what to do with it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DateTimeState {
    pub value: String,
}

impl DateTimeState {
    pub fn from_datetime(value: DateTime<Utc>) -> Self {
        Self {
            value: value.to_rfc3339(),
        }
    }

    pub fn parse(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.value)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectState {
    pub option: String,

    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScriptState {
    pub last_run: Option<DateTime<Utc>>,
}

/// Centralized snapshot of every entity the daemon knows about.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub lights: HashMap<String, LightState>,
    pub binary_sensors: HashMap<String, BinarySensorState>,
    pub numbers: HashMap<String, NumberState>,
    pub switches: HashMap<String, SwitchState>,
    pub datetimes: HashMap<String, DateTimeState>,
    pub selects: HashMap<String, SelectState>,
    pub timers: HashMap<String, TimerRecord>,
    pub scripts: HashMap<String, ScriptState>,
}

/// A write to one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityUpdate {
    Light(LightState),
    BinarySensor(BinarySensorState),
    Number(NumberState),
    Switch(SwitchState),
    #[serde(rename = "datetime")]
    DateTime(DateTimeState),
    Select(SelectOption),
    Timer(TimerRecord),
}

/// Select update. The list of options is fixed by configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub option: String,
}

/// What an applied update changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Light {
        old: Option<LightState>,
        new: LightState,
    },
    BinarySensor {
        old: Option<BinarySensorState>,
        new: BinarySensorState,
    },
    Other,
}

/// Any entity, as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityState {
    Light(LightState),
    BinarySensor(BinarySensorState),
    Number(NumberState),
    Switch(SwitchState),
    #[serde(rename = "datetime")]
    DateTime(DateTimeState),
    Select(SelectState),
    Timer(TimerRecord),
    Script(ScriptState),
}

impl State {
    /// Apply an update, returning what changed.
    pub fn apply(&mut self, entity_id: &str, update: EntityUpdate) -> Applied {
        let entity_id = entity_id.to_string();
        match update {
            EntityUpdate::Light(new) => {
                let old = self.lights.insert(entity_id, new.clone());
                Applied::Light { old, new }
            }
            EntityUpdate::BinarySensor(new) => {
                let old = self.binary_sensors.insert(entity_id, new.clone());
                Applied::BinarySensor { old, new }
            }
            EntityUpdate::Number(number) => {
                self.numbers.insert(entity_id, number);
                Applied::Other
            }
            EntityUpdate::Switch(switch) => {
                self.switches.insert(entity_id, switch);
                Applied::Other
            }
            EntityUpdate::DateTime(datetime) => {
                self.datetimes.insert(entity_id, datetime);
                Applied::Other
            }
            EntityUpdate::Select(SelectOption { option }) => {
                self.selects.entry(entity_id).or_default().option = option;
                Applied::Other
            }
            EntityUpdate::Timer(record) => {
                self.timers.insert(entity_id, record);
                Applied::Other
            }
        }
    }

    /// Look up any entity by id.
    pub fn entity(&self, entity_id: &str) -> Option<EntityState> {
        if let Some(light) = self.lights.get(entity_id) {
            return Some(EntityState::Light(light.clone()));
        }
        if let Some(sensor) = self.binary_sensors.get(entity_id) {
            return Some(EntityState::BinarySensor(sensor.clone()));
        }
        if let Some(number) = self.numbers.get(entity_id) {
            return Some(EntityState::Number(number.clone()));
        }
        if let Some(switch) = self.switches.get(entity_id) {
            return Some(EntityState::Switch(switch.clone()));
        }
        if let Some(datetime) = self.datetimes.get(entity_id) {
            return Some(EntityState::DateTime(datetime.clone()));
        }
        if let Some(select) = self.selects.get(entity_id) {
            return Some(EntityState::Select(select.clone()));
        }
        if let Some(timer) = self.timers.get(entity_id) {
            return Some(EntityState::Timer(timer.clone()));
        }
        self.scripts
            .get(entity_id)
            .map(|script| EntityState::Script(script.clone()))
    }
}

/// Shared handle to the current state snapshot.
///
/// Readers load the `Arc`; the event loop is the only writer and replaces the
/// whole snapshot on every change.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    state: Arc<ArcSwap<State>>,
}

impl StateStore {
    pub fn new(state: State) -> Self {
        Self {
            state: Arc::new(ArcSwap::from_pointee(state)),
        }
    }

    /// Get a snapshot of the current state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Clone the current state, modify it and store it back.
    pub fn update<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = State::clone(&self.state.load());
        let result = f(&mut state);
        self.state.store(Arc::new(state));
        result
    }
}
