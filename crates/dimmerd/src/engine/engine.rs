use std::collections::HashSet;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use motion_dimmer::defaults::pct_to_brightness;
use motion_dimmer::MotionDimmer;
use motion_dimmer::TimerRecord;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::info;
use tracing::info_span;
use tracing::warn;

use super::clock::Clock;
use super::entity::ControlIds;
use super::message::LightChange;
use super::message::Message;
use super::message::MessageReceiver;
use super::message::MessageSender;
use super::message::ServiceCall;
use super::port::HostPort;
use super::registry::Registry;
use super::services;
use super::services::ServiceError;
use super::state::Applied;
use super::state::DateTimeState;
use super::state::EntityUpdate;
use super::state::LightState;
use super::state::NumberState;
use super::state::SelectState;
use super::state::State;
use super::state::StateStore;
use super::state::SwitchState;
use super::timers::TimerKind;
use crate::config::Config;
use crate::config::DimmerConfig;
use crate::persistence::Persistence;
use crate::persistence::PersistenceError;
use crate::persistence::Snapshot;

/// dimmerd engine
///
/// Owns every dimmer and the entity store. Entity writes, timer expiries and
/// service calls arrive as messages and are dispatched to the dimmers one at a
/// time, so a dimmer never observes a half-applied change.
pub struct Engine {
    store: StateStore,
    registry: Registry,

    message_tx: MessageSender,
    message_rx: MessageReceiver,

    persistence: Option<Persistence>,
    /// Every control entity, for persistence
    control_ids: HashSet<String>,
    last_saved: Option<Snapshot>,
}

/// Cloneable handle for talking to a running [`Engine`].
#[derive(Clone)]
pub struct EngineHandle {
    store: StateStore,
    message_tx: MessageSender,
}

impl Engine {
    /// Create an engine for every configured dimmer, seeding the control
    /// entities from their configured defaults.
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let store = StateStore::new(seed(config, clock.as_ref()));

        let mut registry = Registry::new();
        let mut control_ids = HashSet::new();
        for (device_id, dimmer_config) in &config.dimmers {
            let port = HostPort::new(
                device_id,
                Arc::new(dimmer_config.clone()),
                store.clone(),
                clock.clone(),
                message_tx.clone(),
            );
            control_ids.extend(
                port.ids()
                    .all(dimmer_config.segments.iter().map(|s| s.slug.as_str())),
            );
            registry.insert(MotionDimmer::with_options(port, dimmer_config.options));
        }

        if registry.is_empty() {
            warn!("No dimmers configured");
        } else {
            info!("Managing {} dimmer(s)", registry.len());
        }

        Self {
            store,
            registry,
            message_tx,
            message_rx,
            persistence: None,
            control_ids,
            last_saved: None,
        }
    }

    /// Load stored control entities over the seeded ones and keep saving
    /// them as they change.
    pub fn with_persistence(mut self, persistence: Persistence) -> Result<Self, PersistenceError> {
        if let Some(snapshot) = persistence.load()? {
            let restored = self
                .store
                .update(|state| snapshot.restore(state, &self.control_ids));
            info!(
                "Restored {} control entities from {}",
                restored,
                persistence.path().display()
            );
        }

        self.last_saved = Some(Snapshot::capture(
            &self.store.snapshot(),
            &self.control_ids,
        ));
        self.persistence = Some(persistence);
        Ok(self)
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            store: self.store.clone(),
            message_tx: self.message_tx.clone(),
        }
    }

    /// Run the engine's main event loop until `shutdown` fires.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        info!("Engine starting");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                msg = self.message_rx.recv() => {
                    let Some(msg) = msg else { break };
                    self.handle_message(msg);
                    self.persist();
                }
            }
        }

        info!("Engine shutting down");
    }

    fn handle_message(&mut self, msg: Message) {
        match msg {
            Message::SetState {
                entity_id,
                update,
                done,
            } => {
                debug!("Set {}: {:?}", entity_id, update);
                let applied = self.store.update(|state| state.apply(&entity_id, update));
                self.entity_changed(&entity_id, applied);
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            Message::TimerFired {
                device_id,
                kind,
                generation,
            } => self.timer_fired(&device_id, kind, generation),
            Message::Service { call, reply } => {
                let _ = reply.send(self.call_service(&call));
            }
            Message::Ready => {
                for (device_id, dimmer) in self.registry.iter_mut() {
                    let _span = info_span!("dimmer", device = %device_id).entered();
                    dimmer.init_timer();
                }
            }
        }
    }

    fn entity_changed(&mut self, entity_id: &str, applied: Applied) {
        match applied {
            Applied::BinarySensor { old, new } => {
                let was_on = old.is_some_and(|sensor| sensor.on);
                if !new.on || was_on {
                    return;
                }

                for device_id in self.registry.triggered_by(entity_id) {
                    self.dispatch(&device_id, |dimmer| dimmer.triggered_callback());
                }
                for device_id in self.registry.predicted_by(entity_id) {
                    self.dispatch(&device_id, |dimmer| dimmer.predictor_callback());
                }
            }
            Applied::Light { old, new } => {
                if old.as_ref() == Some(&new) {
                    return;
                }
                self.light_changed(entity_id, &LightChange { old, new });
            }
            Applied::Other => {}
        }
    }

    fn light_changed(&mut self, entity_id: &str, change: &LightChange) {
        if let Some(device_id) = self.registry.managing(entity_id) {
            self.dispatch(&device_id, |dimmer| dimmer.dimmer_state_callback(change));
        }
    }

    fn timer_fired(&mut self, device_id: &str, kind: TimerKind, generation: u64) {
        self.dispatch(device_id, |dimmer| {
            if !dimmer.port_mut().timer_slot(kind).fire(generation) {
                return;
            }
            debug!("{} timer expired", kind);
            match kind {
                TimerKind::Countdown => dimmer.timer_callback(),
                TimerKind::Periodic => dimmer.periodic_callback(),
                TimerKind::Pump => dimmer.pump_callback(),
            }
        });
    }

    fn call_service(&mut self, call: &ServiceCall) -> Result<Vec<String>, ServiceError> {
        let devices = self.registry.resolve(&call.target)?;
        for device_id in &devices {
            self.dispatch(device_id, |dimmer| {
                if !services::apply(dimmer, call) {
                    debug!("{} changed nothing", call.service);
                }
            });
        }
        Ok(devices)
    }

    fn dispatch(&mut self, device_id: &str, f: impl FnOnce(&mut MotionDimmer<HostPort>)) {
        let Some(dimmer) = self.registry.get_mut(device_id) else {
            warn!("No dimmer for device '{}'", device_id);
            return;
        };
        let _span = info_span!("dimmer", device = %device_id).entered();
        f(dimmer);
    }

    fn persist(&mut self) {
        let Some(persistence) = &self.persistence else {
            return;
        };

        let snapshot = Snapshot::capture(&self.store.snapshot(), &self.control_ids);
        if self.last_saved.as_ref() == Some(&snapshot) {
            return;
        }

        match persistence.save(&snapshot) {
            Ok(()) => self.last_saved = Some(snapshot),
            Err(e) => warn!("Failed to persist control entities: {}", e),
        }
    }
}

impl EngineHandle {
    /// Get a snapshot of the current engine state.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.store.snapshot()
    }

    /// Write an entity and wait until every dimmer has reacted to it.
    pub async fn set_state(
        &self,
        entity_id: String,
        update: EntityUpdate,
    ) -> Result<(), ServiceError> {
        let (done, wait) = oneshot::channel();
        self.message_tx
            .send(Message::SetState {
                entity_id,
                update,
                done: Some(done),
            })
            .map_err(|_| ServiceError::EngineStopped)?;
        wait.await.map_err(|_| ServiceError::EngineStopped)
    }

    /// Run a service and return the devices it applied to.
    pub async fn call_service(&self, call: ServiceCall) -> Result<Vec<String>, ServiceError> {
        let (reply, wait) = oneshot::channel();
        self.message_tx
            .send(Message::Service { call, reply })
            .map_err(|_| ServiceError::EngineStopped)?;
        wait.await.map_err(|_| ServiceError::EngineStopped)?
    }

    /// Signal that the environment is up.
    pub fn ready(&self) -> Result<(), ServiceError> {
        self.message_tx
            .send(Message::Ready)
            .map_err(|_| ServiceError::EngineStopped)
    }
}

/// Initial entity state: control entities at their configured defaults and
/// every referenced entity present, off.
fn seed(config: &Config, clock: &dyn Clock) -> State {
    let now = clock.now();
    let mut state = State::default();

    for (device_id, dimmer) in &config.dimmers {
        seed_dimmer(&mut state, &ControlIds::new(device_id), dimmer, now);
    }

    state
}

fn seed_dimmer(
    state: &mut State,
    ids: &ControlIds,
    dimmer: &DimmerConfig,
    now: DateTime<Utc>,
) {
    let defaults = &dimmer.defaults;
    for (id, value) in [
        (ids.brightness_min(), defaults.brightness_min),
        (ids.trigger_interval(), defaults.trigger_interval as f64),
        (ids.extension_max(), defaults.extension_max as f64),
        (ids.manual_override(), defaults.manual_override as f64),
        (ids.prediction_secs(), defaults.prediction_secs as f64),
        (ids.prediction_brightness(), defaults.prediction_brightness),
    ] {
        state.numbers.insert(id, NumberState { value });
    }

    state.switches.insert(ids.control(), SwitchState { on: true });
    state
        .datetimes
        .insert(ids.disabled_until(), DateTimeState::from_datetime(now));
    state.timers.insert(ids.timer(), TimerRecord::idle(now));

    for segment in &dimmer.segments {
        state.numbers.insert(
            ids.segment_seconds(&segment.slug),
            NumberState {
                value: segment.seconds as f64,
            },
        );
        state.lights.insert(
            ids.segment_light(&segment.slug),
            LightState {
                on: segment.enabled,
                brightness: Some(pct_to_brightness(segment.brightness)),
                color_mode: segment.color_mode,
                color_temp: segment.color_temp,
                rgb_color: segment.rgb_color,
            },
        );
    }

    let options: Vec<String> = dimmer.segments.iter().map(|s| s.name.clone()).collect();
    let select = state.selects.entry(dimmer.select.clone()).or_insert_with(|| SelectState {
        option: options.first().cloned().unwrap_or_default(),
        options: Vec::new(),
    });
    for option in options {
        if !select.options.contains(&option) {
            select.options.push(option);
        }
    }

    state.lights.entry(dimmer.dimmer.clone()).or_default();
    for sensor in dimmer.triggers.iter().chain(&dimmer.predictors) {
        state
            .binary_sensors
            .entry(sensor.clone())
            .or_default();
    }
    if let Some(script) = &dimmer.script {
        state.scripts.entry(script.clone()).or_default();
    }
}
