//! Messages consumed by the event loop.

use motion_dimmer::DisableRequest;
use serde::Deserialize;
use strum::Display;
use strum::EnumString;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use super::services::ServiceError;
use super::state::EntityUpdate;
use super::state::LightState;
use super::timers::TimerKind;

pub type MessageSender = mpsc::UnboundedSender<Message>;
pub type MessageReceiver = mpsc::UnboundedReceiver<Message>;

#[derive(Debug)]
pub enum Message {
    /// Write an entity, as a device or the API would.
    SetState {
        entity_id: String,
        update: EntityUpdate,
        done: Option<oneshot::Sender<()>>,
    },

    TimerFired {
        device_id: String,
        kind: TimerKind,
        generation: u64,
    },

    Service {
        call: ServiceCall,
        reply: oneshot::Sender<Result<Vec<String>, ServiceError>>,
    },

    /// The environment is up; recover persisted timers.
    Ready,
}

/// Old and new state of a light.
#[derive(Debug, Clone, PartialEq)]
pub struct LightChange {
    pub old: Option<LightState>,
    pub new: LightState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Service {
    TemporarilyDisable,
    Enable,
    FinishTimer,
}

/// Devices a service call applies to, by device id or by any entity a
/// device owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceTarget {
    #[serde(default)]
    pub device_id: Vec<String>,
    #[serde(default)]
    pub entity_id: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCall {
    pub service: Service,
    pub target: ServiceTarget,
    /// Only used by `temporarily_disable`
    pub duration: DisableRequest,
}
