use motion_dimmer::MotionDimmer;
use tracing::info;

use super::message::Service;
use super::message::ServiceCall;
use super::port::HostPort;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("no device_id or entity_id given")]
    NoTarget,

    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    #[error("entity '{0}' does not belong to a motion dimmer")]
    UnknownEntity(String),

    #[error("event loop stopped")]
    EngineStopped,
}

/// Run a service on one dimmer. Returns whether anything changed.
pub fn apply(dimmer: &mut MotionDimmer<HostPort>, call: &ServiceCall) -> bool {
    let device_id = dimmer.port().device_id().to_string();
    info!("{} on {}", call.service, device_id);

    match call.service {
        Service::TemporarilyDisable => dimmer.temporarily_disable(call.duration),
        Service::Enable => {
            dimmer.enable();
            true
        }
        Service::FinishTimer => {
            dimmer.finish_timer();
            true
        }
    }
}

