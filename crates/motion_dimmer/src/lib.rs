//! Motion-activated adaptive dimmer.
//!
//! [`MotionDimmer`] turns one light on when its triggers fire and off again
//! after a countdown that grows with how long the area stays in use. The host
//! supplies live state, settings, timers and a clock through [`DimmerPort`].

pub mod defaults;
mod engine;
pub mod extension;
pub mod port;
mod services;
pub mod types;

#[cfg(test)]
mod mock;

pub use engine::DimmerOptions;
pub use engine::MotionDimmer;
pub use engine::SegmentDisabledPolicy;
pub use port::DimmerPort;
pub use port::ServicePort;
pub use services::DisableRequest;
pub use types::ColorMode;
pub use types::DimmerStateChange;
pub use types::LightColor;
pub use types::SegmentTarget;
pub use types::TimerRecord;
pub use types::TimerStatus;
pub use types::TurnOn;
