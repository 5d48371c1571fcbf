pub mod clock;
mod engine;
mod entity;
mod message;
mod port;
mod registry;
mod services;
pub mod state;
mod timers;

pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use engine::Engine;
pub use engine::EngineHandle;
pub use entity::slugify;
pub use entity::ControlIds;
pub use message::LightChange;
pub use message::MessageReceiver;
pub use message::MessageSender;
pub use message::Service;
pub use message::ServiceCall;
pub use message::ServiceTarget;
pub use port::HostPort;
pub use services::ServiceError;
pub use state::Applied;
pub use state::BinarySensorState;
pub use state::DateTimeState;
pub use state::EntityState;
pub use state::EntityUpdate;
pub use state::LightState;
pub use state::NumberState;
pub use state::ScriptState;
pub use state::SelectOption;
pub use state::SelectState;
pub use state::State;
pub use state::StateStore;
pub use state::SwitchState;
pub use timers::TimerKind;
