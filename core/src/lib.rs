pub mod command;
pub mod config;
pub mod control;
pub mod model;
pub mod resources;
pub mod types;

pub use command::{Actuator, CommandError, CommandRequest, Transition};
pub use config::{ControlConfig, NetworkConfig, RuntimeConfig};
pub use control::{ControlLoop, SimulationStep, ThermostatCore, TickEvent, TickOutcome};
pub use model::{TemperatureFactors, INITIAL_TEMPERATURE_RANGE};
pub use resources::*;
pub use types::{
    CommandAck, CommandRejection, Device, DeviceState, Indicator, NotificationPayload,
    TemperaturePayload,
};
