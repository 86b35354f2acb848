use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    AirConditioning,
    Heating,
    Ventilation,
}

impl Device {
    pub const ALL: [Device; 3] = [Self::AirConditioning, Self::Heating, Self::Ventilation];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AirConditioning => "ac",
            Self::Heating => "heater",
            Self::Ventilation => "ventilation",
        }
    }

    /// Exact, case-sensitive match on the whole token.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|device| device.as_str() == token)
    }

    pub fn indicator(self) -> Indicator {
        match self {
            Self::AirConditioning => Indicator::Blue,
            Self::Heating => Indicator::Red,
            Self::Ventilation => Indicator::Green,
        }
    }
}

/// Status LED driven when a device is switched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Red,
    Green,
    Blue,
}

impl Indicator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
        }
    }
}

/// Which climate devices are currently enabled.
///
/// Air conditioning and heating are never both on in any state committed by
/// [`crate::command::apply`]; ventilation combines with either.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    #[serde(rename = "ac")]
    pub air_conditioning: bool,
    #[serde(rename = "heater")]
    pub heating: bool,
    #[serde(rename = "vent")]
    pub ventilation: bool,
}

impl DeviceState {
    pub fn with(mut self, device: Device, mode: bool) -> Self {
        match device {
            Device::AirConditioning => self.air_conditioning = mode,
            Device::Heating => self.heating = mode,
            Device::Ventilation => self.ventilation = mode,
        }
        self
    }

    pub fn is_conflicting(&self) -> bool {
        self.air_conditioning && self.heating
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TemperaturePayload {
    pub temperature: i32,
}

/// One observation pushed to temperature subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub sequence: u16,
    pub temperature: i32,
}

impl NotificationPayload {
    pub fn data(&self) -> TemperaturePayload {
        TemperaturePayload {
            temperature: self.temperature,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandAck {
    pub status: &'static str,
    pub state: DeviceState,
}

impl CommandAck {
    pub fn ok(state: DeviceState) -> Self {
        Self { status: "ok", state }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandRejection {
    pub status: &'static str,
    pub error: String,
}

impl CommandRejection {
    pub fn new(error: impl ToString) -> Self {
        Self {
            status: "error",
            error: error.to_string(),
        }
    }
}
