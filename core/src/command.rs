use thiserror::Error;

use crate::types::{Device, DeviceState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown device '{0}' (expected ac, heater or ventilation)")]
    UnknownDevice(String),
    #[error("invalid mode '{0}' (expected on or off)")]
    InvalidMode(String),
    #[error("air conditioning and heating cannot both be on")]
    ConflictingModes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRequest {
    pub device: Device,
    pub mode: bool,
}

impl CommandRequest {
    pub fn new(device: Device, mode: bool) -> Self {
        Self { device, mode }
    }

    /// Validates raw tokens. The mode is checked before the device; a missing
    /// token is reported as an empty one.
    pub fn parse(device: Option<&str>, mode: Option<&str>) -> Result<Self, CommandError> {
        let mode = parse_mode(mode.unwrap_or_default())?;
        let token = device.unwrap_or_default();
        let device =
            Device::from_token(token).ok_or_else(|| CommandError::UnknownDevice(token.to_string()))?;
        Ok(Self { device, mode })
    }
}

pub fn parse_mode(token: &str) -> Result<bool, CommandError> {
    match token {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(CommandError::InvalidMode(token.to_string())),
    }
}

/// Receives "device turned on/off" after every accepted command.
pub trait Actuator {
    fn signal(&self, device: Device, mode: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub device: Device,
    pub mode: bool,
    pub changed: bool,
    pub state: DeviceState,
}

/// Commits `request` to `state` unless the result would enable air
/// conditioning and heating together. `state` is untouched on error.
pub fn apply(state: &mut DeviceState, request: CommandRequest) -> Result<Transition, CommandError> {
    let candidate = state.with(request.device, request.mode);
    if candidate.is_conflicting() {
        return Err(CommandError::ConflictingModes);
    }

    let changed = candidate != *state;
    *state = candidate;

    Ok(Transition {
        device: request.device,
        mode: request.mode,
        changed,
        state: candidate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn conflicting_command_leaves_state_unchanged() {
        let mut state = DeviceState {
            heating: true,
            ..DeviceState::default()
        };

        let result = apply(&mut state, CommandRequest::new(Device::AirConditioning, true));

        assert_eq!(result, Err(CommandError::ConflictingModes));
        assert_eq!(
            state,
            DeviceState {
                air_conditioning: false,
                heating: true,
                ventilation: false,
            }
        );
    }

    #[test]
    fn repeated_command_is_idempotent() {
        let mut state = DeviceState::default();
        let request = CommandRequest::new(Device::Heating, true);

        let first = apply(&mut state, request).unwrap();
        let after_first = state;
        let second = apply(&mut state, request).unwrap();

        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(state, after_first);
        assert_eq!(second.state, after_first);
    }

    #[test]
    fn ventilation_combines_with_either_device() {
        let mut state = DeviceState::default();

        apply(&mut state, CommandRequest::new(Device::AirConditioning, true)).unwrap();
        apply(&mut state, CommandRequest::new(Device::Ventilation, true)).unwrap();
        assert!(state.air_conditioning && state.ventilation);

        apply(&mut state, CommandRequest::new(Device::AirConditioning, false)).unwrap();
        apply(&mut state, CommandRequest::new(Device::Heating, true)).unwrap();
        assert!(state.heating && state.ventilation);
        assert!(!state.air_conditioning);
    }

    #[test]
    fn switching_off_never_conflicts() {
        let mut state = DeviceState {
            heating: true,
            ..DeviceState::default()
        };

        let transition =
            apply(&mut state, CommandRequest::new(Device::AirConditioning, false)).unwrap();

        assert!(!transition.changed);
        assert!(state.heating);
    }

    #[test]
    fn invariant_holds_across_every_command_sequence() {
        let requests: Vec<CommandRequest> = Device::ALL
            .into_iter()
            .flat_map(|device| [true, false].map(|mode| CommandRequest::new(device, mode)))
            .collect();

        // Every sequence of three commands from the all-off state.
        for a in &requests {
            for b in &requests {
                for c in &requests {
                    let mut state = DeviceState::default();
                    for request in [a, b, c] {
                        let _ = apply(&mut state, *request);
                        assert!(!state.is_conflicting(), "reached {state:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn parses_mode_tokens() {
        assert_eq!(parse_mode("on"), Ok(true));
        assert_eq!(parse_mode("off"), Ok(false));
        assert_eq!(parse_mode("ON"), Err(CommandError::InvalidMode("ON".into())));
        assert_eq!(parse_mode("OFF"), Err(CommandError::InvalidMode("OFF".into())));
        assert_eq!(parse_mode("o"), Err(CommandError::InvalidMode("o".into())));
        assert_eq!(parse_mode("onn"), Err(CommandError::InvalidMode("onn".into())));
        assert_eq!(parse_mode(""), Err(CommandError::InvalidMode(String::new())));
    }

    #[test]
    fn unknown_device_is_rejected() {
        assert_eq!(
            CommandRequest::parse(Some("FOO"), Some("on")),
            Err(CommandError::UnknownDevice("FOO".into()))
        );
        assert_eq!(
            CommandRequest::parse(None, Some("on")),
            Err(CommandError::UnknownDevice(String::new()))
        );
    }

    #[test]
    fn mode_is_validated_before_device() {
        assert_eq!(
            CommandRequest::parse(Some("FOO"), Some("maybe")),
            Err(CommandError::InvalidMode("maybe".into()))
        );
        assert_eq!(
            CommandRequest::parse(Some("ac"), None),
            Err(CommandError::InvalidMode(String::new()))
        );
    }

    #[test]
    fn uppercase_tokens_are_rejected() {
        assert_eq!(
            CommandRequest::parse(Some("HEATER"), Some("OFF")),
            Err(CommandError::InvalidMode("OFF".into()))
        );
        assert_eq!(
            CommandRequest::parse(Some("HEATER"), Some("off")),
            Err(CommandError::UnknownDevice("HEATER".into()))
        );
    }

    #[test]
    fn parses_valid_request() {
        assert_eq!(
            CommandRequest::parse(Some("heater"), Some("on")),
            Ok(CommandRequest::new(Device::Heating, true))
        );
    }
}
