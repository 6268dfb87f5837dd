use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule of the power policy produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSource {
    Solar,
    Battery,
    Insufficient,
}

impl PowerSource {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Solar => "sufficient solar power",
            Self::Battery => "solar power insufficient, battery sufficient",
            Self::Insufficient => "insufficient power from both solar and battery",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerDecision {
    pub state: PowerState,
    pub source: PowerSource,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageReadings {
    pub solar_v: f32,
    pub battery_v: f32,
}

/// Request body understood by the light API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightCommand {
    pub state: PowerState,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn light_command_wire_format() {
        let on = serde_json::to_string(&LightCommand {
            state: PowerState::On,
        })
        .unwrap();
        let off = serde_json::to_string(&LightCommand {
            state: PowerState::Off,
        })
        .unwrap();

        assert_eq!(on, r#"{"state":"on"}"#);
        assert_eq!(off, r#"{"state":"off"}"#);
    }

    #[test]
    fn light_command_parses_lowercase_state() {
        let command: LightCommand = serde_json::from_str(r#"{"state": "off"}"#).unwrap();
        assert_eq!(command.state, PowerState::Off);
        assert!(serde_json::from_str::<LightCommand>(r#"{"state": "ON"}"#).is_err());
    }
}
