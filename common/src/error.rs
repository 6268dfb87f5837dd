use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorReadError {
    #[error("raw sample {raw} outside ADC range 0..={max}")]
    OutOfRange { raw: u16, max: u16 },
    #[error("adc read failed: {0}")]
    Hardware(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkConnectError {
    #[error("station interface error: {0}")]
    Station(String),
    #[error("wifi did not associate after {attempts} attempt(s)")]
    Exhausted { attempts: u32 },
    #[error("wifi bring-up cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LightControlError {
    #[error("light api returned HTTP {0}")]
    Status(u16),
    #[error("light api transport failure: {0}")]
    Transport(String),
    #[error("failed to encode light command: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} is not configured")]
    Missing(&'static str),
    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}
