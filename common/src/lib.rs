pub mod config;
pub mod control;
pub mod error;
pub mod light;
pub mod network;
pub mod policy;
pub mod types;
pub mod voltage;
pub mod wait;

pub use config::{LightApiConfig, NetworkConfig, PowerConfig, RuntimeConfig, WifiRetryPolicy};
pub use control::{ControlLoop, CycleReport, LinkState};
pub use error::{ConfigError, LightControlError, NetworkConnectError, SensorReadError};
pub use light::{HttpTransport, LightController, LightRequest, TransportError};
pub use network::{bring_up, NetworkInfo, Station, StationError};
pub use policy::PowerPolicy;
pub use types::{LightCommand, PowerDecision, PowerSource, PowerState, VoltageReadings};
pub use voltage::{AdcCalibration, AnalogChannel, VoltageReader};
pub use wait::{CancelToken, WaitOutcome};
