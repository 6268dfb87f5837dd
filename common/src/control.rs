use std::time::Duration;

use log::{info, warn};

use crate::{
    config::{NetworkConfig, WifiRetryPolicy},
    error::{LightControlError, NetworkConnectError, SensorReadError},
    light::{HttpTransport, LightController},
    network::{bring_up, NetworkInfo, Station},
    policy::PowerPolicy,
    types::{PowerDecision, VoltageReadings},
    voltage::{AnalogChannel, VoltageReader},
    wait::{pause, CancelToken},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected(NetworkInfo),
    /// Bring-up gave up; cycles keep sampling but send nothing.
    LocalOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    Applied {
        readings: VoltageReadings,
        decision: PowerDecision,
    },
    LightFailed {
        readings: VoltageReadings,
        decision: PowerDecision,
        error: LightControlError,
    },
    Offline {
        readings: VoltageReadings,
        decision: PowerDecision,
    },
    SensorFault(SensorReadError),
}

pub struct ControlLoop<S, B, T> {
    solar: VoltageReader<S>,
    battery: VoltageReader<B>,
    policy: PowerPolicy,
    light: LightController<T>,
    poll_interval: Duration,
    link: LinkState,
}

impl<S, B, T> ControlLoop<S, B, T>
where
    S: AnalogChannel,
    B: AnalogChannel,
    T: HttpTransport,
{
    pub fn new(
        solar: VoltageReader<S>,
        battery: VoltageReader<B>,
        policy: PowerPolicy,
        light: LightController<T>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            solar,
            battery,
            policy,
            light,
            poll_interval,
            link: LinkState::Disconnected,
        }
    }

    pub fn link(&self) -> &LinkState {
        &self.link
    }

    pub fn light(&self) -> &LightController<T> {
        &self.light
    }

    /// One-time network bring-up. `Connected` is terminal; exhausting the
    /// retry policy drops into `LocalOnly` instead of failing.
    pub fn connect<N, F>(
        &mut self,
        station: &mut N,
        network: &NetworkConfig,
        retry: &WifiRetryPolicy,
        cancel: &CancelToken,
        sleep: &mut F,
    ) -> Result<&LinkState, NetworkConnectError>
    where
        N: Station + ?Sized,
        F: FnMut(Duration),
    {
        if matches!(self.link, LinkState::Connected(_)) {
            return Ok(&self.link);
        }

        match bring_up(station, network, retry, cancel, sleep) {
            Ok(info) => self.link = LinkState::Connected(info),
            Err(NetworkConnectError::Exhausted { attempts }) => {
                warn!("wifi unavailable after {attempts} attempt(s); running in local-only mode");
                self.link = LinkState::LocalOnly;
            }
            Err(err) => return Err(err),
        }
        Ok(&self.link)
    }

    pub fn read_voltages(&mut self) -> Result<VoltageReadings, SensorReadError> {
        Ok(VoltageReadings {
            solar_v: self.solar.read_voltage()?,
            battery_v: self.battery.read_voltage()?,
        })
    }

    /// Sample, decide and (when connected) command the light. The command is
    /// sent every cycle, whether or not the desired state changed.
    pub fn run_cycle(&mut self) -> CycleReport {
        let readings = match self.read_voltages() {
            Ok(readings) => readings,
            Err(err) => {
                warn!("sensor read failed, skipping cycle: {err}");
                return CycleReport::SensorFault(err);
            }
        };

        info!(
            "Solar voltage: {:.2} V, Battery voltage: {:.2} V",
            readings.solar_v, readings.battery_v
        );

        let decision = self.policy.evaluate(readings.solar_v, readings.battery_v);
        info!(
            "{}; turning light {}",
            decision.source.describe(),
            decision.state
        );

        if !matches!(self.link, LinkState::Connected(_)) {
            info!("network unavailable; light command not sent");
            return CycleReport::Offline { readings, decision };
        }

        match self.light.set_light(decision.state) {
            Ok(()) => {
                info!("light turned {}", decision.state);
                CycleReport::Applied { readings, decision }
            }
            Err(error) => {
                warn!("error controlling light: {error}");
                CycleReport::LightFailed {
                    readings,
                    decision,
                    error,
                }
            }
        }
    }

    /// Runs cycles separated by the poll interval until `cancel` fires.
    /// Returns the number of completed cycles.
    pub fn run<F>(&mut self, cancel: &CancelToken, sleep: &mut F) -> u64
    where
        F: FnMut(Duration),
    {
        let mut cycles: u64 = 0;
        while !cancel.is_cancelled() {
            self.run_cycle();
            cycles = cycles.saturating_add(1);
            if !pause(self.poll_interval, cancel, sleep) {
                break;
            }
        }
        info!("control loop stopped after {cycles} cycle(s)");
        cycles
    }
}
