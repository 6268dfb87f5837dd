use std::{fmt, net::Ipv4Addr, time::Duration};

use log::{info, warn};
use thiserror::Error;

use crate::{
    config::{NetworkConfig, WifiRetryPolicy},
    error::NetworkConnectError,
    wait::{pause, wait_until, CancelToken, WaitOutcome},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StationError(pub String);

/// Addressing assigned to the station once associated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub ip: Ipv4Addr,
    pub netmask: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    pub dns: Option<Ipv4Addr>,
}

impl fmt::Display for NetworkInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt(addr: Option<Ipv4Addr>) -> String {
            addr.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string())
        }

        write!(
            f,
            "ip={} netmask={} gateway={} dns={}",
            self.ip,
            opt(self.netmask),
            opt(self.gateway),
            opt(self.dns)
        )
    }
}

pub fn netmask_from_prefix(prefix: u8) -> Ipv4Addr {
    let bits = match prefix.min(32) {
        0 => 0,
        len => u32::MAX << (32 - u32::from(len)),
    };
    Ipv4Addr::from(bits)
}

/// Station-mode Wi-Fi interface.
pub trait Station {
    fn activate(&mut self) -> Result<(), StationError>;
    fn is_connected(&mut self) -> Result<bool, StationError>;
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), StationError>;
    fn local_config(&mut self) -> Result<NetworkInfo, StationError>;

    /// Abandons an association still in progress before `connect` is retried.
    fn disconnect(&mut self) -> Result<(), StationError> {
        Ok(())
    }
}

fn station_error(err: StationError) -> NetworkConnectError {
    NetworkConnectError::Station(err.0)
}

pub fn bring_up<N, S>(
    station: &mut N,
    network: &NetworkConfig,
    policy: &WifiRetryPolicy,
    cancel: &CancelToken,
    sleep: &mut S,
) -> Result<NetworkInfo, NetworkConnectError>
where
    N: Station + ?Sized,
    S: FnMut(Duration),
{
    station.activate().map_err(station_error)?;

    if !station.is_connected().map_err(station_error)? {
        info!("connecting to wifi `{}`", network.wifi_ssid);

        let poll = Duration::from_millis(policy.poll_interval_ms);
        let timeout = policy.attempt_timeout_ms.map(Duration::from_millis);
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            match policy.max_attempts {
                Some(max) => info!("wifi connect attempt {attempt}/{max}"),
                None => info!("wifi connect attempt {attempt}"),
            }

            let outcome = match station.connect(&network.wifi_ssid, &network.wifi_pass) {
                Ok(()) => wait_until(|| station.is_connected(), poll, timeout, cancel, sleep)
                    .map_err(station_error)?,
                Err(err) => {
                    warn!("wifi connect failed on attempt {attempt}: {err}");
                    if pause(poll, cancel, sleep) {
                        WaitOutcome::TimedOut
                    } else {
                        WaitOutcome::Cancelled
                    }
                }
            };

            match outcome {
                WaitOutcome::Ready => {
                    info!("wifi associated on attempt {attempt}");
                    break;
                }
                WaitOutcome::Cancelled => return Err(NetworkConnectError::Cancelled),
                WaitOutcome::TimedOut => {
                    if policy.max_attempts.is_some_and(|max| attempt >= max) {
                        warn!("all {attempt} wifi connect attempt(s) failed");
                        return Err(NetworkConnectError::Exhausted { attempts: attempt });
                    }
                    warn!("wifi connect attempt {attempt} did not associate; retrying");
                    if let Err(err) = station.disconnect() {
                        warn!("wifi disconnect before retry failed: {err}");
                    }
                }
            }
        }
    }

    let info = station.local_config().map_err(station_error)?;
    info!("connected to wifi: {info}");
    Ok(info)
}
