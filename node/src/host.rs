use std::{
    net::{IpAddr, Ipv4Addr, UdpSocket},
    time::Duration,
};

use anyhow::Context;
use tracing::{info, warn};

use hybrid_light_common::{
    AdcCalibration, AnalogChannel, CancelToken, ControlLoop, HttpTransport, LightController,
    LightRequest, NetworkConnectError, NetworkInfo, PowerPolicy, RuntimeConfig, SensorReadError,
    Station, StationError, TransportError, VoltageReader,
};

// Rough day/night curves in raw counts, one step per cycle.
const SOLAR_SWEEP: &[u16] = &[0, 400, 1_200, 2_600, 4_095, 4_095, 2_600, 1_200, 400, 0];
const BATTERY_SWEEP: &[u16] = &[3_900, 3_850, 3_800, 3_900, 4_000, 4_095, 4_050, 3_950];

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let runtime = load_runtime_config()?;
    info!(
        "light node starting (device `{}`, poll every {} ms)",
        runtime.light.device_id, runtime.power.poll_interval_ms
    );

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                cancel.cancel();
            }
        });
    }

    let cycles = tokio::task::spawn_blocking(move || run_blocking(runtime, cancel))
        .await
        .context("control loop task failed")??;

    info!("light node stopped after {cycles} cycle(s)");
    Ok(())
}

fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let mut runtime = RuntimeConfig::default();
    runtime.apply_overrides(|key| std::env::var(key).ok());
    if runtime.network.wifi_ssid.is_empty() {
        runtime.network.wifi_ssid = "host-network".to_string();
    }
    runtime.sanitize();
    runtime
        .validate()
        .context("light api configuration is incomplete (set LIGHT_DEVICE_ID and LIGHT_API_KEY)")?;
    Ok(runtime)
}

fn run_blocking(runtime: RuntimeConfig, cancel: CancelToken) -> anyhow::Result<u64> {
    let calibration = AdcCalibration::from(&runtime.power);
    let solar = SimulatedChannel::from_env("SOLAR_RAW", SOLAR_SWEEP);
    let battery = SimulatedChannel::from_env("BATTERY_RAW", BATTERY_SWEEP);

    let mut control = ControlLoop::new(
        VoltageReader::new(solar, calibration),
        VoltageReader::new(battery, calibration),
        PowerPolicy::from(&runtime.power),
        LightController::new(UreqTransport, &runtime.light),
        Duration::from_millis(runtime.power.poll_interval_ms),
    );

    let mut sleep = std::thread::sleep;
    let mut station = HostStation::default();
    match control.connect(
        &mut station,
        &runtime.network,
        &runtime.wifi_retry,
        &cancel,
        &mut sleep,
    ) {
        Ok(link) => info!("link state: {link:?}"),
        Err(NetworkConnectError::Cancelled) => return Ok(0),
        Err(err) => return Err(err).context("network bring-up failed"),
    }

    Ok(control.run(&cancel, &mut sleep))
}

/// Stands in for an ADC channel on the host. `SOLAR_RAW` / `BATTERY_RAW` pin
/// a fixed sample, otherwise the channel walks a canned sweep.
struct SimulatedChannel {
    fixed: Option<u16>,
    sweep: &'static [u16],
    tick: usize,
}

impl SimulatedChannel {
    fn from_env(key: &str, sweep: &'static [u16]) -> Self {
        let fixed = pinned_sample(key, std::env::var(key).ok());
        if let Some(raw) = fixed {
            info!("{key} pinned to raw sample {raw}");
        }
        Self {
            fixed,
            sweep,
            tick: 0,
        }
    }
}

fn pinned_sample(key: &str, value: Option<String>) -> Option<u16> {
    let raw = value?;
    match raw.trim().parse::<u16>() {
        Ok(sample) => Some(sample),
        Err(_) => {
            warn!("ignoring unparsable {key}={raw:?}; using simulated sweep");
            None
        }
    }
}

impl AnalogChannel for SimulatedChannel {
    fn read_raw(&mut self) -> Result<u16, SensorReadError> {
        if let Some(raw) = self.fixed {
            return Ok(raw);
        }
        let raw = self
            .sweep
            .get(self.tick % self.sweep.len().max(1))
            .copied()
            .ok_or_else(|| SensorReadError::Hardware("empty simulation sweep".to_string()))?;
        self.tick = self.tick.wrapping_add(1);
        Ok(raw)
    }
}

/// The host is already online; association is immediate.
#[derive(Default)]
struct HostStation {
    associated: bool,
}

impl Station for HostStation {
    fn activate(&mut self) -> Result<(), StationError> {
        Ok(())
    }

    fn is_connected(&mut self) -> Result<bool, StationError> {
        Ok(self.associated)
    }

    fn connect(&mut self, ssid: &str, _password: &str) -> Result<(), StationError> {
        info!("host network stands in for wifi `{ssid}`");
        self.associated = true;
        Ok(())
    }

    fn local_config(&mut self) -> Result<NetworkInfo, StationError> {
        let ip = local_ipv4().unwrap_or_else(|| {
            warn!("could not determine local address; reporting loopback");
            Ipv4Addr::LOCALHOST
        });
        Ok(NetworkInfo {
            ip,
            netmask: None,
            gateway: None,
            dns: None,
        })
    }
}

fn local_ipv4() -> Option<Ipv4Addr> {
    // A UDP connect only selects a route; nothing is sent.
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(_) => None,
    }
}

/// Blocking HTTP transport; a fresh agent per request.
struct UreqTransport;

impl HttpTransport for UreqTransport {
    fn put(&mut self, request: &LightRequest) -> Result<u16, TransportError> {
        let agent = ureq::AgentBuilder::new()
            .timeout(request.timeout)
            .redirects(0)
            .build();

        let mut call = agent.put(&request.url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        match call.send_bytes(&request.body) {
            Ok(response) => Ok(response.status()),
            Err(ureq::Error::Status(code, _)) => Ok(code),
            Err(ureq::Error::Transport(err)) => Err(TransportError(err.to_string())),
        }
    }
}
