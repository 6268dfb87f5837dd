use std::{sync::Arc, thread, time::Duration};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::Write,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
    },
    gpio::ADCPin,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    sys::{self, EspError},
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};

use hybrid_light_common::{
    network::netmask_from_prefix, AdcCalibration, AnalogChannel, CancelToken, ControlLoop,
    HttpTransport, LightController, LightRequest, NetworkInfo, PowerPolicy, RuntimeConfig,
    SensorReadError, Station, StationError, TransportError, VoltageReader,
};

const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(90);

pub fn run() -> anyhow::Result<()> {
    sys::link_patches();
    EspLogger::initialize_default();

    let runtime = load_runtime_config();
    let light_configured = match runtime.validate() {
        Ok(()) => true,
        Err(err) => {
            warn!("light api not configured ({err}); light commands disabled");
            false
        }
    };

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals {
        modem, pins, adc1, ..
    } = Peripherals::take()?;

    let adc = Arc::new(AdcDriver::new(adc1).context("failed to initialize ADC1")?);
    let channel_config = AdcChannelConfig {
        attenuation: DB_11,
        ..Default::default()
    };
    let solar = EspAdcChannel::new("solar", adc.clone(), pins.gpio34, &channel_config)?;
    let battery = EspAdcChannel::new("battery", adc, pins.gpio35, &channel_config)?;

    let calibration = AdcCalibration::from(&runtime.power);
    let mut control = ControlLoop::new(
        VoltageReader::new(solar, calibration),
        VoltageReader::new(battery, calibration),
        PowerPolicy::from(&runtime.power),
        LightController::new(EspLightTransport, &runtime.light),
        Duration::from_millis(runtime.power.poll_interval_ms),
    );

    let watchdog = TaskWatchdog::subscribe(WATCHDOG_TIMEOUT)?;
    let mut sleep = |duration: Duration| {
        watchdog.feed();
        thread::sleep(duration);
    };
    // Nothing cancels on the device; the loop ends with a reset.
    let cancel = CancelToken::new();

    let mut station =
        EspStation::new(modem, sys_loop, nvs_partition).context("wifi driver startup failed")?;

    if !runtime.network.has_station_credentials() {
        warn!("wifi credentials missing; sampling without light control");
    } else if light_configured {
        match control.connect(
            &mut station,
            &runtime.network,
            &runtime.wifi_retry,
            &cancel,
            &mut sleep,
        ) {
            Ok(link) => info!("link state: {link:?}"),
            Err(err) => warn!("wifi bring-up failed ({err}); sampling without light control"),
        }
    }

    // Keep the radio alive for the program lifetime.
    let _station = station;
    control.run(&cancel, &mut sleep);
    Ok(())
}

fn load_runtime_config() -> RuntimeConfig {
    let mut runtime = RuntimeConfig::default();
    runtime.apply_overrides(build_time_value);
    runtime.sanitize();
    runtime
}

/// Settings are baked in at build time; nothing is persisted on the device.
fn build_time_value(key: &str) -> Option<String> {
    let value = match key {
        "WIFI_SSID" => option_env!("WIFI_SSID"),
        "WIFI_PASS" => option_env!("WIFI_PASS"),
        "LIGHT_API_URL" => option_env!("LIGHT_API_URL"),
        "LIGHT_DEVICE_ID" => option_env!("LIGHT_DEVICE_ID"),
        "LIGHT_API_KEY" => option_env!("LIGHT_API_KEY"),
        "LIGHT_TIMEOUT_MS" => option_env!("LIGHT_TIMEOUT_MS"),
        "SOLAR_THRESHOLD_V" => option_env!("SOLAR_THRESHOLD_V"),
        "BATTERY_THRESHOLD_V" => option_env!("BATTERY_THRESHOLD_V"),
        "ADC_MAX_RAW" => option_env!("ADC_MAX_RAW"),
        "ADC_VREF_V" => option_env!("ADC_VREF_V"),
        "POLL_INTERVAL_MS" => option_env!("POLL_INTERVAL_MS"),
        "WIFI_POLL_MS" => option_env!("WIFI_POLL_MS"),
        "WIFI_ATTEMPT_TIMEOUT_MS" => option_env!("WIFI_ATTEMPT_TIMEOUT_MS"),
        "WIFI_MAX_ATTEMPTS" => option_env!("WIFI_MAX_ATTEMPTS"),
        _ => None,
    };
    value.map(str::to_string)
}

struct EspAdcChannel<T: ADCPin + 'static> {
    label: &'static str,
    driver: AdcChannelDriver<'static, T, Arc<AdcDriver<'static, T::Adc>>>,
}

impl<T: ADCPin + 'static> EspAdcChannel<T> {
    fn new(
        label: &'static str,
        adc: Arc<AdcDriver<'static, T::Adc>>,
        pin: T,
        config: &AdcChannelConfig,
    ) -> anyhow::Result<Self> {
        let driver = AdcChannelDriver::new(adc, pin, config)
            .with_context(|| format!("failed to configure {label} ADC channel"))?;
        info!("{label} ADC channel ready");
        Ok(Self { label, driver })
    }
}

impl<T: ADCPin + 'static> AnalogChannel for EspAdcChannel<T> {
    fn read_raw(&mut self) -> Result<u16, SensorReadError> {
        self.driver
            .read_raw()
            .map_err(|err| SensorReadError::Hardware(format!("{} channel: {err:?}", self.label)))
    }
}

struct EspStation {
    wifi: BlockingWifi<EspWifi<'static>>,
}

impl EspStation {
    fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs_partition: EspDefaultNvsPartition,
    ) -> anyhow::Result<Self> {
        let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
        let wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;
        Ok(Self { wifi })
    }

    /// Keeps the radio awake between polls.
    fn disable_power_save(&mut self) -> Result<(), EspError> {
        EspError::convert(unsafe { sys::esp_wifi_set_ps(sys::wifi_ps_type_t_WIFI_PS_NONE) })
    }
}

fn station_error(err: EspError) -> StationError {
    StationError(format!("{err:?}"))
}

impl Station for EspStation {
    fn activate(&mut self) -> Result<(), StationError> {
        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration::default()))
            .map_err(station_error)?;
        self.wifi.start().map_err(station_error)?;
        match self.disable_power_save() {
            Ok(()) => info!("wifi power save disabled"),
            Err(err) => warn!("wifi power save left enabled: {err}"),
        }
        Ok(())
    }

    fn is_connected(&mut self) -> Result<bool, StationError> {
        self.wifi.is_up().map_err(station_error)
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), StationError> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: ssid
                    .try_into()
                    .map_err(|_| StationError("wifi ssid too long".to_string()))?,
                password: password
                    .try_into()
                    .map_err(|_| StationError("wifi password too long".to_string()))?,
                auth_method,
                ..Default::default()
            }))
            .map_err(station_error)?;

        // Non-blocking; association is observed through `is_connected`.
        self.wifi.wifi_mut().connect().map_err(station_error)
    }

    fn disconnect(&mut self) -> Result<(), StationError> {
        self.wifi.wifi_mut().disconnect().map_err(station_error)
    }

    fn local_config(&mut self) -> Result<NetworkInfo, StationError> {
        let ip_info = self
            .wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .map_err(station_error)?;

        Ok(NetworkInfo {
            ip: ip_info.ip,
            netmask: Some(netmask_from_prefix(ip_info.subnet.mask.0)),
            gateway: Some(ip_info.subnet.gateway),
            dns: ip_info.dns,
        })
    }
}

/// Opens a fresh TLS connection per request.
struct EspLightTransport;

impl HttpTransport for EspLightTransport {
    fn put(&mut self, request: &LightRequest) -> Result<u16, TransportError> {
        submit_put(request).map_err(|err| TransportError(format!("{err:#}")))
    }
}

fn submit_put(request: &LightRequest) -> anyhow::Result<u16> {
    let http_conf = HttpClientConfiguration {
        timeout: Some(request.timeout),
        crt_bundle_attach: Some(sys::esp_crt_bundle_attach),
        ..Default::default()
    };
    let mut client = HttpClient::wrap(EspHttpConnection::new(&http_conf)?);

    let content_length = request.body.len().to_string();
    let mut headers: Vec<(&str, &str)> = request
        .headers
        .iter()
        .map(|(name, value)| (*name, value.as_str()))
        .collect();
    headers.push(("Content-Length", content_length.as_str()));

    let mut outgoing = client.request(Method::Put, &request.url, &headers)?;
    outgoing.write_all(&request.body)?;
    outgoing.flush()?;

    let response = outgoing.submit().map_err(|e| anyhow!("{e:?}"))?;
    Ok(response.status())
}

/// Subscription of the calling task to the ESP-IDF task watchdog.
struct TaskWatchdog;

impl TaskWatchdog {
    fn subscribe(timeout: Duration) -> anyhow::Result<Self> {
        let config = sys::esp_task_wdt_config_t {
            timeout_ms: u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX),
            idle_core_mask: 0,
            trigger_panic: true,
        };
        // INVALID_STATE: already initialized by sdkconfig, or task already subscribed.
        accept_invalid_state(unsafe { sys::esp_task_wdt_init(&config) })
            .context("task watchdog init failed")?;
        accept_invalid_state(unsafe { sys::esp_task_wdt_add(core::ptr::null_mut()) })
            .context("task watchdog subscribe failed")?;
        info!("task watchdog armed ({}s)", timeout.as_secs());
        Ok(Self)
    }

    fn feed(&self) {
        // Only fails when the task is not subscribed, which `subscribe` rules out.
        let _ = unsafe { sys::esp_task_wdt_reset() };
    }
}

fn accept_invalid_state(rc: sys::esp_err_t) -> Result<(), EspError> {
    if rc == sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    EspError::convert(rc)
}
