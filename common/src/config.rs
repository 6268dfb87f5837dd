use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const PLACEHOLDER: &str = "CHANGE_ME";
pub const DEFAULT_LIGHT_API_URL: &str = "https://api.blinkstick.com/v1/devices";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerConfig {
    pub solar_threshold_v: f32,
    pub battery_threshold_v: f32,
    pub adc_max_raw: u16,
    pub adc_vref_v: f32,
    pub poll_interval_ms: u64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            solar_threshold_v: 5.0,
            battery_threshold_v: 3.6,
            adc_max_raw: 4095,
            adc_vref_v: 3.3,
            poll_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightApiConfig {
    pub api_base_url: String,
    pub device_id: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

impl Default for LightApiConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_LIGHT_API_URL.to_string(),
            device_id: String::new(),
            api_key: String::new(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Station association policy.
///
/// `max_attempts: None` never gives up; each attempt re-issues `connect` once
/// `attempt_timeout_ms` elapses. With `attempt_timeout_ms: None` a single attempt
/// polls forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiRetryPolicy {
    pub poll_interval_ms: u64,
    pub attempt_timeout_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

impl Default for WifiRetryPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            attempt_timeout_ms: Some(30_000),
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub network: NetworkConfig,
    pub light: LightApiConfig,
    pub power: PowerConfig,
    #[serde(default)]
    pub wifi_retry: WifiRetryPolicy,
}

impl NetworkConfig {
    pub fn has_station_credentials(&self) -> bool {
        is_configured(&self.wifi_ssid)
    }
}

impl LightApiConfig {
    pub fn device_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.device_id.trim()
        )
    }
}

impl RuntimeConfig {
    /// Overlays values from `lookup` (environment variables on the host,
    /// compile-time values on the device). Empty values are treated as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = lookup("WIFI_SSID") {
            self.network.wifi_ssid = value;
        }
        if let Some(value) = lookup("WIFI_PASS") {
            self.network.wifi_pass = value;
        }
        if let Some(value) = lookup("LIGHT_API_URL") {
            self.light.api_base_url = value.trim().to_string();
        }
        if let Some(value) = lookup("LIGHT_DEVICE_ID") {
            self.light.device_id = value.trim().to_string();
        }
        if let Some(value) = lookup("LIGHT_API_KEY") {
            self.light.api_key = value.trim().to_string();
        }

        if let Some(value) = parse_override(&lookup, "LIGHT_TIMEOUT_MS") {
            self.light.request_timeout_ms = value;
        }
        if let Some(value) = parse_override(&lookup, "SOLAR_THRESHOLD_V") {
            self.power.solar_threshold_v = value;
        }
        if let Some(value) = parse_override(&lookup, "BATTERY_THRESHOLD_V") {
            self.power.battery_threshold_v = value;
        }
        if let Some(value) = parse_override(&lookup, "ADC_MAX_RAW") {
            self.power.adc_max_raw = value;
        }
        if let Some(value) = parse_override(&lookup, "ADC_VREF_V") {
            self.power.adc_vref_v = value;
        }
        if let Some(value) = parse_override(&lookup, "POLL_INTERVAL_MS") {
            self.power.poll_interval_ms = value;
        }
        if let Some(value) = parse_override(&lookup, "WIFI_POLL_MS") {
            self.wifi_retry.poll_interval_ms = value;
        }
        // 0 selects the unbounded variant for both limits.
        if let Some(value) = parse_override::<u64, _>(&lookup, "WIFI_ATTEMPT_TIMEOUT_MS") {
            self.wifi_retry.attempt_timeout_ms = (value > 0).then_some(value);
        }
        if let Some(value) = parse_override::<u32, _>(&lookup, "WIFI_MAX_ATTEMPTS") {
            self.wifi_retry.max_attempts = (value > 0).then_some(value);
        }
    }

    pub fn sanitize(&mut self) {
        self.light.api_base_url = self.light.api_base_url.trim().trim_end_matches('/').to_string();
        self.light.device_id = self.light.device_id.trim().to_string();
        self.light.request_timeout_ms = self.light.request_timeout_ms.clamp(1_000, 120_000);

        let defaults = PowerConfig::default();
        if !self.power.solar_threshold_v.is_finite() || self.power.solar_threshold_v < 0.0 {
            self.power.solar_threshold_v = defaults.solar_threshold_v;
        }
        if !self.power.battery_threshold_v.is_finite() || self.power.battery_threshold_v < 0.0 {
            self.power.battery_threshold_v = defaults.battery_threshold_v;
        }
        if self.power.adc_max_raw == 0 {
            self.power.adc_max_raw = defaults.adc_max_raw;
        }
        if !self.power.adc_vref_v.is_finite() || self.power.adc_vref_v <= 0.0 {
            self.power.adc_vref_v = defaults.adc_vref_v;
        }
        self.power.poll_interval_ms = self.power.poll_interval_ms.max(1_000);

        self.wifi_retry.poll_interval_ms = self.wifi_retry.poll_interval_ms.clamp(100, 10_000);
        if let Some(timeout) = self.wifi_retry.attempt_timeout_ms.as_mut() {
            *timeout = (*timeout).max(self.wifi_retry.poll_interval_ms);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.light.api_base_url;
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                field: "api_base_url",
                reason: format!("`{url}` is not an http(s) URL"),
            });
        }

        if !is_configured(&self.light.device_id) {
            return Err(ConfigError::Missing("device_id"));
        }
        if self
            .light
            .device_id
            .chars()
            .any(|c| c == '/' || c.is_whitespace())
        {
            return Err(ConfigError::Invalid {
                field: "device_id",
                reason: "must be a single path segment".to_string(),
            });
        }

        if !is_configured(&self.light.api_key) {
            return Err(ConfigError::Missing("api_key"));
        }

        Ok(())
    }
}

fn is_configured(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != PLACEHOLDER
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring unparsable {key}={raw:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn configured() -> RuntimeConfig {
        let mut runtime = RuntimeConfig::default();
        runtime.light.device_id = "dev-42".to_string();
        runtime.light.api_key = "secret".to_string();
        runtime
    }

    #[test]
    fn defaults_match_reference_hardware() {
        let runtime = RuntimeConfig::default();
        assert_eq!(runtime.power.solar_threshold_v, 5.0);
        assert_eq!(runtime.power.battery_threshold_v, 3.6);
        assert_eq!(runtime.power.adc_max_raw, 4095);
        assert_eq!(runtime.power.adc_vref_v, 3.3);
        assert_eq!(runtime.power.poll_interval_ms, 60_000);
        assert_eq!(runtime.wifi_retry.poll_interval_ms, 1_000);
        assert_eq!(runtime.light.api_base_url, DEFAULT_LIGHT_API_URL);
    }

    #[test]
    fn overrides_replace_fields() {
        let mut runtime = RuntimeConfig::default();
        runtime.apply_overrides(env(&[
            ("WIFI_SSID", "garden"),
            ("LIGHT_DEVICE_ID", " dev-1 "),
            ("LIGHT_API_KEY", "k"),
            ("SOLAR_THRESHOLD_V", "4.5"),
            ("POLL_INTERVAL_MS", "15000"),
            ("WIFI_MAX_ATTEMPTS", "3"),
            ("WIFI_ATTEMPT_TIMEOUT_MS", "0"),
        ]));

        assert_eq!(runtime.network.wifi_ssid, "garden");
        assert_eq!(runtime.light.device_id, "dev-1");
        assert_eq!(runtime.power.solar_threshold_v, 4.5);
        assert_eq!(runtime.power.poll_interval_ms, 15_000);
        assert_eq!(runtime.wifi_retry.max_attempts, Some(3));
        assert_eq!(runtime.wifi_retry.attempt_timeout_ms, None);
    }

    #[test]
    fn unparsable_and_empty_overrides_are_ignored() {
        let mut runtime = RuntimeConfig::default();
        runtime.apply_overrides(env(&[
            ("BATTERY_THRESHOLD_V", "three"),
            ("LIGHT_API_KEY", "   "),
        ]));

        assert_eq!(runtime.power.battery_threshold_v, 3.6);
        assert_eq!(runtime.light.api_key, "");
    }

    #[test]
    fn device_url_joins_base_and_id() {
        let mut runtime = configured();
        runtime.light.api_base_url = "http://127.0.0.1:8080/v1/devices/".to_string();
        assert_eq!(
            runtime.light.device_url(),
            "http://127.0.0.1:8080/v1/devices/dev-42"
        );
    }

    #[test]
    fn sanitize_restores_unusable_values() {
        let mut runtime = configured();
        runtime.power.adc_max_raw = 0;
        runtime.power.adc_vref_v = f32::NAN;
        runtime.power.solar_threshold_v = -1.0;
        runtime.power.poll_interval_ms = 5;
        runtime.wifi_retry.poll_interval_ms = 0;
        runtime.wifi_retry.attempt_timeout_ms = Some(10);

        runtime.sanitize();

        assert_eq!(runtime.power.adc_max_raw, 4095);
        assert_eq!(runtime.power.adc_vref_v, 3.3);
        assert_eq!(runtime.power.solar_threshold_v, 5.0);
        assert_eq!(runtime.power.poll_interval_ms, 1_000);
        assert_eq!(runtime.wifi_retry.poll_interval_ms, 100);
        assert_eq!(runtime.wifi_retry.attempt_timeout_ms, Some(100));
    }

    #[test]
    fn validate_requires_credentials() {
        assert_eq!(
            RuntimeConfig::default().validate(),
            Err(ConfigError::Missing("device_id"))
        );

        let mut runtime = configured();
        runtime.light.api_key = PLACEHOLDER.to_string();
        assert_eq!(runtime.validate(), Err(ConfigError::Missing("api_key")));

        let mut runtime = configured();
        runtime.light.api_base_url = "ftp://example".to_string();
        assert!(matches!(
            runtime.validate(),
            Err(ConfigError::Invalid {
                field: "api_base_url",
                ..
            })
        ));

        assert_eq!(configured().validate(), Ok(()));
    }

    #[test]
    fn placeholder_ssid_is_not_a_credential() {
        let mut network = NetworkConfig::default();
        assert!(!network.has_station_credentials());
        network.wifi_ssid = PLACEHOLDER.to_string();
        assert!(!network.has_station_credentials());
        network.wifi_ssid = "garden".to_string();
        assert!(network.has_station_credentials());
    }
}
