use std::time::Duration;

use thiserror::Error;

use crate::{
    config::LightApiConfig,
    error::LightControlError,
    types::{LightCommand, PowerState},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// A fully built `PUT` against the light API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

impl LightRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Sends a request and reports the HTTP status code.
///
/// Implementations open a fresh connection per call; nothing is pooled.
pub trait HttpTransport {
    fn put(&mut self, request: &LightRequest) -> Result<u16, TransportError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &mut T {
    fn put(&mut self, request: &LightRequest) -> Result<u16, TransportError> {
        (**self).put(request)
    }
}

pub struct LightController<T> {
    transport: T,
    url: String,
    api_key: String,
    timeout: Duration,
}

impl<T: HttpTransport> LightController<T> {
    pub fn new(transport: T, api: &LightApiConfig) -> Self {
        Self {
            transport,
            url: api.device_url(),
            api_key: api.api_key.clone(),
            timeout: Duration::from_millis(api.request_timeout_ms),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn build_request(&self, state: PowerState) -> Result<LightRequest, LightControlError> {
        let body = serde_json::to_vec(&LightCommand { state })
            .map_err(|err| LightControlError::Encode(err.to_string()))?;

        Ok(LightRequest {
            url: self.url.clone(),
            headers: vec![
                ("Authorization", format!("Bearer {}", self.api_key)),
                ("Content-Type", "application/json".to_string()),
            ],
            body,
            timeout: self.timeout,
        })
    }

    /// Issues exactly one request. Only HTTP 200 counts as success.
    pub fn set_light(&mut self, state: PowerState) -> Result<(), LightControlError> {
        let request = self.build_request(state)?;
        match self.transport.put(&request) {
            Ok(200) => Ok(()),
            Ok(status) => Err(LightControlError::Status(status)),
            Err(err) => Err(LightControlError::Transport(err.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct ScriptedTransport {
        response: Result<u16, TransportError>,
        sent: Vec<LightRequest>,
    }

    impl ScriptedTransport {
        fn new(response: Result<u16, TransportError>) -> Self {
            Self {
                response,
                sent: Vec::new(),
            }
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn put(&mut self, request: &LightRequest) -> Result<u16, TransportError> {
            self.sent.push(request.clone());
            self.response.clone()
        }
    }

    fn api() -> LightApiConfig {
        LightApiConfig {
            device_id: "dev-42".to_string(),
            api_key: "secret".to_string(),
            ..LightApiConfig::default()
        }
    }

    #[test]
    fn ok_on_200() {
        let mut controller = LightController::new(ScriptedTransport::new(Ok(200)), &api());
        assert_eq!(controller.set_light(PowerState::On), Ok(()));
    }

    #[test]
    fn status_error_carries_code() {
        let mut controller = LightController::new(ScriptedTransport::new(Ok(500)), &api());
        assert_eq!(
            controller.set_light(PowerState::On),
            Err(LightControlError::Status(500))
        );
    }

    #[test]
    fn non_200_success_codes_are_errors() {
        let mut controller = LightController::new(ScriptedTransport::new(Ok(204)), &api());
        assert_eq!(
            controller.set_light(PowerState::Off),
            Err(LightControlError::Status(204))
        );
    }

    #[test]
    fn transport_failure_is_distinct() {
        let transport = ScriptedTransport::new(Err(TransportError("dns lookup failed".into())));
        let mut controller = LightController::new(transport, &api());
        assert_eq!(
            controller.set_light(PowerState::Off),
            Err(LightControlError::Transport("dns lookup failed".to_string()))
        );
    }

    #[test]
    fn request_carries_url_auth_and_body() {
        let mut controller = LightController::new(ScriptedTransport::new(Ok(200)), &api());
        controller.set_light(PowerState::On).unwrap();
        controller.set_light(PowerState::Off).unwrap();

        let sent = &controller.transport().sent;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].url, "https://api.blinkstick.com/v1/devices/dev-42");
        assert_eq!(sent[0].header("authorization"), Some("Bearer secret"));
        assert_eq!(sent[0].header("Content-Type"), Some("application/json"));
        assert_eq!(sent[0].body, br#"{"state":"on"}"#.to_vec());
        assert_eq!(sent[1].body, br#"{"state":"off"}"#.to_vec());
        assert_eq!(sent[0].timeout, Duration::from_secs(10));
    }
}
