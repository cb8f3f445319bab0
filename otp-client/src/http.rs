use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use otp_core::{
    Device, DeviceAuthorization, DeviceKey, DeviceRegistration, DeviceRegistrationRequest,
    DeviceSnapshot, DeviceToggle, LogEntry, LogList, NewDevice, NewUser, ServiceInfo, TotpAttempt,
    TotpVerdict, User, UserList, UserStatusChange,
};

use crate::{ApiError, OtpApi, QrImage};

/// HTTP verb used to flip a device's `enabled` flag.
///
/// Deployments disagree on this: older servers expose `PUT /devices/{id}`,
/// newer ones `PATCH /devices/{name}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateVerb {
    #[default]
    Patch,
    Put,
}

/// [`OtpApi`] over HTTP/JSON.
///
/// `base_url` points at the API prefix, e.g. `https://otp.example.com/api`.
pub struct HttpApi {
    http: reqwest::Client,
    base_url: Url,
    update_verb: UpdateVerb,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut url =
            Url::parse(base_url).map_err(|e| ApiError::BaseUrl(format!("{base_url}: {e}")))?;

        match url.path_segments_mut() {
            Ok(mut segments) => {
                segments.pop_if_empty();
            }
            Err(()) => return Err(ApiError::BaseUrl(format!("{base_url}: not a base URL"))),
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: url,
            update_verb: UpdateVerb::default(),
        })
    }

    pub fn with_update_verb(mut self, verb: UpdateVerb) -> Self {
        self.update_verb = verb;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base_url}/{segments...}` with every segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    fn device_endpoint(&self, key: &DeviceKey) -> Url {
        let key = key.to_string();
        self.endpoint(&["devices", &key])
    }

    /// Map non-2xx responses to [`ApiError::Server`].
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::server(status.as_u16(), error_message(status, &body)))
    }

    async fn parse<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R, ApiError> {
        let resp = Self::check(resp).await?;
        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(format!("response body: {e}")))
    }

    /// Like [`Self::parse`], but a 4xx answer whose JSON body carries
    /// `marker` is a regular answer rather than an error.
    async fn parse_verdict<R: DeserializeOwned>(
        resp: reqwest::Response,
        marker: &str,
    ) -> Result<R, ApiError> {
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let verdict = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .filter(|value| status.is_client_error() && value.get(marker).is_some());
            return match verdict {
                Some(value) => serde_json::from_value(value)
                    .map_err(|e| ApiError::Decode(format!("response body: {e}"))),
                None => Err(ApiError::server(status.as_u16(), error_message(status, &body))),
            };
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Decode(format!("response body: {e}")))
    }
}

/// Human-readable reason for a failed request.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["message", "error"] {
            if let Some(text) = value.get(field).and_then(|v| v.as_str()) {
                return text.to_owned();
            }
        }
    }

    let body = body.trim();
    if !body.is_empty() {
        return body.to_owned();
    }

    status.canonical_reason().unwrap_or("unknown error").to_owned()
}

#[derive(Deserialize)]
struct CreatedDevice {
    device: Device,
}

#[async_trait]
impl OtpApi for HttpApi {
    async fn list_devices(&self) -> Result<DeviceSnapshot, ApiError> {
        let url = self.endpoint(&["devices"]);
        debug!(%url, "GET");
        let resp = self.http.get(url).send().await?;
        Self::parse(resp).await
    }

    async fn create_device(&self, device: &NewDevice) -> Result<Option<Device>, ApiError> {
        let url = self.endpoint(&["devices"]);
        debug!(%url, name = %device.name, "POST");
        let resp = self.http.post(url).json(device).send().await?;
        let resp = Self::check(resp).await?;

        // The echo is informational; a body we cannot read is not a failure.
        let body = resp.bytes().await?;
        let echoed = serde_json::from_slice::<Device>(&body)
            .ok()
            .or_else(|| serde_json::from_slice::<CreatedDevice>(&body).ok().map(|c| c.device));
        Ok(echoed)
    }

    async fn set_device_enabled(&self, key: &DeviceKey, enabled: bool) -> Result<(), ApiError> {
        let url = self.device_endpoint(key);
        let body = DeviceToggle { enabled };
        let req = match self.update_verb {
            UpdateVerb::Patch => self.http.patch(url.clone()),
            UpdateVerb::Put => self.http.put(url.clone()),
        };
        debug!(%url, verb = ?self.update_verb, enabled, "update device");
        let resp = req.json(&body).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn delete_device(&self, key: &DeviceKey) -> Result<(), ApiError> {
        let url = self.device_endpoint(key);
        debug!(%url, "DELETE");
        let resp = self.http.delete(url).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn register_device(&self, name: &str) -> Result<DeviceRegistration, ApiError> {
        let url = self.endpoint(&["devices", "register"]);
        debug!(%url, name, "POST");
        let body = DeviceRegistrationRequest {
            device_name: name.to_owned(),
        };
        let resp = self.http.post(url).json(&body).send().await?;
        Self::parse(resp).await
    }

    async fn device_status(&self, name: &str) -> Result<DeviceAuthorization, ApiError> {
        let url = self.endpoint(&["devices", name, "status"]);
        debug!(%url, "GET");
        let resp = self.http.get(url).send().await?;
        Self::parse_verdict(resp, "authorized").await
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let url = self.endpoint(&["users"]);
        debug!(%url, "GET");
        let resp = self.http.get(url).send().await?;
        let list: UserList = Self::parse(resp).await?;
        Ok(list.users)
    }

    async fn create_user(&self, user: &NewUser) -> Result<(), ApiError> {
        let url = self.endpoint(&["users"]);
        debug!(%url, user_id = %user.user_id, "POST");
        let resp = self.http.post(url).json(user).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn set_user_status(&self, user_id: &str, enabled: bool) -> Result<(), ApiError> {
        let url = self.endpoint(&["users", user_id]);
        debug!(%url, enabled, "PATCH");
        let body = UserStatusChange {
            status_user: enabled,
        };
        let resp = self.http.patch(url).json(&body).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn user_qr(&self, user_id: &str) -> Result<QrImage, ApiError> {
        let url = self.endpoint(&["users", user_id, "qr"]);
        debug!(%url, "GET");
        let resp = self.http.get(url).send().await?;
        let resp = Self::check(resp).await?;
        let body = resp.bytes().await?;
        Ok(QrImage::decode(&body)?)
    }

    async fn list_logs(&self, limit: Option<u32>) -> Result<Vec<LogEntry>, ApiError> {
        let mut url = self.endpoint(&["logs"]);
        if let Some(limit) = limit {
            url.query_pairs_mut().append_pair("limit", &limit.to_string());
        }
        debug!(%url, "GET");
        let resp = self.http.get(url).send().await?;
        let list: LogList = Self::parse(resp).await?;
        Ok(list.logs)
    }

    async fn validate_totp(&self, attempt: &TotpAttempt) -> Result<TotpVerdict, ApiError> {
        let url = self.endpoint(&["validate_totp"]);
        debug!(%url, user_id = %attempt.user_id, device = %attempt.device_name, "POST");
        let resp = self.http.post(url).json(attempt).send().await?;
        Self::parse_verdict(resp, "valid").await
    }

    async fn service_info(&self) -> Result<ServiceInfo, ApiError> {
        let url = self
            .base_url
            .join("./")
            .map_err(|e| ApiError::BaseUrl(e.to_string()))?;
        debug!(%url, "GET");
        let resp = self.http.get(url).send().await?;
        Self::parse(resp).await
    }
}

#[cfg(test)]
mod tests {
    use otp_core::RecordId;

    use super::*;

    fn api(base: &str) -> HttpApi {
        HttpApi::new(base, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn endpoints_are_joined_under_the_base_path() {
        let api = api("https://otp.example.com/api/");
        assert_eq!(api.base_url().as_str(), "https://otp.example.com/api");
        assert_eq!(
            api.endpoint(&["devices"]).as_str(),
            "https://otp.example.com/api/devices"
        );
        assert_eq!(
            api.endpoint(&["users", "u1", "qr"]).as_str(),
            "https://otp.example.com/api/users/u1/qr"
        );
    }

    #[test]
    fn device_keys_are_percent_encoded() {
        let api = api("http://localhost:5000/api");
        let by_name = api.device_endpoint(&DeviceKey::Name("Sala 2/B".into()));
        assert_eq!(by_name.as_str(), "http://localhost:5000/api/devices/Sala%202%2FB");

        let by_id = api.device_endpoint(&DeviceKey::Id(RecordId::Int(7)));
        assert_eq!(by_id.as_str(), "http://localhost:5000/api/devices/7");
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(matches!(
            HttpApi::new("not a url", Duration::from_secs(1)),
            Err(ApiError::BaseUrl(_))
        ));
        assert!(matches!(
            HttpApi::new("mailto:admin@example.com", Duration::from_secs(1)),
            Err(ApiError::BaseUrl(_))
        ));
    }

    #[test]
    fn error_message_prefers_json_fields() {
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, r#"{"message":"Usuario no encontrado"}"#),
            "Usuario no encontrado"
        );
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"db down"}"#),
            "db down"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream"), "upstream");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
    }
}
