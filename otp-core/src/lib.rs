use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a server-side record.
///
/// The OTP service hands out numeric ids for some tables and string ids
/// (UUIDs) for others, so both are accepted and displayed verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{id}"),
            RecordId::Text(id) => f.write_str(id),
        }
    }
}

/// A workstation enrolled with the OTP service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Server id, absent on deployments that key devices by name only.
    #[serde(default)]
    pub id: Option<RecordId>,
    /// Host name the device reports when authenticating.
    pub name: String,
    /// Whether the device may be used to log in. Missing means disabled.
    #[serde(default, deserialize_with = "bool_or_false")]
    pub enabled: bool,
    /// Display code stored by the server for this device.
    #[serde(default)]
    pub otp: Option<String>,
    /// Creation time as reported by the server.
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
    /// Last successful login from this device.
    #[serde(default, alias = "lastUsed")]
    pub last_used: Option<String>,
    /// Address the last login came from.
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl Device {
    /// Key used to address this device in update and delete requests.
    pub fn key(&self) -> DeviceKey {
        match &self.id {
            Some(id) => DeviceKey::Id(id.clone()),
            None => DeviceKey::Name(self.name.clone()),
        }
    }

    /// True when `needle` is this device's id or name.
    pub fn matches(&self, needle: &str) -> bool {
        self.name == needle || self.id.as_ref().is_some_and(|id| id.to_string() == needle)
    }
}

/// Path key of a device resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceKey {
    Id(RecordId),
    Name(String),
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKey::Id(id) => write!(f, "{id}"),
            DeviceKey::Name(name) => f.write_str(name),
        }
    }
}

/// A person enrolled for TOTP logins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    /// National id number. Not every listing endpoint returns it.
    #[serde(default)]
    pub cedula: Option<String>,
    /// Enabled (true) or blocked (false). Missing means blocked.
    #[serde(default, deserialize_with = "bool_or_false")]
    pub status_user: bool,
    #[serde(default)]
    pub totp_secret: Option<String>,
    #[serde(default)]
    pub totp_qr: Option<String>,
}

/// One authentication attempt recorded by the server. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, alias = "device_name")]
    pub device: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Free-text outcome, e.g. "Acceso exitoso".
    #[serde(default)]
    pub action: String,
    /// Machine-readable outcome, e.g. `login_success` or `otp_invalid`.
    #[serde(default)]
    pub log_type: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl LogEntry {
    /// Whether the entry records a granted login.
    pub fn is_success(&self) -> bool {
        if let Some(kind) = &self.log_type {
            return kind == "login_success";
        }

        self.action.to_lowercase().contains("exitos")
    }
}

/// Body of `POST /devices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDevice {
    pub name: String,
    pub otp: String,
    pub enabled: bool,
}

/// Body of a device enable/disable update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceToggle {
    pub enabled: bool,
}

/// Body of `POST /users`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub cedula: String,
}

/// Body of `PATCH /users/{user_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserStatusChange {
    pub status_user: bool,
}

/// Body of `POST /devices/register`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRegistrationRequest {
    pub device_name: String,
}

/// Body of `POST /validate_totp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotpAttempt {
    pub user_id: String,
    pub otp: String,
    pub device_name: String,
}

/// Response of `GET /devices`: devices and the recent access log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    #[serde(default, deserialize_with = "vec_or_empty")]
    pub devices: Vec<Device>,
    #[serde(default, deserialize_with = "vec_or_empty")]
    pub logs: Vec<LogEntry>,
}

/// Response of `GET /users`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserList {
    #[serde(default, deserialize_with = "vec_or_empty")]
    pub users: Vec<User>,
}

/// Response of `GET /logs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogList {
    #[serde(default, deserialize_with = "vec_or_empty")]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub count: Option<usize>,
}

/// Outcome of a TOTP validation performed by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TotpVerdict {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user: Option<VerifiedUser>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The user a successful validation was issued for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedUser {
    pub user_id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Response of `GET /devices/{name}/status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceAuthorization {
    #[serde(default)]
    pub authorized: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub device: Option<Device>,
}

/// Response of `POST /devices/register`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub device: Option<Device>,
}

/// Banner served at the service root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub security: Option<String>,
    #[serde(default)]
    pub status: String,
}

fn bool_or_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn vec_or_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
