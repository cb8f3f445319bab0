//! Client side of the OTP administration API.
//!
//! [`OtpApi`] is the seam between the dashboard and the remote service.
//! [`HttpApi`] talks to a real deployment over HTTP, [`MockApi`] keeps
//! everything in memory for tests and offline demos.

pub mod error;
pub mod http;
pub mod mock;
pub mod qr;

use async_trait::async_trait;
use otp_core::{
    Device, DeviceAuthorization, DeviceKey, DeviceRegistration, DeviceSnapshot, LogEntry,
    NewDevice, NewUser, ServiceInfo, TotpAttempt, TotpVerdict, User,
};

pub use error::ApiError;
pub use http::{HttpApi, UpdateVerb};
pub use mock::MockApi;
pub use qr::{QrError, QrImage};

/// Operations offered by the OTP administration service.
///
/// Implementations own all persistence. Callers treat every returned list
/// as a fresh snapshot and never patch it locally.
#[async_trait]
pub trait OtpApi: Send + Sync + 'static {
    /// Devices together with the most recent access log.
    async fn list_devices(&self) -> Result<DeviceSnapshot, ApiError>;

    /// Create a device. The server's echo of the record is returned when it
    /// sends one.
    async fn create_device(&self, device: &NewDevice) -> Result<Option<Device>, ApiError>;

    async fn set_device_enabled(&self, key: &DeviceKey, enabled: bool) -> Result<(), ApiError>;

    async fn delete_device(&self, key: &DeviceKey) -> Result<(), ApiError>;

    /// Register a device by host name, returning the existing record when
    /// the name is already known.
    async fn register_device(&self, name: &str) -> Result<DeviceRegistration, ApiError>;

    /// Whether the named device is currently allowed to log in.
    async fn device_status(&self, name: &str) -> Result<DeviceAuthorization, ApiError>;

    async fn list_users(&self) -> Result<Vec<User>, ApiError>;

    async fn create_user(&self, user: &NewUser) -> Result<(), ApiError>;

    async fn set_user_status(&self, user_id: &str, enabled: bool) -> Result<(), ApiError>;

    /// Enrollment QR code for a user's TOTP secret.
    async fn user_qr(&self, user_id: &str) -> Result<QrImage, ApiError>;

    /// Access log, newest first. `limit` caps the number of entries.
    async fn list_logs(&self, limit: Option<u32>) -> Result<Vec<LogEntry>, ApiError>;

    /// Ask the service to check a one-time code. Rejections are verdicts,
    /// not errors.
    async fn validate_totp(&self, attempt: &TotpAttempt) -> Result<TotpVerdict, ApiError>;

    async fn service_info(&self) -> Result<ServiceInfo, ApiError>;
}
