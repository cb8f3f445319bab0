use std::sync::Arc;

use tracing::{debug, info, warn};

use otp_client::{ApiError, OtpApi, QrImage};
use otp_core::{
    Device, DeviceAuthorization, DeviceKey, DeviceRegistration, NewDevice, ServiceInfo,
    TotpAttempt, TotpVerdict,
};

use crate::error::DashboardError;
use crate::preview::PreviewCode;
use crate::state::{
    DashboardState, FormField, Outcome, Phase, RegistrationForm, Slot, Tab, ViewState,
};

/// Result of [`Dashboard::add_device`].
#[derive(Debug, Clone)]
pub struct AddedDevice {
    pub name: String,
    /// Code shown while the request was in flight.
    pub preview: PreviewCode,
    /// The record as the service stored it, when it could be found.
    pub confirmed: Option<Device>,
}

impl AddedDevice {
    /// The code the service actually stored, if known.
    pub fn confirmed_code(&self) -> Option<&str> {
        self.confirmed.as_ref().and_then(|d| d.otp.as_deref())
    }
}

/// A delete that still needs the operator's confirmation.
///
/// Only [`Dashboard::request_delete`] creates one, so nothing reaches the
/// service without passing through the prompt first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeletion {
    key: DeviceKey,
    name: String,
}

impl PendingDeletion {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prompt(&self) -> String {
        format!("⚠️ ¿Eliminar dispositivo {}? (y/n)", self.name)
    }
}

/// Controller for the admin panel.
///
/// Owns the view state and is the only thing that talks to the service.
/// Every mutation is followed by a refetch; lists are never patched locally.
pub struct Dashboard<A> {
    api: Arc<A>,
    state: DashboardState,
    log_limit: Option<u32>,
}

impl<A> Clone for Dashboard<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            state: self.state.clone(),
            log_limit: self.log_limit,
        }
    }
}

impl<A: OtpApi> Dashboard<A> {
    pub fn new(api: A, initial_tab: Tab) -> Self {
        Self {
            api: Arc::new(api),
            state: DashboardState::new(initial_tab),
            log_limit: None,
        }
    }

    /// Cap the number of entries fetched for the access log tab.
    pub fn with_log_limit(mut self, limit: Option<u32>) -> Self {
        self.log_limit = limit;
        self
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn snapshot(&self) -> ViewState {
        self.state.snapshot().await
    }

    /// Reload devices and logs, plus users when their tab is showing.
    pub async fn refresh_all(&self) -> Result<(), DashboardError> {
        let tab = self.state.active_tab().await;
        let (devices, users) = tokio::join!(self.fetch_devices(), async {
            if tab == Tab::Users {
                self.fetch_users().await
            } else {
                Ok(())
            }
        });
        devices.and(users)
    }

    /// Switch tabs and fetch whatever the new tab shows.
    pub async fn set_tab(&self, tab: Tab) -> Result<(), DashboardError> {
        self.state.update(|s| s.active_tab = tab).await;
        debug!(tab = tab.as_str(), "tab activated");

        match tab {
            Tab::Devices => self.fetch_devices().await,
            Tab::Users => self.fetch_users().await,
            Tab::Logs => self.fetch_logs().await,
            Tab::Registro => Ok(()),
        }
    }

    pub async fn set_device_draft(&self, name: impl Into<String>) {
        let name = name.into();
        self.state.update(|s| s.forms.device_name = name).await;
    }

    pub async fn set_form_field(&self, field: FormField, value: impl Into<String>) {
        let value = value.into();
        self.state
            .update(|s| s.forms.registration.set(field, value))
            .await;
    }

    pub async fn set_registration(&self, form: RegistrationForm) {
        self.state.update(|s| s.forms.registration = form).await;
    }

    /// Create an enabled device with a freshly generated six-digit code.
    pub async fn add_device(&self, name: &str) -> Result<AddedDevice, DashboardError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DashboardError::validation("Ingresa nombre de dispositivo"));
        }

        let preview = PreviewCode::generate();
        let request = NewDevice {
            name: name.to_owned(),
            otp: preview.to_string(),
            enabled: true,
        };

        self.state.update(|s| s.busy = true).await;
        let result = self.api.create_device(&request).await;
        self.state.update(|s| s.busy = false).await;

        let echoed =
            result.inspect_err(|e| warn!(device = name, error = %e, "Failed to create device"))?;
        info!(device = name, "Device created");

        self.state.update(|s| s.forms.device_name.clear()).await;
        self.refresh_after_mutation().await;

        let listed = self
            .state
            .read(|s| s.devices.items().iter().find(|d| d.name == name).cloned())
            .await;

        Ok(AddedDevice {
            name: name.to_owned(),
            preview,
            confirmed: listed.or(echoed),
        })
    }

    /// Flip a device between enabled and disabled. Returns the new value.
    pub async fn toggle_device(&self, needle: &str) -> Result<bool, DashboardError> {
        let device = self.find_device(needle).await?;
        let enabled = !device.enabled;

        self.api
            .set_device_enabled(&device.key(), enabled)
            .await
            .inspect_err(|e| warn!(device = %device.name, error = %e, "Failed to update device"))?;
        info!(device = %device.name, enabled, "Device updated");

        self.refresh_after_mutation().await;
        Ok(enabled)
    }

    /// First half of a delete: look the device up and ask for confirmation.
    pub async fn request_delete(&self, needle: &str) -> Result<PendingDeletion, DashboardError> {
        let device = self.find_device(needle).await?;
        Ok(PendingDeletion {
            key: device.key(),
            name: device.name,
        })
    }

    pub async fn confirm_delete(&self, pending: PendingDeletion) -> Result<(), DashboardError> {
        self.api
            .delete_device(&pending.key)
            .await
            .inspect_err(|e| warn!(device = %pending.name, error = %e, "Failed to delete device"))?;
        info!(device = %pending.name, "Device deleted");

        self.refresh_after_mutation().await;
        Ok(())
    }

    /// Flip a user between active and blocked. Returns the new value.
    ///
    /// Loads the users list first if it was never fetched, and always
    /// reloads it afterwards, whichever tab is showing.
    pub async fn toggle_user(&self, user_id: &str) -> Result<bool, DashboardError> {
        if self.state.read(|s| s.users.phase() == &Phase::Idle).await {
            self.fetch_users().await?;
        }

        let current = self
            .state
            .read(|s| {
                s.users
                    .items()
                    .iter()
                    .find(|u| u.user_id == user_id)
                    .map(|u| u.status_user)
            })
            .await
            .ok_or_else(|| DashboardError::UnknownUser(user_id.to_owned()))?;
        let enabled = !current;

        self.api
            .set_user_status(user_id, enabled)
            .await
            .inspect_err(|e| warn!(user_id, error = %e, "Failed to update user"))?;
        info!(user_id, enabled, "User updated");

        let (devices, users) = tokio::join!(self.fetch_devices(), self.fetch_users());
        if let Err(e) = devices.and(users) {
            warn!(error = %e, "Refresh after user update failed");
        }
        Ok(enabled)
    }

    /// Submit the registration form. Returns the new user's id.
    pub async fn register_user(&self) -> Result<String, DashboardError> {
        let request = self
            .state
            .read(|s| s.forms.registration.to_request())
            .await
            .ok_or_else(|| DashboardError::validation("Completa todos los campos"))?;

        self.state.update(|s| s.busy = true).await;
        let result = self.api.create_user(&request).await;
        self.state.update(|s| s.busy = false).await;

        result.inspect_err(
            |e| warn!(user_id = %request.user_id, error = %e, "Failed to register user"),
        )?;
        info!(user_id = %request.user_id, "User registered");

        self.state.update(|s| s.forms.registration.clear()).await;
        if self.state.active_tab().await == Tab::Users {
            if let Err(e) = self.fetch_users().await {
                warn!(error = %e, "Refresh after registration failed");
            }
        }
        Ok(request.user_id)
    }

    /// Fetch a user's enrollment QR, replacing whichever one is on screen.
    pub async fn fetch_qr(&self, user_id: &str) -> Result<QrImage, DashboardError> {
        let ticket = self.state.update(|s| s.qr.begin(user_id)).await;

        match self.api.user_qr(user_id).await {
            Ok(image) => {
                let shown = image.clone();
                let outcome = self.state.update(|s| s.qr.complete(ticket, Ok(shown))).await;
                if outcome == Outcome::Stale {
                    debug!(user_id, "Discarded stale QR response");
                }
                Ok(image)
            }
            Err(e) => {
                warn!(user_id, error = %e, "Failed to fetch QR");
                let msg = e.to_string();
                let _ = self.state.update(|s| s.qr.complete(ticket, Err(msg))).await;
                Err(e.into())
            }
        }
    }

    /// Register a device by host name, keeping the existing record if the
    /// name is already taken.
    pub async fn register_device(&self, name: &str) -> Result<DeviceRegistration, DashboardError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DashboardError::validation("Ingresa nombre de dispositivo"));
        }

        let registration = self.api.register_device(name).await?;
        info!(device = name, reply = ?registration.message, "Device registration answered");

        self.refresh_after_mutation().await;
        Ok(registration)
    }

    pub async fn device_status(&self, name: &str) -> Result<DeviceAuthorization, DashboardError> {
        Ok(self.api.device_status(name).await?)
    }

    /// Ask the service to check a login attempt.
    ///
    /// Codes that are not exactly six digits are rejected locally.
    pub async fn validate_totp(
        &self,
        attempt: &TotpAttempt,
    ) -> Result<TotpVerdict, DashboardError> {
        let otp = attempt.otp.trim();
        if otp.len() != 6 || !otp.chars().all(|c| c.is_ascii_digit()) {
            return Err(DashboardError::validation(
                "El código OTP debe tener exactamente 6 dígitos",
            ));
        }

        let attempt = TotpAttempt {
            user_id: attempt.user_id.trim().to_owned(),
            otp: otp.to_owned(),
            device_name: attempt.device_name.trim().to_owned(),
        };
        let verdict = self.api.validate_totp(&attempt).await?;
        info!(
            user_id = %attempt.user_id,
            device = %attempt.device_name,
            valid = verdict.valid,
            "Code checked"
        );
        Ok(verdict)
    }

    pub async fn service_info(&self) -> Result<ServiceInfo, DashboardError> {
        Ok(self.api.service_info().await?)
    }

    async fn find_device(&self, needle: &str) -> Result<Device, DashboardError> {
        let needle = needle.trim();
        self.state
            .read(|s| s.devices.items().iter().find(|d| d.matches(needle)).cloned())
            .await
            .ok_or_else(|| DashboardError::UnknownDevice(needle.to_owned()))
    }

    /// The mutation already succeeded; a failed reload only shows up in the
    /// affected slot's error banner.
    async fn refresh_after_mutation(&self) {
        if let Err(e) = self.refresh_all().await {
            warn!(error = %e, "Refresh after mutation failed");
        }
    }

    /// Devices and logs arrive in one response and are loaded together.
    async fn fetch_devices(&self) -> Result<(), DashboardError> {
        let (devices_ticket, logs_ticket) =
            self.state.update(|s| (s.devices.begin(), s.logs.begin())).await;

        match self.api.list_devices().await {
            Ok(snapshot) => {
                let count = snapshot.devices.len();
                let outcome = self
                    .state
                    .update(|s| {
                        let _ = s.logs.complete(logs_ticket, Ok(snapshot.logs));
                        s.devices.complete(devices_ticket, Ok(snapshot.devices))
                    })
                    .await;
                match outcome {
                    Outcome::Applied => debug!(count, "Devices refreshed"),
                    Outcome::Stale => debug!("Discarded stale device listing"),
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to load devices");
                let msg = e.to_string();
                self.state
                    .update(|s| {
                        let _ = s.logs.complete(logs_ticket, Err(msg.clone()));
                        let _ = s.devices.complete(devices_ticket, Err(msg));
                    })
                    .await;
                Err(e.into())
            }
        }
    }

    async fn fetch_users(&self) -> Result<(), DashboardError> {
        self.load("users", |s| &mut s.users, self.api.list_users())
            .await
    }

    async fn fetch_logs(&self) -> Result<(), DashboardError> {
        self.load("logs", |s| &mut s.logs, self.api.list_logs(self.log_limit))
            .await
    }

    async fn load<T: Send>(
        &self,
        what: &'static str,
        select: fn(&mut ViewState) -> &mut Slot<T>,
        fetch: impl Future<Output = Result<Vec<T>, ApiError>>,
    ) -> Result<(), DashboardError> {
        let ticket = self.state.update(|s| select(s).begin()).await;

        match fetch.await {
            Ok(items) => {
                let count = items.len();
                let outcome = self
                    .state
                    .update(|s| select(s).complete(ticket, Ok(items)))
                    .await;
                match outcome {
                    Outcome::Applied => debug!(what, count, "List refreshed"),
                    Outcome::Stale => debug!(what, "Discarded stale listing"),
                }
                Ok(())
            }
            Err(e) => {
                warn!(what, error = %e, "Failed to load list");
                let msg = e.to_string();
                let _ = self
                    .state
                    .update(|s| select(s).complete(ticket, Err(msg)))
                    .await;
                Err(e.into())
            }
        }
    }
}
