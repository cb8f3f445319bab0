use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::info;

use otp_core::{
    Device, DeviceAuthorization, DeviceKey, DeviceRegistration, DeviceSnapshot, LogEntry,
    NewDevice, NewUser, RecordId, ServiceInfo, TotpAttempt, TotpVerdict, User, VerifiedUser,
};

use crate::{ApiError, OtpApi, QrImage};

/// Placeholder enrollment image (1x1 transparent PNG).
const PLACEHOLDER_PNG: [u8; 67] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// In-memory stand-in for the OTP service.
///
/// Mirrors the server's observable behavior closely enough for tests and
/// offline demos: sequential ids, 404 for unknown keys, 409 for duplicate
/// names, and an append-only access log. Code checks compare against the
/// device's stored display code; no TOTP math is done here.
#[derive(Clone, Default)]
pub struct MockApi {
    store: Arc<RwLock<MockStore>>,
    offline: Arc<AtomicBool>,
    requests: Arc<AtomicUsize>,
}

#[derive(Default)]
struct MockStore {
    devices: Vec<Device>,
    users: Vec<User>,
    /// Oldest first.
    logs: Vec<LogEntry>,
    next_id: i64,
}

impl MockStore {
    fn device_index(&self, key: &DeviceKey) -> Option<usize> {
        self.devices.iter().position(|device| match key {
            DeviceKey::Id(id) => device.id.as_ref() == Some(id),
            DeviceKey::Name(name) => &device.name == name,
        })
    }

    fn insert_device(&mut self, name: &str, otp: &str, enabled: bool) -> Device {
        self.next_id += 1;
        let device = Device {
            id: Some(RecordId::Int(self.next_id)),
            name: name.to_owned(),
            enabled,
            otp: Some(otp.to_owned()),
            created_at: Some(jiff::Timestamp::now().to_string()),
            last_used: None,
            ip_address: None,
        };
        self.devices.push(device.clone());
        device
    }

    fn log(&mut self, user_id: &str, device: &str, action: &str, log_type: &str) {
        self.logs.push(LogEntry {
            timestamp: Some(jiff::Timestamp::now().to_string()),
            device: Some(device.to_owned()),
            user_id: Some(user_id.to_owned()),
            action: action.to_owned(),
            log_type: Some(log_type.to_owned()),
            ip_address: Some("127.0.0.1".to_owned()),
        });
    }

    fn recent_logs(&self, limit: Option<u32>) -> Vec<LogEntry> {
        let limit = limit.map_or(usize::MAX, |l| l as usize);
        self.logs.iter().rev().take(limit).cloned().collect()
    }
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock pre-populated with a couple of devices, one user and one
    /// successful login.
    pub fn with_demo_data() -> Self {
        let mut store = MockStore::default();
        store.insert_device("RECEPCION-PC", "482913", true);
        store.insert_device("BODEGA-01", "905177", false);
        store.users.push(User {
            user_id: "admin".to_owned(),
            full_name: "Administrador".to_owned(),
            email: "admin@example.com".to_owned(),
            cedula: Some("0102030405".to_owned()),
            status_user: true,
            totp_secret: Some(random_secret()),
            totp_qr: None,
        });
        store.log("admin", "RECEPCION-PC", "Acceso exitoso", "login_success");

        Self {
            store: Arc::new(RwLock::new(store)),
            ..Self::default()
        }
    }

    /// Make every subsequent call fail with HTTP 503.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of calls received so far, including failed ones.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), ApiError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::server(503, "service unavailable"));
        }
        Ok(())
    }
}

fn random_secret() -> String {
    let mut rng = rand::rng();
    (0..32)
        .map(|_| BASE32_ALPHABET[rng.random_range(0..BASE32_ALPHABET.len())] as char)
        .collect()
}

fn rejected(message: impl Into<String>) -> TotpVerdict {
    TotpVerdict {
        valid: false,
        message: Some(message.into()),
        user: None,
        error: None,
    }
}

#[async_trait]
impl OtpApi for MockApi {
    async fn list_devices(&self) -> Result<DeviceSnapshot, ApiError> {
        self.enter()?;
        let store = self.store.read().await;
        Ok(DeviceSnapshot {
            devices: store.devices.clone(),
            logs: store.recent_logs(None),
        })
    }

    async fn create_device(&self, device: &NewDevice) -> Result<Option<Device>, ApiError> {
        self.enter()?;
        let name = device.name.trim();
        if name.is_empty() {
            return Err(ApiError::server(400, "Falta name"));
        }

        let mut store = self.store.write().await;
        if store.device_index(&DeviceKey::Name(name.to_owned())).is_some() {
            return Err(ApiError::server(409, "Dispositivo ya existe"));
        }

        let created = store.insert_device(name, &device.otp, device.enabled);
        info!(name, "mock device created");
        Ok(Some(created))
    }

    async fn set_device_enabled(&self, key: &DeviceKey, enabled: bool) -> Result<(), ApiError> {
        self.enter()?;
        let mut store = self.store.write().await;
        let idx = store
            .device_index(key)
            .ok_or_else(|| ApiError::server(404, "Dispositivo no encontrado"))?;
        store.devices[idx].enabled = enabled;
        Ok(())
    }

    async fn delete_device(&self, key: &DeviceKey) -> Result<(), ApiError> {
        self.enter()?;
        let mut store = self.store.write().await;
        let idx = store
            .device_index(key)
            .ok_or_else(|| ApiError::server(404, "Dispositivo no encontrado"))?;
        store.devices.remove(idx);
        Ok(())
    }

    async fn register_device(&self, name: &str) -> Result<DeviceRegistration, ApiError> {
        self.enter()?;
        if name.is_empty() {
            return Err(ApiError::server(400, "Falta device_name"));
        }

        let mut store = self.store.write().await;
        if let Some(idx) = store.device_index(&DeviceKey::Name(name.to_owned())) {
            return Ok(DeviceRegistration {
                message: Some("Dispositivo ya existe".to_owned()),
                device: Some(store.devices[idx].clone()),
            });
        }

        let device = store.insert_device(name, "000000", true);
        Ok(DeviceRegistration {
            message: Some("Dispositivo registrado exitosamente".to_owned()),
            device: Some(device),
        })
    }

    async fn device_status(&self, name: &str) -> Result<DeviceAuthorization, ApiError> {
        self.enter()?;
        let store = self.store.read().await;
        let authorization = match store.device_index(&DeviceKey::Name(name.to_owned())) {
            Some(idx) => {
                let device = store.devices[idx].clone();
                DeviceAuthorization {
                    authorized: device.enabled,
                    message: None,
                    device: Some(device),
                }
            }
            None => DeviceAuthorization {
                authorized: false,
                message: Some("Dispositivo no registrado".to_owned()),
                device: None,
            },
        };
        Ok(authorization)
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.enter()?;
        Ok(self.store.read().await.users.clone())
    }

    async fn create_user(&self, user: &NewUser) -> Result<(), ApiError> {
        self.enter()?;
        let mut store = self.store.write().await;
        if store.users.iter().any(|u| u.user_id == user.user_id) {
            return Err(ApiError::server(409, "Usuario ya existe"));
        }

        store.users.push(User {
            user_id: user.user_id.clone(),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            cedula: Some(user.cedula.clone()),
            status_user: true,
            totp_secret: Some(random_secret()),
            totp_qr: None,
        });
        info!(user_id = %user.user_id, "mock user created");
        Ok(())
    }

    async fn set_user_status(&self, user_id: &str, enabled: bool) -> Result<(), ApiError> {
        self.enter()?;
        let mut store = self.store.write().await;
        let user = store
            .users
            .iter_mut()
            .find(|u| u.user_id == user_id)
            .ok_or_else(|| ApiError::server(404, "Usuario no encontrado"))?;
        user.status_user = enabled;
        Ok(())
    }

    async fn user_qr(&self, user_id: &str) -> Result<QrImage, ApiError> {
        self.enter()?;
        let store = self.store.read().await;
        if !store.users.iter().any(|u| u.user_id == user_id) {
            return Err(ApiError::server(404, "Usuario no encontrado"));
        }
        Ok(QrImage::from_png(PLACEHOLDER_PNG.to_vec())?)
    }

    async fn list_logs(&self, limit: Option<u32>) -> Result<Vec<LogEntry>, ApiError> {
        self.enter()?;
        Ok(self.store.read().await.recent_logs(limit))
    }

    async fn validate_totp(&self, attempt: &TotpAttempt) -> Result<TotpVerdict, ApiError> {
        self.enter()?;
        let TotpAttempt {
            user_id,
            otp,
            device_name,
        } = attempt;

        let missing: Vec<&str> = [
            ("user_id", user_id),
            ("otp", otp),
            ("device_name", device_name),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| field)
        .collect();
        if !missing.is_empty() {
            return Ok(rejected(format!("Faltan campos: {}", missing.join(", "))));
        }

        let mut store = self.store.write().await;

        let Some(user) = store.users.iter().find(|u| &u.user_id == user_id).cloned() else {
            store.log(user_id, device_name, "Usuario no encontrado", "user_not_found");
            return Ok(rejected("Usuario no encontrado"));
        };
        if !user.status_user {
            store.log(user_id, device_name, "Usuario inactivo", "user_inactive");
            return Ok(rejected("Usuario inactivo. Contacte al administrador."));
        }

        let Some(idx) = store.device_index(&DeviceKey::Name(device_name.clone())) else {
            store.log(user_id, device_name, "Dispositivo no registrado", "device_not_found");
            return Ok(rejected(format!(
                "Dispositivo \"{device_name}\" no autorizado. Contacte al administrador."
            )));
        };
        if !store.devices[idx].enabled {
            store.log(user_id, device_name, "Dispositivo deshabilitado", "device_disabled");
            return Ok(rejected("Dispositivo deshabilitado. Contacte al administrador."));
        }

        if store.devices[idx].otp.as_deref() != Some(otp.as_str()) {
            store.log(user_id, device_name, "OTP incorrecto", "otp_invalid");
            return Ok(rejected("Código OTP incorrecto"));
        }

        store.devices[idx].last_used = Some(jiff::Timestamp::now().to_string());
        store.devices[idx].ip_address = Some("127.0.0.1".to_owned());
        store.log(user_id, device_name, "Acceso exitoso", "login_success");

        Ok(TotpVerdict {
            valid: true,
            message: Some("Autenticación exitosa".to_owned()),
            user: Some(VerifiedUser {
                user_id: user.user_id,
                full_name: Some(user.full_name),
                email: Some(user.email),
            }),
            error: None,
        })
    }

    async fn service_info(&self) -> Result<ServiceInfo, ApiError> {
        self.enter()?;
        Ok(ServiceInfo {
            service: "OTP Authentication API (mock)".to_owned(),
            version: "2.0".to_owned(),
            security: Some("Dual Layer (User + Device)".to_owned()),
            status: "online".to_owned(),
        })
    }
}
