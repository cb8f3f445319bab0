use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{Mutex, watch};

use otp_client::QrImage;
use otp_core::{Device, LogEntry, NewUser, User};

use crate::error::{UnknownField, UnknownTab};

/// The four mutually exclusive views of the panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Devices,
    Users,
    Logs,
    Registro,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Devices, Tab::Users, Tab::Logs, Tab::Registro];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Devices => "devices",
            Tab::Users => "users",
            Tab::Logs => "logs",
            Tab::Registro => "registro",
        }
    }

    /// Caption shown in the tab strip.
    pub fn label(&self) -> &'static str {
        match self {
            Tab::Devices => "Dispositivos",
            Tab::Users => "Usuarios",
            Tab::Logs => "Accesos",
            Tab::Registro => "Registro",
        }
    }
}

impl FromStr for Tab {
    type Err = UnknownTab;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tab::ALL
            .into_iter()
            .find(|tab| tab.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownTab(s.to_owned()))
    }
}

/// Load phase of one data domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed(String),
}

/// Proof that a fetch was issued. Only the newest ticket of a slot may
/// write to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Ticket(u64);

/// What happened to a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// A newer fetch was issued meanwhile; the result was dropped.
    Stale,
}

/// Server-owned list plus its load phase.
#[derive(Debug, Clone)]
pub struct Slot<T> {
    items: Vec<T>,
    phase: Phase,
    issued: u64,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            phase: Phase::Idle,
            issued: 0,
        }
    }
}

impl<T> Slot<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            Phase::Failed(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn begin(&mut self) -> Ticket {
        self.issued += 1;
        self.phase = Phase::Loading;
        Ticket(self.issued)
    }

    /// Apply a fetch result if `ticket` is still the newest one.
    ///
    /// Success replaces the list wholesale; failure keeps the previous list.
    pub fn complete(&mut self, ticket: Ticket, result: Result<Vec<T>, String>) -> Outcome {
        if ticket.0 != self.issued {
            return Outcome::Stale;
        }

        match result {
            Ok(items) => {
                self.items = items;
                self.phase = Phase::Ready;
            }
            Err(msg) => self.phase = Phase::Failed(msg),
        }
        Outcome::Applied
    }
}

/// The QR image currently on screen.
#[derive(Debug, Clone, Default)]
pub struct QrSlot {
    user_id: Option<String>,
    image: Option<QrImage>,
    phase: Phase,
    issued: u64,
}

impl QrSlot {
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn image(&self) -> Option<&QrImage> {
        self.image.as_ref()
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            Phase::Failed(msg) => Some(msg),
            _ => None,
        }
    }

    /// Release the displayed image and start loading the one for `user_id`.
    pub fn begin(&mut self, user_id: &str) -> Ticket {
        self.issued += 1;
        self.user_id = Some(user_id.to_owned());
        self.image = None;
        self.phase = Phase::Loading;
        Ticket(self.issued)
    }

    pub fn complete(&mut self, ticket: Ticket, result: Result<QrImage, String>) -> Outcome {
        if ticket.0 != self.issued {
            return Outcome::Stale;
        }

        match result {
            Ok(image) => {
                self.image = Some(image);
                self.phase = Phase::Ready;
            }
            Err(msg) => self.phase = Phase::Failed(msg),
        }
        Outcome::Applied
    }
}

/// Fields of the user registration form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    UserId,
    FullName,
    Email,
    Cedula,
}

impl FromStr for FormField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user_id" | "id" => Ok(FormField::UserId),
            "full_name" | "name" | "nombre" => Ok(FormField::FullName),
            "email" | "correo" => Ok(FormField::Email),
            "cedula" | "cédula" => Ok(FormField::Cedula),
            _ => Err(UnknownField(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub cedula: String,
}

impl RegistrationForm {
    pub fn set(&mut self, field: FormField, value: impl Into<String>) {
        let value = value.into();
        match field {
            FormField::UserId => self.user_id = value,
            FormField::FullName => self.full_name = value,
            FormField::Email => self.email = value,
            FormField::Cedula => self.cedula = value,
        }
    }

    /// All four fields are filled in.
    pub fn is_complete(&self) -> bool {
        [&self.user_id, &self.full_name, &self.email, &self.cedula]
            .iter()
            .all(|value| !value.trim().is_empty())
    }

    pub fn to_request(&self) -> Option<NewUser> {
        if !self.is_complete() {
            return None;
        }

        Some(NewUser {
            user_id: self.user_id.trim().to_owned(),
            full_name: self.full_name.trim().to_owned(),
            email: self.email.trim().to_owned(),
            cedula: self.cedula.trim().to_owned(),
        })
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Transient input the operator is typing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forms {
    pub device_name: String,
    pub registration: RegistrationForm,
}

/// Everything the views render.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub active_tab: Tab,
    pub devices: Slot<Device>,
    pub users: Slot<User>,
    pub logs: Slot<LogEntry>,
    pub qr: QrSlot,
    pub forms: Forms,
    /// A mutation is in flight.
    pub busy: bool,
}

/// Shared handle to the panel's view state.
///
/// Every write bumps a revision counter that views can wait on through
/// [`DashboardState::subscribe`].
pub struct DashboardState {
    inner: Arc<Mutex<ViewState>>,
    revision: Arc<watch::Sender<u64>>,
}

impl DashboardState {
    pub fn new(active_tab: Tab) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(ViewState {
                active_tab,
                ..ViewState::default()
            })),
            revision: Arc::new(revision),
        }
    }

    /// Mutate the state and notify subscribers.
    pub async fn update<R>(&self, f: impl FnOnce(&mut ViewState) -> R) -> R {
        let result = {
            let mut inner = self.inner.lock().await;
            f(&mut inner)
        };
        self.revision.send_modify(|rev| *rev += 1);
        result
    }

    /// Read from the state without notifying anyone.
    pub async fn read<R>(&self, f: impl FnOnce(&ViewState) -> R) -> R {
        let inner = self.inner.lock().await;
        f(&inner)
    }

    /// Owned copy for rendering.
    pub async fn snapshot(&self) -> ViewState {
        self.inner.lock().await.clone()
    }

    pub async fn active_tab(&self) -> Tab {
        self.inner.lock().await.active_tab
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new(Tab::default())
    }
}

impl Clone for DashboardState {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            revision: Arc::clone(&self.revision),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_ticket_wins() {
        let mut slot: Slot<u32> = Slot::default();
        let older = slot.begin();
        let newer = slot.begin();

        assert_eq!(slot.complete(newer, Ok(vec![2, 2])), Outcome::Applied);
        assert_eq!(slot.complete(older, Ok(vec![1])), Outcome::Stale);

        assert_eq!(slot.items(), &[2, 2]);
        assert_eq!(slot.phase(), &Phase::Ready);
    }

    #[test]
    fn stale_result_keeps_loading_phase() {
        let mut slot: Slot<u32> = Slot::default();
        let older = slot.begin();
        let _newer = slot.begin();

        assert_eq!(slot.complete(older, Err("boom".into())), Outcome::Stale);
        assert!(slot.is_loading());
        assert!(slot.error().is_none());
    }

    #[test]
    fn failure_keeps_previous_items() {
        let mut slot: Slot<&str> = Slot::default();
        let first = slot.begin();
        let _ = slot.complete(first, Ok(vec!["PC1", "PC2"]));

        let second = slot.begin();
        assert!(slot.is_loading());
        assert_eq!(slot.items(), &["PC1", "PC2"]);

        let _ = slot.complete(second, Err("HTTP 503: service unavailable".into()));
        assert_eq!(slot.items(), &["PC1", "PC2"]);
        assert_eq!(slot.error(), Some("HTTP 503: service unavailable"));
    }

    #[test]
    fn qr_request_releases_previous_image() {
        let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let mut qr = QrSlot::default();
        let first = qr.begin("u1");
        let _ = qr.complete(first, Ok(QrImage::from_png(png).unwrap()));
        assert!(qr.image().is_some());

        let second = qr.begin("u2");
        assert!(qr.image().is_none());
        assert_eq!(qr.user_id(), Some("u2"));

        let _ = qr.complete(second, Err("HTTP 404: Usuario no encontrado".into()));
        assert_eq!(qr.error(), Some("HTTP 404: Usuario no encontrado"));
    }

    #[test]
    fn registration_requires_every_field() {
        let mut form = RegistrationForm::default();
        form.set(FormField::UserId, "u1");
        form.set(FormField::FullName, "Ana Pérez");
        form.set(FormField::Email, "ana@example.com");
        assert!(!form.is_complete());
        assert!(form.to_request().is_none());

        form.set(FormField::Cedula, "   ");
        assert!(!form.is_complete());

        form.set(FormField::Cedula, " 0102 ");
        let request = form.to_request().unwrap();
        assert_eq!(request.cedula, "0102");

        form.clear();
        assert_eq!(form, RegistrationForm::default());
    }

    #[test]
    fn tabs_parse_case_insensitively() {
        assert_eq!("Users".parse::<Tab>().unwrap(), Tab::Users);
        assert_eq!(" registro ".parse::<Tab>().unwrap(), Tab::Registro);
        assert!("settings".parse::<Tab>().is_err());
    }

    #[tokio::test]
    async fn updates_bump_revision() {
        let state = DashboardState::new(Tab::Logs);
        let mut rx = state.subscribe();

        state.update(|s| s.active_tab = Tab::Users).await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);

        let tab = state.read(|s| s.active_tab).await;
        assert_eq!(tab, Tab::Users);
        assert_eq!(state.revision(), 1);
    }
}
