//! Plain-text rendering of the panel.
//!
//! Everything here is a pure function of a [`ViewState`]; nothing talks to
//! the service.

use std::fmt::{self, Write as _};

use jiff::Timestamp;
use jiff::civil::DateTime;

use otp_client::QrImage;
use otp_core::{Device, LogEntry, User};

use crate::state::{Phase, QrSlot, RegistrationForm, Slot, Tab, ViewState};

pub const TITLE: &str = "Sistema OTP - Control Remoto";

const DATE_FORMAT: &str = "%d/%m/%Y, %H:%M:%S";
const NEVER: &str = "Nunca";
const RULE: &str = "────────────────────────────────────────";

/// Format a server timestamp for display.
///
/// Offsets are normalized to UTC, naive date-times are shown as they are,
/// and anything unparseable is passed through untouched.
pub fn format_when(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return NEVER.to_owned();
    };

    if let Ok(ts) = raw.parse::<Timestamp>() {
        return ts.strftime(DATE_FORMAT).to_string();
    }
    if let Ok(dt) = raw.parse::<DateTime>() {
        return dt.strftime(DATE_FORMAT).to_string();
    }
    raw.to_owned()
}

fn status_label(enabled: bool) -> &'static str {
    if enabled { "Activo" } else { "Bloqueado" }
}

/// One rendered device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCard {
    pub title: String,
    pub id: Option<String>,
    pub status: &'static str,
    pub code: String,
    pub created: String,
    pub last_used: Option<String>,
    pub ip: Option<String>,
}

impl DeviceCard {
    pub fn new(device: &Device) -> Self {
        Self {
            title: device.name.clone(),
            id: device.id.as_ref().map(ToString::to_string),
            status: status_label(device.enabled),
            code: device.otp.clone().unwrap_or_else(|| "------".to_owned()),
            created: format_when(device.created_at.as_deref()),
            last_used: device
                .last_used
                .as_deref()
                .map(|raw| format_when(Some(raw))),
            ip: device.ip_address.clone(),
        }
    }
}

impl fmt::Display for DeviceCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "▸ {} [{}]", self.title, self.status)?;
        writeln!(f, "    OTP: {}", self.code)?;
        if let Some(id) = &self.id {
            writeln!(f, "    ID: {id}")?;
        }
        write!(f, "    Creado: {}", self.created)?;
        if let Some(last_used) = &self.last_used {
            write!(f, "\n    Último uso: {last_used}")?;
        }
        if let Some(ip) = &self.ip {
            write!(f, "\n    IP: {ip}")?;
        }
        Ok(())
    }
}

pub fn device_cards(devices: &[Device]) -> Vec<DeviceCard> {
    devices.iter().map(DeviceCard::new).collect()
}

pub fn user_row(user: &User) -> String {
    let mut row = format!("▸ {}  {} <{}>", user.user_id, user.full_name, user.email);
    if let Some(cedula) = user.cedula.as_deref().filter(|c| !c.is_empty()) {
        let _ = write!(row, "  CI {cedula}");
    }
    let _ = write!(row, "  [{}]", status_label(user.status_user));
    row
}

pub fn log_line(entry: &LogEntry) -> String {
    let mark = if entry.is_success() { '✔' } else { '✖' };
    format!(
        "{mark} {} • {} ({}) {}",
        entry.device.as_deref().unwrap_or("?"),
        entry.action,
        entry.user_id.as_deref().unwrap_or("-"),
        format_when(entry.timestamp.as_deref()),
    )
}

pub fn tab_strip(active: Tab) -> String {
    Tab::ALL
        .iter()
        .map(|tab| {
            if *tab == active {
                format!("[{}]", tab.label())
            } else {
                format!(" {} ", tab.label())
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The whole screen: header, tab strip and the active tab's body.
pub struct Screen<'a>(pub &'a ViewState);

impl fmt::Display for Screen<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{TITLE}")?;
        writeln!(f, "{}", tab_strip(self.0.active_tab))?;
        writeln!(f, "{RULE}")?;
        write!(f, "{}", TabBody(self.0, self.0.active_tab))
    }
}

/// One tab's content without the header.
pub struct TabBody<'a>(pub &'a ViewState, pub Tab);

impl fmt::Display for TabBody<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0;
        match self.1 {
            Tab::Devices => write_devices(f, state),
            Tab::Users => {
                write_list(f, &state.users, "No hay usuarios", user_row)?;
                write_qr(f, &state.qr)
            }
            Tab::Logs => write_list(f, &state.logs, "No hay registros", log_line),
            Tab::Registro => {
                write_registration(f, &state.forms.registration, state.busy)?;
                write_qr(f, &state.qr)
            }
        }
    }
}

pub fn render(state: &ViewState) -> String {
    Screen(state).to_string()
}

pub fn render_tab(state: &ViewState, tab: Tab) -> String {
    TabBody(state, tab).to_string()
}

fn write_banner(f: &mut fmt::Formatter<'_>, phase: &Phase) -> fmt::Result {
    if let Phase::Failed(msg) = phase {
        writeln!(f, "⚠ Error: {msg}")?;
    }
    Ok(())
}

fn write_list<T>(
    f: &mut fmt::Formatter<'_>,
    slot: &Slot<T>,
    empty: &str,
    line: impl Fn(&T) -> String,
) -> fmt::Result {
    write_banner(f, slot.phase())?;
    if slot.items().is_empty() {
        let text = if slot.is_loading() { "Cargando…" } else { empty };
        return writeln!(f, "{text}");
    }
    for item in slot.items() {
        writeln!(f, "{}", line(item))?;
    }
    Ok(())
}

fn write_devices(f: &mut fmt::Formatter<'_>, state: &ViewState) -> fmt::Result {
    if state.busy {
        writeln!(f, "⏳ Generando…")?;
    }
    if !state.forms.device_name.is_empty() {
        writeln!(f, "Nuevo dispositivo: {}", state.forms.device_name)?;
    }

    write_banner(f, state.devices.phase())?;
    let devices = state.devices.items();
    if devices.is_empty() {
        let text = if state.devices.is_loading() {
            "Cargando…"
        } else {
            "No hay dispositivos"
        };
        return writeln!(f, "{text}");
    }
    for card in device_cards(devices) {
        writeln!(f, "{card}")?;
    }
    Ok(())
}

fn write_registration(
    f: &mut fmt::Formatter<'_>,
    form: &RegistrationForm,
    busy: bool,
) -> fmt::Result {
    writeln!(f, "Registrar usuario")?;
    writeln!(f, "  user_id:   {}", form.user_id)?;
    writeln!(f, "  full_name: {}", form.full_name)?;
    writeln!(f, "  email:     {}", form.email)?;
    writeln!(f, "  cedula:    {}", form.cedula)?;
    if busy {
        writeln!(f, "⏳ Registrando…")
    } else if form.is_complete() {
        writeln!(f, "[submit] listo para registrar")
    } else {
        writeln!(f, "[submit] deshabilitado: completa todos los campos")
    }
}

fn write_qr(f: &mut fmt::Formatter<'_>, qr: &QrSlot) -> fmt::Result {
    let Some(user_id) = qr.user_id() else {
        return Ok(());
    };

    write_banner(f, qr.phase())?;
    match (qr.phase(), qr.image()) {
        (_, Some(image)) => writeln!(f, "QR de {user_id}: {}", describe_qr(image)),
        (Phase::Loading, None) => writeln!(f, "QR de {user_id}: Cargando…"),
        _ => Ok(()),
    }
}

fn describe_qr(image: &QrImage) -> String {
    format!("imagen PNG de {} bytes", image.byte_len())
}
