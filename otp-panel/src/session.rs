use tracing::debug;

use otp_client::OtpApi;

use crate::command::{Command, HELP};
use crate::dashboard::{Dashboard, PendingDeletion};
use crate::error::DashboardError;

/// What the console loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Keep going, optionally showing a notice under the screen.
    Continue(Option<String>),
    Quit,
}

impl Flow {
    fn notice(text: impl Into<String>) -> Self {
        Flow::Continue(Some(text.into()))
    }
}

/// Interactive console state on top of a [`Dashboard`].
///
/// Errors never end the session; they come back as notices.
pub struct Session<A> {
    dashboard: Dashboard<A>,
    pending: Option<PendingDeletion>,
}

impl<A: OtpApi> Session<A> {
    pub fn new(dashboard: Dashboard<A>) -> Self {
        Self {
            dashboard,
            pending: None,
        }
    }

    pub fn dashboard(&self) -> &Dashboard<A> {
        &self.dashboard
    }

    pub fn pending(&self) -> Option<&PendingDeletion> {
        self.pending.as_ref()
    }

    pub async fn handle(&mut self, command: Command) -> Flow {
        debug!(?command, "console command");

        // Any other command abandons a pending delete.
        let pending = self.pending.take();

        match command {
            Command::Confirm(true) => match pending {
                Some(pending) => {
                    let name = pending.name().to_owned();
                    match self.dashboard.confirm_delete(pending).await {
                        Ok(()) => Flow::notice(format!("🗑 Dispositivo {name} eliminado")),
                        Err(e) => Flow::notice(format!("❌ {e}")),
                    }
                }
                None => Flow::notice("Nada que confirmar"),
            },
            Command::Confirm(false) => match pending {
                Some(_) => Flow::notice("Eliminación cancelada"),
                None => Flow::notice("Nada que confirmar"),
            },
            Command::Tab(tab) => quiet(self.dashboard.set_tab(tab).await),
            Command::Refresh => quiet(self.dashboard.refresh_all().await),
            Command::Add(name) => {
                self.dashboard.set_device_draft(name.clone()).await;
                match self.dashboard.add_device(&name).await {
                    Ok(added) => {
                        let code = added.confirmed_code().unwrap_or(added.preview.as_str());
                        Flow::notice(format!(
                            "✅ Dispositivo agregado: {}\nOTP: {code}",
                            added.name
                        ))
                    }
                    Err(e) => Flow::notice(format!("❌ {e}")),
                }
            }
            Command::Toggle(device) => match self.dashboard.toggle_device(&device).await {
                Ok(enabled) => Flow::notice(format!("{device} → {}", label(enabled))),
                Err(e) => Flow::notice(format!("❌ {e}")),
            },
            Command::Delete(device) => match self.dashboard.request_delete(&device).await {
                Ok(pending) => {
                    let prompt = pending.prompt();
                    self.pending = Some(pending);
                    Flow::notice(prompt)
                }
                Err(e) => Flow::notice(format!("❌ {e}")),
            },
            Command::ToggleUser(user_id) => match self.dashboard.toggle_user(&user_id).await {
                Ok(enabled) => Flow::notice(format!("{user_id} → {}", label(enabled))),
                Err(e) => Flow::notice(format!("❌ {e}")),
            },
            Command::Qr(user_id) => match self.dashboard.fetch_qr(&user_id).await {
                Ok(image) => Flow::notice(format!(
                    "QR de {user_id}: {} bytes\n{}",
                    image.byte_len(),
                    image.data_url()
                )),
                Err(e) => Flow::notice(format!("❌ {e}")),
            },
            Command::Set(field, value) => {
                self.dashboard.set_form_field(field, value).await;
                Flow::Continue(None)
            }
            Command::Submit => match self.dashboard.register_user().await {
                Ok(user_id) => Flow::notice(format!("✅ Usuario registrado: {user_id}")),
                Err(e) => Flow::notice(format!("❌ {e}")),
            },
            Command::Help => Flow::notice(HELP),
            Command::Quit => Flow::Quit,
        }
    }
}

/// Success needs no notice; the redrawn screen says it all.
fn quiet(result: Result<(), DashboardError>) -> Flow {
    match result {
        Ok(()) => Flow::Continue(None),
        Err(e) => Flow::notice(format!("❌ {e}")),
    }
}

fn label(enabled: bool) -> &'static str {
    if enabled { "Activo" } else { "Bloqueado" }
}
