use otp_client::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// Input rejected before anything was sent to the service.
    #[error("{0}")]
    Validation(String),

    #[error("dispositivo desconocido: {0}")]
    UnknownDevice(String),

    #[error("usuario desconocido: {0}")]
    UnknownUser(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl DashboardError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tab: {0} (expected devices, users, logs or registro)")]
pub struct UnknownTab(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown form field: {0} (expected user_id, full_name, email or cedula)")]
pub struct UnknownField(pub String);
