#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("Contraseña incorrecta")]
    Incorrect,
}

/// Shared-password prompt in front of the panel.
///
/// Keeps casual users out of the console. The service does its own access
/// control; this does not replace it.
#[derive(Debug, Clone, Default)]
pub struct PasswordGate {
    expected: Option<String>,
}

impl PasswordGate {
    /// An empty password counts as none.
    pub fn new(expected: Option<String>) -> Self {
        Self {
            expected: expected.filter(|p| !p.is_empty()),
        }
    }

    /// True when no password is configured.
    pub fn is_open(&self) -> bool {
        self.expected.is_none()
    }

    pub fn check(&self, attempt: &str) -> Result<(), GateError> {
        match &self.expected {
            None => Ok(()),
            Some(expected) if expected == attempt.trim_end_matches(['\r', '\n']) => Ok(()),
            Some(_) => Err(GateError::Incorrect),
        }
    }
}
