//! Administration console for the OTP authentication service.
//!
//! [`Dashboard`] holds the panel's state and performs every operation
//! against an [`otp_client::OtpApi`]. [`Poller`] keeps it fresh in the
//! background and [`view`] turns a snapshot into text.

pub mod command;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod gate;
pub mod poller;
pub mod preview;
pub mod session;
pub mod state;
pub mod view;

pub use command::{Command, CommandError};
pub use config::{ApiConfig, Config, PanelConfig};
pub use dashboard::{AddedDevice, Dashboard, PendingDeletion};
pub use error::DashboardError;
pub use gate::{GateError, PasswordGate};
pub use poller::Poller;
pub use preview::PreviewCode;
pub use session::{Flow, Session};
pub use state::{DashboardState, Phase, Tab, ViewState};
