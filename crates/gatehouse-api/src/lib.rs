// Gatehouse request-authentication gateway
// Decision: Library + thin binary so the whole pipeline can be driven in-process by tests

pub mod app;
pub mod auth;
pub mod common;
pub mod config;
pub mod cors;
pub mod session;
pub mod startup;
pub mod telemetry;

pub use app::{router, AppState};
pub use config::GatewayConfig;
pub use session::{Session, SessionStore};
pub use startup::{Lifecycle, StartupError, StartupSequencer, StartupState};
