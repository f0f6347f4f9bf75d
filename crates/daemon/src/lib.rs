// Service modules (daemon functionality)
pub mod config;
pub mod control;
pub mod database;
pub mod http_server;
pub mod process;
pub mod state;
pub mod store;

// Re-exports for consumers (CLI, tests)
pub use config::Config;
pub use control::{ControlError, ControlHandle, Status};
pub use database::Database;
pub use process::{spawn_service, Service};
pub use state::{ResidentSite, ServiceState};
pub use store::SiteStore;
