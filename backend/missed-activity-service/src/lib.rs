pub mod backend;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod output;
pub mod presence;
pub mod services;
pub mod store;

pub use backend::{Backend, CachedBackend, MattermostBackend, PreferenceChange};
pub use config::Config;
pub use error::{AppError, Result};
pub use presence::{PresenceTracker, UserStatus};
pub use services::{MissedActivityEngine, MissedActivityJob, RunOptions};
