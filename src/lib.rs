// Declare the modules
pub mod api;
pub mod catalog;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod models;
pub mod roles;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod telemetry;

pub use config::ProviderCredentials;
pub use error::ChatError;
pub use events::{EventReceiver, UiEvent};
pub use models::{ChatRole, CollabSettings, Message, ModelRef, Provider};
pub use scheduler::{ChatEngine, SchedulerState};
pub use state::ProviderRegistry;
