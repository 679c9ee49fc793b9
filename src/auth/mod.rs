// Authentication module
// Manages the access token lifecycle: acquisition, file cache, background refresh

mod acquire;
mod background;
mod manager;
mod secret;
mod storage;
mod types;

pub use background::spawn_refresh_task;
pub use manager::TokenManager;
pub use secret::Secret;
pub use types::{RefreshOutcome, RefreshSchedule, TokenSettings, TokenStatus};
