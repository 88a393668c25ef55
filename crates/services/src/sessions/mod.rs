mod controller;
mod driver;
mod state;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::{SaveJob, SessionController};
pub use driver::{SessionDriver, SharedController};
pub use state::{ExitPrompt, SessionState, TickReport};
