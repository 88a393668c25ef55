#![forbid(unsafe_code)]

pub mod autosave;
pub mod config;
pub mod error;
pub mod loader;
pub mod persistence;
pub mod remote;
pub mod sessions;

pub use exam_core::Clock;
pub use sessions as session;

pub use autosave::{AutoSaveDue, AutoSavePolicy, AutoSaveScheduler, SaveTicket};
pub use config::{EngineConfig, RemoteConfig};
pub use error::{EngineConfigError, LoaderError, RemoteError, SessionError};
pub use loader::{ExamDetails, ExamLoader, InMemoryExamLoader};
pub use persistence::PersistenceAdapter;
pub use remote::{HttpSessionApi, RemoteScore, RemoteSessionApi};

pub use sessions::{
    ExitPrompt, SaveJob, SessionController, SessionDriver, SessionState, SharedController,
    TickReport,
};
