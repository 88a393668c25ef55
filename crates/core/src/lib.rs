#![forbid(unsafe_code)]

pub mod error;
pub mod ledger;
pub mod model;
pub mod scoring;
pub mod time;
pub mod timer;

pub use error::Error;
pub use ledger::{AnswerLedger, LedgerProgress};
pub use time::{Clock, ManualClock};
pub use timer::{CountdownTimer, TimerEvent};
