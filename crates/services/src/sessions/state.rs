use std::fmt;

use exam_core::timer::TimerEvent;

/// Lifecycle of a session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    NotStarted,
    Active,
    Paused,
    Completed,
    /// Left before submitting. The snapshot stays behind for a later resume.
    Exited,
}

impl SessionState {
    /// Whether the attempt can still change.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Paused)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Exited)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Exited => "exited",
        };
        f.write_str(name)
    }
}

/// What one tick of the controller produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub event: TimerEvent,
    pub remaining: u32,
    pub save_due: bool,
    pub sync_due: bool,
}

impl TickReport {
    #[must_use]
    pub fn expired(&self) -> bool {
        self.event == TimerEvent::Expired
    }
}

/// Details shown when the user asks to leave mid-exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitPrompt {
    pub answered: usize,
    pub total: usize,
    pub remaining: u32,
}
