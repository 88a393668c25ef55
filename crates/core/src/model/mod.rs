mod answer;
mod exam;
mod ids;
mod question;
mod result;
mod session;

pub use ids::{ExamId, ParseIdError, QuestionId, SessionId, UserId};

pub use answer::{AnswerValue, ExamAnswer};
pub use exam::{AccessError, ConfigError, ExamConfig};
pub use question::{ChoiceOption, OptionKey, Question, QuestionError, QuestionKind};
pub use result::{ExamResult, QuestionResult};
pub use session::{ExamSession, SnapshotError};
