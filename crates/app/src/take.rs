//! Interactive terminal host for one attempt.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tokio::time;

use exam_core::model::{AnswerValue, ExamResult, OptionKey, QuestionKind};
use services::{
    EngineConfig, ExamDetails, HttpSessionApi, InMemoryExamLoader, PersistenceAdapter,
    RemoteSessionApi, SessionController, SessionDriver, SessionState, SharedController,
};
use storage::Storage;

use crate::args::TakeArgs;

const HELP: &str = "\
commands:
  a <answer>   answer the current question (A-E, true/false, or text; use | between blanks)
  n | p        next or previous question
  go <n>       jump to question n
  pause        pause the clock
  resume       resume after a pause
  status       show progress and time left
  submit       hand in the exam
  exit         leave and keep progress for later";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Answer(String),
    Next,
    Prev,
    Go(usize),
    Pause,
    Resume,
    Status,
    Submit,
    Exit,
    Help,
    Unknown(String),
}

impl Input {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let input = match cmd.to_ascii_lowercase().as_str() {
            "a" | "answer" => Self::Answer(rest.to_string()),
            "n" | "next" => Self::Next,
            "p" | "prev" => Self::Prev,
            "go" => match rest.parse::<usize>() {
                Ok(n) if n > 0 => Self::Go(n - 1),
                _ => Self::Unknown(line.to_string()),
            },
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "status" => Self::Status,
            "submit" => Self::Submit,
            "exit" | "quit" => Self::Exit,
            "help" | "?" => Self::Help,
            _ => Self::Unknown(line.to_string()),
        };
        Some(input)
    }

    fn confirms_exit(&self) -> bool {
        match self {
            Self::Exit => true,
            Self::Unknown(line) => matches!(line.to_ascii_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }
}

/// Turns typed text into an answer shaped for the question kind.
fn parse_answer(kind: &QuestionKind, raw: &str) -> Option<AnswerValue> {
    let raw = raw.trim();
    match kind {
        QuestionKind::MultipleChoice { .. } => {
            OptionKey::parse(&raw.to_ascii_uppercase()).map(|key| AnswerValue::text(key.as_str()))
        }
        QuestionKind::TrueFalse { .. } => match raw.to_ascii_lowercase().as_str() {
            "t" | "true" | "y" | "yes" => Some(AnswerValue::Bool(true)),
            "f" | "false" | "n" | "no" => Some(AnswerValue::Bool(false)),
            _ => None,
        },
        QuestionKind::FillBlank { .. } if raw.contains('|') => Some(AnswerValue::List(
            raw.split('|').map(|part| part.trim().to_string()).collect(),
        )),
        QuestionKind::FillBlank { .. } => Some(AnswerValue::text(raw)),
    }
}

fn clock_face(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn render_question(controller: &SessionController) {
    let (Some(session), Some(question)) = (controller.session(), controller.current_question())
    else {
        return;
    };
    println!();
    println!(
        "Question {}/{}  ({} pt)  [{} left]",
        session.current_question_index() + 1,
        session.question_count(),
        question.points(),
        clock_face(controller.time_remaining())
    );
    println!("{}", question.text());
    match question.kind() {
        QuestionKind::MultipleChoice { options, .. } => {
            for option in options {
                println!("  {}) {}", option.key.as_str(), option.text);
            }
        }
        QuestionKind::TrueFalse { .. } => println!("  true / false"),
        QuestionKind::FillBlank { .. } => println!("  (type your answer)"),
    }
    if let Some(answer) = session.answers().get(question.id()) {
        println!("  current answer: {}", describe(answer.answer()));
    }
}

fn describe(value: &AnswerValue) -> String {
    match value {
        AnswerValue::Bool(b) => b.to_string(),
        AnswerValue::Text(t) => t.clone(),
        AnswerValue::List(items) => items.join(" | "),
    }
}

fn render_status(controller: &SessionController) {
    if let Some(progress) = controller.progress() {
        println!(
            "{} - answered {}/{} ({}%), {} left",
            controller.state(),
            progress.answered,
            progress.total,
            progress.percentage,
            clock_face(controller.time_remaining())
        );
    }
}

fn render_result(result: &ExamResult, show_breakdown: bool) {
    println!();
    println!(
        "Score {}/{} ({}%) - {}",
        result.score,
        result.total_points,
        result.percentage,
        if result.passed { "passed" } else { "not passed" }
    );
    println!(
        "correct {}, incorrect {}, unanswered {}, time {}",
        result.correct_answers,
        result.incorrect_answers,
        result.unanswered_questions,
        clock_face(result.time_spent)
    );
    if !show_breakdown {
        return;
    }
    for (n, q) in result.question_results.iter().enumerate() {
        let mark = match (&q.answer, q.is_correct) {
            (_, true) => "ok",
            (Some(a), false) if !a.is_blank() => "wrong",
            _ => "skipped",
        };
        println!(
            "  {:>2}. {:<7} {}/{} pt, key: {}",
            n + 1,
            mark,
            q.points_earned,
            q.points_possible,
            describe(&q.correct_answer)
        );
    }
}

enum Flow {
    Continue,
    Done,
}

async fn handle(shared: &SharedController, input: Input, exit_pending: &mut bool) -> Flow {
    let mut controller = shared.lock().await;

    if std::mem::take(exit_pending) {
        if input.confirms_exit() {
            return confirm_exit(&mut controller).await;
        }
        println!("staying in the exam");
    }

    let current = controller
        .session()
        .map_or(0, |s| s.current_question_index());

    let outcome = match input {
        Input::Answer(raw) => {
            let Some(question) = controller.current_question() else {
                return Flow::Continue;
            };
            let id = question.id();
            let parsed = parse_answer(question.kind(), &raw);
            match parsed {
                Some(value) => controller.answer(id, value).map(|_| ()),
                None => {
                    println!("cannot read {raw:?} as an answer to this question");
                    return Flow::Continue;
                }
            }
        }
        Input::Next => controller.navigate(current + 1).map(|_| ()),
        Input::Prev => controller.navigate(current.saturating_sub(1)).map(|_| ()),
        Input::Go(index) => controller.navigate(index).map(|_| ()),
        Input::Pause => controller.pause(),
        Input::Resume => controller.unpause(),
        Input::Status => {
            render_status(&controller);
            return Flow::Continue;
        }
        Input::Submit => match controller.submit().await {
            Ok(_) => return Flow::Done,
            Err(err) => Err(err),
        },
        Input::Exit => match controller.request_exit() {
            Ok(prompt) => {
                println!(
                    "Leave now? {}/{} answered, {} left. The attempt can be resumed later.",
                    prompt.answered,
                    prompt.total,
                    clock_face(prompt.remaining)
                );
                println!("type `exit` again (or `yes`) to leave, anything else to stay");
                *exit_pending = true;
                return Flow::Continue;
            }
            Err(err) => Err(err),
        },
        Input::Help => {
            println!("{HELP}");
            return Flow::Continue;
        }
        Input::Unknown(line) => {
            println!("unknown command: {line} (try `help`)");
            return Flow::Continue;
        }
    };

    match outcome {
        Ok(()) => render_question(&controller),
        Err(err) => println!("{err}"),
    }
    Flow::Continue
}

async fn confirm_exit(controller: &mut SessionController) -> Flow {
    match controller.confirm_exit().await {
        Ok(saved) => {
            if !saved {
                println!("warning: progress could not be saved");
            }
        }
        Err(err) => println!("{err}"),
    }
    Flow::Done
}

fn remote_api(engine: &EngineConfig) -> Option<Arc<dyn RemoteSessionApi>> {
    let remote = engine.remote.clone()?;
    match HttpSessionApi::new(remote) {
        Ok(api) => Some(Arc::new(api)),
        Err(err) => {
            tracing::warn!(error = %err, "remote session API disabled");
            None
        }
    }
}

pub async fn run(args: TakeArgs, storage: Storage) -> Result<(), Box<dyn std::error::Error>> {
    let engine = EngineConfig::from_env()?;
    let raw = std::fs::read_to_string(&args.exam_path)?;
    let details = ExamDetails::from_json(&raw)?;
    let exam_id = details.config.id();
    let show_results = details.config.show_results();

    let loader = InMemoryExamLoader::new(services::Clock::system()).with_exam(details);
    let persistence = PersistenceAdapter::new(storage, remote_api(&engine));
    let mut controller = SessionController::new(persistence, services::Clock::system(), args.user_id)
        .with_autosave(engine.autosave);

    match &args.session_id {
        Some(id) => {
            controller.open_session(&loader, exam_id, id).await?;
        }
        None => {
            controller.open(&loader, exam_id).await?;
        }
    }

    if let (Some(config), Some(session)) = (controller.config(), controller.session()) {
        println!("{} - session {}", config.title(), session.id());
    }
    if let Some(material) = controller.display_material() {
        println!();
        println!("{material}");
    }
    println!("{HELP}");
    render_question(&controller);

    let shared: SharedController = Arc::new(Mutex::new(controller));
    let driver = SessionDriver::spawn(shared.clone(), engine.tick_every);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut watch = time::interval(Duration::from_millis(500));
    let mut exit_pending = false;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    // Stdin closed: keep the attempt for later.
                    let mut controller = shared.lock().await;
                    if controller.state().is_live() {
                        confirm_exit(&mut controller).await;
                    }
                    break;
                };
                let Some(input) = Input::parse(&line) else {
                    continue;
                };
                if let Flow::Done = handle(&shared, input, &mut exit_pending).await {
                    break;
                }
            }
            _ = watch.tick() => {
                if shared.lock().await.state().is_terminal() {
                    break;
                }
            }
        }
    }
    drop(driver);

    let controller = shared.lock().await;
    match controller.state() {
        SessionState::Completed => {
            if controller.time_remaining() == 0 {
                println!("Time is up.");
            }
            if let Some(result) = controller.result() {
                render_result(result, show_results);
            }
        }
        SessionState::Exited => {
            if let Some(session) = controller.session() {
                println!(
                    "Progress saved. Resume with: take --exam {} --session {}",
                    args.exam_path.display(),
                    session.id()
                );
            }
        }
        state => println!("session ended in state {state}"),
    }
    Ok(())
}
