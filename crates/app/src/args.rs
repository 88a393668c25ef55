use std::fmt;
use std::path::{Path, PathBuf};

use exam_core::model::{ExamId, SessionId, UserId};

const DEFAULT_DB_URL: &str = "sqlite://exam.sqlite3";
const DEFAULT_RESULT_LIMIT: u32 = 20;

#[derive(Debug, PartialEq, Eq)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeArgs {
    pub db_url: String,
    pub exam_path: PathBuf,
    pub session_id: Option<SessionId>,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsArgs {
    pub db_url: String,
    pub exam_id: ExamId,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Take(TakeArgs),
    Results(ResultsArgs),
    Help,
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- take    --exam <file.json> [--db <sqlite_url>] [--session <id>] [--user <id>]");
    eprintln!("  cargo run -p app -- results --exam-id <id> [--db <sqlite_url>] [--limit <n>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db {DEFAULT_DB_URL}");
    eprintln!("  --user 1");
    eprintln!("  --limit {DEFAULT_RESULT_LIMIT}");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_AUTOSAVE_SECS, EXAM_SYNC_SECS, EXAM_TICK_MILLIS,");
    eprintln!("  EXAM_REMOTE_URL, EXAM_REMOTE_TOKEN, EXAM_REMOTE_TIMEOUT_SECS, RUST_LOG");
}

/// Parses `argv` (without the program name). `env_db_url` is the value of
/// `EXAM_DB_URL`, if set.
pub fn parse(argv: Vec<String>, env_db_url: Option<String>) -> Result<Command, ArgsError> {
    let mut iter = argv.into_iter();
    let Some(first) = iter.next() else {
        return Ok(Command::Help);
    };

    let db_url = env_db_url
        .filter(|v| !v.trim().is_empty())
        .map_or_else(|| DEFAULT_DB_URL.to_string(), normalize_sqlite_url);

    match first.as_str() {
        "--help" | "-h" | "help" => Ok(Command::Help),
        "take" => parse_take(&mut iter, db_url).map(Command::Take),
        "results" => parse_results(&mut iter, db_url).map(Command::Results),
        _ => Err(ArgsError::UnknownCommand(first)),
    }
}

fn parse_take(
    args: &mut impl Iterator<Item = String>,
    mut db_url: String,
) -> Result<TakeArgs, ArgsError> {
    let mut exam_path = None;
    let mut session_id = None;
    let mut user_id = UserId::new(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--db" => db_url = parse_db(args)?,
            "--exam" => exam_path = Some(PathBuf::from(require_value(args, "--exam")?)),
            "--session" => {
                let value = require_value(args, "--session")?;
                session_id = Some(SessionId::new(value.trim()));
            }
            "--user" => user_id = UserId::new(parse_number(args, "--user")?),
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
    }

    Ok(TakeArgs {
        db_url,
        exam_path: exam_path.ok_or(ArgsError::MissingFlag { flag: "--exam" })?,
        session_id,
        user_id,
    })
}

fn parse_results(
    args: &mut impl Iterator<Item = String>,
    mut db_url: String,
) -> Result<ResultsArgs, ArgsError> {
    let mut exam_id = None;
    let mut limit = DEFAULT_RESULT_LIMIT;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--db" => db_url = parse_db(args)?,
            "--exam-id" => exam_id = Some(ExamId::new(parse_number(args, "--exam-id")?)),
            "--limit" => {
                let raw = parse_number(args, "--limit")?;
                limit = u32::try_from(raw).unwrap_or(u32::MAX);
            }
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
    }

    Ok(ResultsArgs {
        db_url,
        exam_id: exam_id.ok_or(ArgsError::MissingFlag { flag: "--exam-id" })?,
        limit,
    })
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<u64, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw: value })
}

fn parse_db(args: &mut impl Iterator<Item = String>) -> Result<String, ArgsError> {
    let value = require_value(args, "--db")?;
    if value.trim().is_empty() {
        return Err(ArgsError::InvalidDbUrl { raw: value });
    }
    Ok(normalize_sqlite_url(value))
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Creates the database file and its parent directories so the pool can open it.
pub fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}
