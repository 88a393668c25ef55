mod args;
mod take;

use services::PersistenceAdapter;
use storage::Storage;
use tracing_subscriber::EnvFilter;

use args::{Command, ResultsArgs};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("services=info,app=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn list_results(args: ResultsArgs, storage: Storage) -> Result<(), Box<dyn std::error::Error>> {
    let persistence = PersistenceAdapter::local(storage);
    let rows = persistence.list_results(args.exam_id, args.limit).await?;
    if rows.is_empty() {
        println!("no results for exam {}", args.exam_id);
        return Ok(());
    }

    for row in rows {
        let r = row.result;
        println!(
            "#{:<4} {}  user {:<6} {:>3}%  {:<10} {}/{} pt  session {}",
            row.id,
            r.completed_at.format("%Y-%m-%d %H:%M"),
            r.user_id,
            r.percentage,
            if r.passed { "passed" } else { "not passed" },
            r.score,
            r.total_points,
            r.session_id
        );
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cmd = args::parse(argv, std::env::var("EXAM_DB_URL").ok()).map_err(|e| {
        eprintln!("{e}");
        args::print_usage();
        e
    })?;

    match cmd {
        Command::Help => {
            args::print_usage();
            Ok(())
        }
        Command::Take(take_args) => {
            // Open + migrate SQLite in the binary glue so core/services stay storage-agnostic.
            args::prepare_sqlite_file(&take_args.db_url)?;
            let storage = Storage::sqlite(&take_args.db_url).await?;
            take::run(take_args, storage).await
        }
        Command::Results(results) => {
            args::prepare_sqlite_file(&results.db_url)?;
            let storage = Storage::sqlite(&results.db_url).await?;
            list_results(results, storage).await
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
