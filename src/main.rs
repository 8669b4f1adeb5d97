mod column_sort;
mod encoder;
mod error;
mod games;
mod importer;
mod pgn;
mod progress;
mod smart_sort;
mod store;

use anyhow::{Context, Result};
use column_sort::ColumnSorter;
use games::GameRow;
use importer::{ImportJob, ImportMode, ImportSession};
use progress::ConsoleProgress;
use std::path::PathBuf;
use store::GameStore;

const COL_WHITE: u32 = 1;
const COL_BLACK: u32 = 2;
const COL_EVENT: u32 = 3;
const COL_DATE: u32 = 4;
const COL_POPULARITY: u32 = 10;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("create") => run_import_command(ImportMode::Create, &args[1..]),
        Some("append") => run_import_command(ImportMode::Append, &args[1..]),
        Some("list") => run_list(&args[1..]),
        Some("--help") | Some("-h") | None => {
            usage();
            Ok(())
        }
        Some(other) => {
            eprintln!("unknown command: {other}");
            usage();
            std::process::exit(2);
        }
    }
}

fn usage() {
    println!("pgnvault");
    println!("  create <db> <pgn-or-dir>...   Build a new database from .pgn files");
    println!("  append <db> <pgn-or-dir>...   Add games to an existing database");
    println!("  list <db> [--sort <column>]   Print stored games;");
    println!("                                columns: white black event date popularity");
}

fn run_import_command(mode: ImportMode, args: &[String]) -> Result<()> {
    let [target, sources @ ..] = args else {
        eprintln!("usage: pgnvault {{create|append}} <db> <pgn-or-dir>...",);
        std::process::exit(2);
    };
    if sources.is_empty() {
        eprintln!("at least one source file or directory is required");
        std::process::exit(2);
    }

    let job = ImportJob {
        target: PathBuf::from(target),
        sources: sources.iter().map(PathBuf::from).collect(),
        mode,
    };
    let mut session = ImportSession::new();
    let mut progress = ConsoleProgress::new();
    let report = importer::run_import(&job, &mut session, &mut progress);
    progress.finish();

    if report.success {
        println!(
            "merged {} game(s) from {} file(s) into {}",
            report.games_merged, report.files_read, target
        );
        Ok(())
    } else {
        let message = report.error.unwrap_or_else(|| "unknown failure".to_string());
        match mode {
            ImportMode::Create => eprintln!("database creation failed: {message}"),
            ImportMode::Append => eprintln!("adding games to database failed: {message}"),
        }
        std::process::exit(1);
    }
}

fn run_list(args: &[String]) -> Result<()> {
    let mut target: Option<PathBuf> = None;
    let mut sort: Option<String> = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--sort" => {
                sort = iter.next().cloned();
                if sort.is_none() {
                    eprintln!("--sort requires a column name");
                    std::process::exit(2);
                }
            }
            _ if target.is_none() => target = Some(PathBuf::from(arg)),
            other => {
                eprintln!("unexpected argument: {other}");
                std::process::exit(2);
            }
        }
    }
    let Some(target) = target else {
        eprintln!("usage: pgnvault list <db> [--sort <column>]");
        std::process::exit(2);
    };

    let mut store = GameStore::open(&target)
        .with_context(|| format!("open database {}", target.display()))?;
    let mut rows: Vec<GameRow> = store
        .read_all()
        .context("read games")?
        .into_iter()
        .map(|(_, row)| row)
        .collect();
    store.close().context("close database")?;

    if let Some(column_name) = sort {
        let column = match column_name.as_str() {
            "white" => COL_WHITE,
            "black" => COL_BLACK,
            "event" => COL_EVENT,
            "date" => COL_DATE,
            "popularity" => COL_POPULARITY,
            other => {
                eprintln!("unknown sort column: {other}");
                std::process::exit(2);
            }
        };
        let mut sorter = column_sorter();
        sorter.click(column, &mut rows);
    }

    for row in &rows {
        println!(
            "{:<24} {:<24} {:<28} {:<12} {:>3} moves  {}",
            row.white_label(),
            row.black_label(),
            row.event.as_deref().unwrap_or(""),
            row.date.as_deref().unwrap_or(""),
            row.moves.len(),
            row.result.as_deref().unwrap_or("*"),
        );
    }
    Ok(())
}

fn column_sorter() -> ColumnSorter<GameRow> {
    let mut sorter = ColumnSorter::new(COL_POPULARITY);
    sorter.register(COL_WHITE, |a: &GameRow, b: &GameRow| {
        a.white_label().cmp(b.white_label())
    });
    sorter.register(COL_BLACK, |a: &GameRow, b: &GameRow| {
        a.black_label().cmp(b.black_label())
    });
    sorter.register(COL_EVENT, |a: &GameRow, b: &GameRow| {
        a.event.cmp(&b.event)
    });
    sorter.register(COL_DATE, |a: &GameRow, b: &GameRow| a.date.cmp(&b.date));
    sorter
}
