use crate::error::ImportError;
use crate::pgn::{GameStream, StreamOutcome};
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::store::GameStore;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Build a new database file; the target must not exist yet.
    Create,
    /// Add games to an existing database file.
    Append,
}

/// One user-requested import: a target database and an ordered list of
/// candidate sources. Sources that do not exist are silently dropped;
/// directory sources expand to the `.pgn` files they contain.
#[derive(Debug, Clone)]
pub struct ImportJob {
    pub target: PathBuf,
    pub sources: Vec<PathBuf>,
    pub mode: ImportMode,
}

/// Per-run context. Holds the single latest-error slot, cleared when a run
/// starts; there is no ambient error state anywhere else.
#[derive(Debug, Default)]
pub struct ImportSession {
    last_error: Option<ImportError>,
}

impl ImportSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn clear(&mut self) {
        self.last_error = None;
    }

    fn record(&mut self, error: ImportError) {
        warn!(%error, "import failure recorded");
        self.last_error = Some(error);
    }

    pub fn last_error(&self) -> Option<&ImportError> {
        self.last_error.as_ref()
    }
}

/// What a run accomplished. `success` is the contract with callers: a
/// dialog or scripted session is only complete when it is true.
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub success: bool,
    pub files_read: usize,
    pub games_merged: u64,
    pub error: Option<String>,
}

/// Run a bulk import. The whole multi-file ingest happens inside one store
/// transaction: no reader ever sees a half-merged file. A failure mid-way
/// through the file list keeps the games merged from earlier files
/// (best-effort, not rollback-to-empty); a failed create-mode run removes
/// the new target file as if it had never existed, while append mode never
/// touches the pre-existing target.
pub fn run_import(
    job: &ImportJob,
    session: &mut ImportSession,
    progress: &mut dyn ProgressSink,
) -> ImportReport {
    session.clear();

    let sources = resolve_sources(&job.sources);
    if let Err(error) = validate(job, &sources) {
        session.record(error);
        return failed_report(session);
    }

    let store = match job.mode {
        ImportMode::Create => GameStore::create(&job.target),
        ImportMode::Append => GameStore::open(&job.target),
    };
    let mut store = match store {
        Ok(store) => store,
        Err(err) => {
            session.record(ImportError::Storage(err.to_string()));
            // GameStore::create fails without leaving a file behind, so
            // there is nothing to clean up in either mode.
            return failed_report(session);
        }
    };

    let mut files_read = 0usize;
    let mut games_merged = 0u64;
    ingest(
        &mut store,
        &sources,
        job.mode,
        session,
        progress,
        &mut files_read,
        &mut games_merged,
    );

    if let Err(err) = store.close() {
        if session.last_error.is_none() {
            session.record(ImportError::Storage(err.to_string()));
        }
    }

    if session.last_error.is_some() {
        if job.mode == ImportMode::Create {
            // Treat the new database as never having existed. Append mode
            // must never delete or truncate the pre-existing target.
            if let Err(err) = fs::remove_file(&job.target) {
                warn!(target = %job.target.display(), %err, "could not remove failed database");
            }
        }
        let mut report = failed_report(session);
        report.files_read = files_read;
        report.games_merged = games_merged;
        return report;
    }

    debug!(files = files_read, games = games_merged, "import committed");
    ImportReport {
        success: true,
        files_read,
        games_merged,
        error: None,
    }
}

fn validate(job: &ImportJob, sources: &[PathBuf]) -> Result<(), ImportError> {
    match job.mode {
        ImportMode::Create => {
            if job.target.as_os_str().is_empty() {
                return Err(ImportError::Validation(
                    "no database file specified".to_string(),
                ));
            }
            if job.target.exists() {
                return Err(ImportError::Validation(format!(
                    "database file {} already exists",
                    job.target.display()
                )));
            }
        }
        ImportMode::Append => {
            if !job.target.exists() {
                return Err(ImportError::Validation(format!(
                    "database file {} does not exist",
                    job.target.display()
                )));
            }
        }
    }
    if sources.is_empty() {
        return Err(ImportError::Validation(
            "no usable pgn files specified".to_string(),
        ));
    }
    Ok(())
}

/// Keep existing files, expand directories to the `.pgn` files inside them
/// (sorted), and silently drop everything else.
pub fn resolve_sources(candidates: &[PathBuf]) -> Vec<PathBuf> {
    let mut resolved = Vec::new();
    for candidate in candidates {
        if candidate.is_file() {
            resolved.push(candidate.clone());
        } else if candidate.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(candidate)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file() && is_pgn(entry.path()))
                .map(|entry| entry.into_path())
                .collect();
            found.sort();
            resolved.extend(found);
        }
    }
    resolved
}

fn is_pgn(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pgn"))
        == Some(true)
}

#[allow(clippy::too_many_arguments)]
fn ingest(
    store: &mut GameStore,
    sources: &[PathBuf],
    mode: ImportMode,
    session: &mut ImportSession,
    progress: &mut dyn ProgressSink,
    files_read: &mut usize,
    games_merged: &mut u64,
) {
    if let Err(err) = store.begin_transaction() {
        session.record(ImportError::Storage(err.to_string()));
        return;
    }
    if mode == ImportMode::Create {
        if let Err(err) = store.create_schema() {
            session.record(ImportError::Storage(err.to_string()));
            return;
        }
    }
    // Ids stay monotonic across runs: seed from what is already stored.
    let mut next_id = store.count_records();

    let file_count = sources.len();
    for (file_index, path) in sources.iter().enumerate() {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(_) => {
                session.record(ImportError::Io(path.display().to_string()));
                break;
            }
        };
        let bytes_total = file.metadata().map(|m| m.len()).unwrap_or(0);
        debug!(path = %path.display(), bytes = bytes_total, "reading source file");

        let stream = GameStream::new(BufReader::new(file), bytes_total);
        let mut cancel = |bytes_done: u64, bytes_total: u64| {
            progress.report(&ProgressUpdate {
                file_index,
                file_count,
                bytes_done,
                bytes_total,
            })
        };
        let outcome = stream.run(&mut cancel, |row| {
            store
                .insert_game(next_id, &row)
                .map_err(|err| err.to_string())?;
            next_id += 1;
            *games_merged += 1;
            Ok(())
        });

        match outcome {
            StreamOutcome::Completed => {
                *files_read += 1;
            }
            StreamOutcome::Cancelled => {
                session.record(ImportError::Cancelled);
                break;
            }
            StreamOutcome::Failed(message) => {
                // Create mode surfaces the parser's own message when it has
                // one; append mode reports a plain cancellation.
                if mode == ImportMode::Create && !message.is_empty() {
                    session.record(ImportError::Parse(message));
                } else {
                    session.record(ImportError::Cancelled);
                }
                break;
            }
        }
    }

    // Even after a mid-list failure the games merged so far are kept:
    // flush and commit still run. Only validation failures skip this path,
    // and those never reach here.
    if let Err(err) = store.flush() {
        session.record(ImportError::Storage(err.to_string()));
        return;
    }
    if let Err(err) = store.end_transaction() {
        session.record(ImportError::Storage(err.to_string()));
        return;
    }
    if mode == ImportMode::Create {
        if let Err(err) = store.create_indexes() {
            session.record(ImportError::Storage(err.to_string()));
        }
    }
}

fn failed_report(session: &ImportSession) -> ImportReport {
    ImportReport {
        success: false,
        files_read: 0,
        games_merged: 0,
        error: session.last_error.as_ref().map(|e| e.to_string()),
    }
}
