//! Ingestion notices.
//!
//! Every ingestion run reports a start, then either a completion or a
//! failure. Notices go to **stderr** so stdout stays reserved for the chat.

use std::io::Write;
use std::path::PathBuf;

use crate::models::SourceKind;

/// A single notice emitted by the ingestion adapter.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestEvent {
    /// About to contact the source.
    Starting { source: SourceKind },
    /// A file or directory was written into the staging directory.
    Fetched { source: SourceKind, path: PathBuf },
    /// The run finished and wrote `files` files.
    Completed { source: SourceKind, files: u64 },
    /// The run failed. `message` is the user-facing description.
    Failed { source: SourceKind, message: String },
}

/// Receives ingestion notices.
pub trait IngestReporter: Send + Sync {
    fn report(&self, event: IngestEvent);
}

/// Human-friendly notices on stderr: "Starting download from s3...".
///
/// The failure notice only marks the end of the run; the caller prints the
/// error itself.
pub struct StderrProgress;

fn human_line(event: &IngestEvent) -> String {
    match event {
        IngestEvent::Starting { source } => format!("Starting download from {}...\n", source),
        IngestEvent::Fetched { path, .. } => format!("  fetched {}\n", path.display()),
        IngestEvent::Completed { files, .. } => {
            format!("Download completed ({} files).\n", format_number(*files))
        }
        IngestEvent::Failed { source, .. } => format!("Download from {} failed.\n", source),
    }
}

impl IngestReporter for StderrProgress {
    fn report(&self, event: IngestEvent) {
        let line = human_line(&event);
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable notices: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestReporter for JsonProgress {
    fn report(&self, event: IngestEvent) {
        let obj = match &event {
            IngestEvent::Starting { source } => serde_json::json!({
                "event": "ingest",
                "source": source.label(),
                "phase": "starting"
            }),
            IngestEvent::Fetched { source, path } => serde_json::json!({
                "event": "ingest",
                "source": source.label(),
                "phase": "fetched",
                "path": path.display().to_string()
            }),
            IngestEvent::Completed { source, files } => serde_json::json!({
                "event": "ingest",
                "source": source.label(),
                "phase": "completed",
                "files": files
            }),
            IngestEvent::Failed { source, message } => serde_json::json!({
                "event": "ingest",
                "source": source.label(),
                "phase": "failed",
                "message": message
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when notices are disabled.
pub struct NoProgress;

impl IngestReporter for NoProgress {
    fn report(&self, _event: IngestEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Notice mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human notices when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
