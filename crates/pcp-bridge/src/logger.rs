//! Request log: persisted records plus the verbose log stream

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pcp_core::{ForwardResult, ReplyMessage, ResultRecorder};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Directory under the local data dir holding the log
pub const LOG_DIR_NAME: &str = "PCPForwarder";
pub const LOG_FILE_NAME: &str = "pcp-log.txt";

/// Log stream backlog per subscriber
const STREAM_CAPACITY: usize = 256;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// `<local data dir>/PCPForwarder/pcp-log.txt`, or the temp dir when the
/// platform has no local data dir.
pub fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(LOG_DIR_NAME)
        .join(LOG_FILE_NAME)
}

/// Process-wide verbose flag, shared by the bridge and the logger
#[derive(Debug, Clone, Default)]
pub struct Verbosity(Arc<AtomicBool>);

impl Verbosity {
    pub fn new(verbose: bool) -> Self {
        Self(Arc::new(AtomicBool::new(verbose)))
    }

    pub fn is_verbose(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, verbose: bool) {
        self.0.store(verbose, Ordering::SeqCst);
    }
}

/// Appends one line per forward result and streams results when verbose.
///
/// Lines are `yyyy-MM-dd HH:mm:ss.fff <json>`. The file and its directory
/// are created on the first record.
pub struct RequestLogger {
    path: PathBuf,
    file: Mutex<Option<File>>,
    verbosity: Verbosity,
    stream: broadcast::Sender<ReplyMessage>,
}

impl RequestLogger {
    pub fn new(path: impl Into<PathBuf>, verbosity: Verbosity) -> Self {
        let (stream, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            path: path.into(),
            file: Mutex::new(None),
            verbosity,
            stream,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn verbosity(&self) -> &Verbosity {
        &self.verbosity
    }

    /// Sender side of the log stream, for sessions to subscribe to
    pub fn stream(&self) -> broadcast::Sender<ReplyMessage> {
        self.stream.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplyMessage> {
        self.stream.subscribe()
    }

    fn append(&self, line: &str) -> io::Result<()> {
        let mut file = self.file.lock();
        if file.is_none() {
            if let Some(dir) = self.path.parent() {
                fs::create_dir_all(dir)?;
            }
            *file = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }
        match file.as_mut() {
            Some(file) => {
                file.write_all(line.as_bytes())?;
                file.flush()
            }
            None => Ok(()),
        }
    }
}

impl ResultRecorder for RequestLogger {
    fn record(&self, result: &ForwardResult) {
        let record = match serde_json::to_value(result) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Failed to serialize forward result");
                return;
            }
        };

        let line = format!(
            "{} {}\n",
            chrono::Local::now().format(TIMESTAMP_FORMAT),
            record
        );
        if let Err(e) = self.append(&line) {
            warn!(path = %self.path.display(), error = %e, "Failed to write request log");
            // Reopen on the next record
            *self.file.lock() = None;
        }

        if self.verbosity.is_verbose() {
            // No subscribers is fine
            let receivers = self.stream.send(ReplyMessage::log(record)).unwrap_or(0);
            debug!(receivers, "Streamed log record");
        }
    }
}

impl std::fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLogger")
            .field("path", &self.path)
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}
