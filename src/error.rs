//! Typed errors for the dispatch core, text sources and backup recovery.
//!
//! Per-task failures are not errors at this level: they are captured into
//! [`TaskResult`](crate::parallel::TaskResult)s. Only conditions that abort a
//! whole session or refuse an input show up here.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while opening or reading a [`TextSource`](crate::text_source::TextSource).
#[derive(Debug, Error)]
pub enum SourceError {
    /// The input cannot be wrapped, e.g. a stream that cannot report its position.
    #[error("unsupported source kind: {0}")]
    UnsupportedSourceKind(String),
    #[error("source content is not valid UTF-8: {0}")]
    InvalidText(#[from] std::string::FromUtf8Error),
    #[error("source I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Infrastructure failures that end a dispatch session.
///
/// When one of these is returned every worker has already been joined.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("worker {worker_id} crashed while running task {index}: {message}")]
    WorkerPanicked {
        worker_id: usize,
        index: usize,
        message: String,
    },
    #[error("worker pool lost results: expected {expected}, received {received}")]
    ResultsLost { expected: usize, received: usize },
}

/// Problems locating or reading a backup archive to restore from.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("no archive files found in '{}'", .0.display())]
    NoArchive(PathBuf),
    #[error("more than one item found in '{}'", .0.display())]
    MultipleItems(PathBuf),
    #[error("item '{item}' in '{}' is not a regular file", .dir.display())]
    NotAFile { item: String, dir: PathBuf },
    /// The lookup table names a member outside the extraction directory.
    #[error("archive member '{0}' is not a plain file name")]
    InvalidMember(String),
    #[error("archive I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
