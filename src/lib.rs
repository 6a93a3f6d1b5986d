//! # bpc-utils - Shared runtime for backport compilers
//!
//! Utility layer used by source-to-source converters that rewrite a batch of
//! files: fan the work out to a worker pool, read input text from strings or
//! seekable streams, and detect the conventions of the code being rewritten.
//!
//! ## Features
//!
//! - **Parallel dispatch**: ordered results from a crossbeam worker pool, with
//!   a sequential path that produces identical output
//! - **Crash isolation**: a failing task becomes a reported result, a crashing
//!   worker aborts the run
//! - **Text sources**: strings and seekable streams behind one reader that
//!   puts the stream cursor back where it found it
//! - **Detection**: line separators, indentation and source encodings
//! - **Backups**: gzipped tar archives of files about to be rewritten, and
//!   recovery from them
//! - **Configuration**: `bpc.toml` plus `BPC_*` environment variables
//!
//! ## Quick Start
//!
//! ```
//! use bpc_utils::dispatch;
//!
//! let results = dispatch(["a", "b"], |s, _ctx| Ok(s.to_uppercase()), Some(2), false)?;
//! let values: Vec<_> = results.iter().filter_map(|r| r.value().cloned()).collect();
//! assert_eq!(values, ["A", "B"]);
//! # Ok::<(), bpc_utils::DispatchError>(())
//! ```

pub mod config;
pub mod detect;
pub mod error;
pub mod files;
pub mod logging;
pub mod misc;
pub mod options;
pub mod parallel;
pub mod shared;
pub mod text_source;

pub use config::DispatchConfig;
pub use detect::{decode_source, detect_encoding, detect_indentation, detect_linesep};
pub use error::{DispatchError, RecoveryError, SourceError};
pub use files::{Cleanup, FileFilter, archive_files, detect_files, recover_files, recover_files_with};
pub use options::Linesep;
pub use parallel::{
    Capabilities, DispatchOptions, Dispatcher, TaskContext, TaskFailure, TaskLock, TaskResult,
    dispatch,
};
pub use text_source::{SourceInput, TextSource};

/// Result type alias for helper operations
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
