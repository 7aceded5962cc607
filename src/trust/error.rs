//! Error taxonomy for the trust subsystem.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building the trust engine or operating its store.
///
/// Connection-level rejections are not errors: they are carried as data in
/// [`Verdict::Rejected`](crate::trust::Verdict), since a rejection is a
/// normal outcome of an evaluation.
#[derive(Debug, Error)]
pub enum TrustError {
    /// Unrecognized trust mode or missing configuration input. Fatal at
    /// startup, never per-connection.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The known-servers file violates the entry grammar or the one-entry-per
    /// -peer invariant. Fatal at load time; malformed lines are never skipped.
    #[error("corrupt known-servers store {}: line {line}: {reason}", path.display())]
    CorruptStore {
        /// Path of the offending file.
        path: PathBuf,
        /// 1-based line number of the first offending line.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// I/O failure reading or durably writing the known-servers store.
    #[error("known-servers store unavailable: {0}")]
    StoreUnavailable(#[from] io::Error),
}
