//! Durable known-servers fingerprint store.
//!
//! The store is a line-oriented text file mapping `host:port` to the SHA-256
//! fingerprint of the peer's leaf certificate:
//!
//! ```text
//! # free-form comment lines, preserved verbatim and in position
//! node.example.com:9494 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08
//! ```
//!
//! At most one entry exists per peer identity. Mutations append after the
//! existing content and are persisted by writing a complete replacement of the
//! file to a temporary sibling, fsyncing it and atomically renaming it into
//! place, so a crash mid-write can never leave a torn or half-written store.
//! Reads proceed concurrently; writers are serialized by an in-process lock.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::error::TrustError;
use super::fingerprint::{Fingerprint, PeerId};

/// One persisted line of the store file.
#[derive(Debug, Clone)]
enum Line {
    /// A `#` comment, kept verbatim.
    Comment(String),
    /// A `host:port fingerprint` entry.
    Entry(PeerId, Fingerprint),
}

#[derive(Debug, Default)]
struct Inner {
    lines: Vec<Line>,
    index: HashMap<PeerId, Fingerprint>,
}

impl Inner {
    fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Comment(text) => out.push_str(text),
                Line::Entry(peer, fingerprint) => {
                    let _ = write!(out, "{peer} {fingerprint}");
                }
            }
            out.push('\n');
        }
        out
    }
}

/// Outcome of [`KnownServersStore::record_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// No entry existed; the new one is now durably on disk.
    Inserted,
    /// An entry already existed; its fingerprint is returned so the caller can
    /// decide match/mismatch policy.
    Existing(Fingerprint),
}

/// Durable, mutable mapping from peer identity to certificate fingerprint.
///
/// The store is loaded once at client startup and outlives any single
/// connection. It is only ever mutated by successful first-use acceptances.
#[derive(Debug)]
pub struct KnownServersStore {
    path: PathBuf,
    inner: RwLock<Inner>,
}

impl KnownServersStore {
    /// Open the store backed by `path`. A missing file is an empty store; a
    /// file with malformed non-comment lines or duplicate identities fails
    /// with [`TrustError::CorruptStore`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TrustError> {
        let path = path.into();
        let inner = match fs::read_to_string(&path) {
            Ok(text) => parse(&path, &text)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Inner::default(),
            Err(err) => return Err(TrustError::StoreUnavailable(err)),
        };
        debug!(
            path = %path.display(),
            entries = inner.index.len(),
            "known-servers store loaded"
        );
        Ok(Self {
            path,
            inner: RwLock::new(inner),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entry lines (comments excluded).
    pub fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fingerprint recorded for `peer`, if any. Safe to call concurrently.
    pub fn lookup(&self, peer: &PeerId) -> Option<Fingerprint> {
        self.inner.read().index.get(peer).copied()
    }

    /// Snapshot of all recorded entries, e.g. for whitelist use.
    pub fn snapshot(&self) -> HashMap<PeerId, Fingerprint> {
        self.inner.read().index.clone()
    }

    /// Insert `fingerprint` for `peer` unless an entry already exists.
    ///
    /// The write lock spans check, durable persist and in-memory commit, so
    /// concurrent calls for the same identity observe one linearization:
    /// exactly one insert wins, and later callers are handed the stored value.
    /// The entry becomes visible in memory only after the file write durably
    /// succeeded; a failed persist leaves the store exactly as it was.
    pub fn record_if_absent(
        &self,
        peer: &PeerId,
        fingerprint: Fingerprint,
    ) -> Result<RecordOutcome, TrustError> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.index.get(peer) {
            return Ok(RecordOutcome::Existing(*existing));
        }

        let mut contents = inner.render();
        let _ = writeln!(contents, "{peer} {fingerprint}");
        self.persist(&contents)?;

        inner.index.insert(peer.clone(), fingerprint);
        inner.lines.push(Line::Entry(peer.clone(), fingerprint));
        info!(%peer, %fingerprint, "recorded first-use fingerprint");
        Ok(RecordOutcome::Inserted)
    }

    /// Write a complete replacement of the backing file and atomically swap it
    /// into place. Never patches the file in place.
    fn persist(&self, contents: &str) -> Result<(), TrustError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|err| TrustError::StoreUnavailable(err.error))?;
        Ok(())
    }
}

fn parse(path: &Path, text: &str) -> Result<Inner, TrustError> {
    let corrupt = |line: usize, reason: String| TrustError::CorruptStore {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut inner = Inner::default();
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        if raw.starts_with('#') {
            inner.lines.push(Line::Comment(raw.to_string()));
            continue;
        }
        let (id_field, fp_field) = raw
            .split_once(' ')
            .ok_or_else(|| corrupt(line_no, "expected `host:port fingerprint`".to_string()))?;
        let peer: PeerId = id_field
            .parse()
            .map_err(|err: super::fingerprint::InvalidPeerId| corrupt(line_no, err.to_string()))?;
        let fingerprint: Fingerprint = fp_field
            .parse()
            .map_err(|err: super::fingerprint::InvalidFingerprint| {
                corrupt(line_no, err.to_string())
            })?;
        if inner.index.insert(peer.clone(), fingerprint).is_some() {
            return Err(corrupt(line_no, format!("duplicate entry for {peer}")));
        }
        inner.lines.push(Line::Entry(peer, fingerprint));
    }
    Ok(inner)
}
