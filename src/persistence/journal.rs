//! Append-only JSON Lines journal with crash-safe replay.
//!
//! Each line is one [`JournalEntry`]: a monotonically increasing sequence
//! number, a timestamp, and a payload. Complete lines are always valid JSON;
//! a line torn by a crash mid-write is detected on replay and the file is
//! truncated back to the last complete entry.
//!
//! Appends are fsynced by default, so an entry that `append` returned for is
//! durable. Callers that batch many entries can use `append_with_sync(.., false)`
//! followed by a single [`Journal::sync`].

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::durable::fsync_file;

/// Errors that can occur during journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for journal operations.
pub type Result<T> = std::result::Result<T, JournalError>;

/// One line of a journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry<T> {
    pub seq: u64,
    pub ts: DateTime<Utc>,
    pub data: T,
}

/// An append-only journal of `T` payloads.
pub struct Journal<T> {
    file: File,
    path: PathBuf,
    next_seq: u64,
    _payload: PhantomData<fn(T)>,
}

impl<T> Journal<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Opens (or creates) a journal for appending at a known sequence number.
    ///
    /// Use [`Journal::recover`] instead when the file may already hold entries.
    pub fn open_with_seq(path: impl AsRef<Path>, next_seq: u64) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        Ok(Journal {
            file,
            path,
            next_seq,
            _payload: PhantomData,
        })
    }

    /// Replays an existing journal (truncating a torn tail) and opens it for
    /// appending after the last valid entry.
    pub fn recover(path: impl AsRef<Path>) -> Result<(Self, Vec<JournalEntry<T>>)> {
        let path = path.as_ref();
        let (entries, next_seq) = Self::replay(path)?;
        let journal = Self::open_with_seq(path, next_seq)?;
        Ok((journal, entries))
    }

    /// Appends a payload and fsyncs it.
    pub fn append(&mut self, data: T) -> Result<JournalEntry<T>> {
        self.append_with_sync(data, true)
    }

    /// Appends a payload with explicit fsync control.
    pub fn append_with_sync(&mut self, data: T, sync: bool) -> Result<JournalEntry<T>> {
        let entry = JournalEntry {
            seq: self.next_seq,
            ts: Utc::now(),
            data,
        };

        let json = serde_json::to_string(&entry)?;
        writeln!(self.file, "{}", json)?;

        if sync {
            fsync_file(&self.file)?;
        }

        self.next_seq += 1;
        Ok(entry)
    }

    /// Forces fsync of the journal file.
    pub fn sync(&self) -> io::Result<()> {
        fsync_file(&self.file)
    }

    /// Returns the next sequence number that will be assigned.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every valid entry, truncating any torn or corrupt tail.
    ///
    /// Returns `(entries, next_seq)`. A missing or empty file yields
    /// `(vec![], 0)`. Reading stops at the first line that fails to parse or
    /// whose sequence number does not increase; the file is cut back to the
    /// start of that line so later appends extend a valid prefix.
    pub fn replay(path: impl AsRef<Path>) -> Result<(Vec<JournalEntry<T>>, u64)> {
        let path = path.as_ref();

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((vec![], 0)),
            Err(e) => return Err(e.into()),
        };
        let file_len = file.metadata()?.len();

        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut last_valid_pos = 0u64;
        let mut current_pos = 0u64;
        let mut max_seq: Option<u64> = None;

        loop {
            let mut line = String::new();
            let bytes_read = match reader.read_line(&mut line) {
                Ok(n) => n,
                // Torn multi-byte sequence at EOF.
                Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
                Err(e) => return Err(e.into()),
            };
            if bytes_read == 0 {
                break;
            }

            let line_start = current_pos;
            current_pos += bytes_read as u64;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                last_valid_pos = current_pos;
                continue;
            }

            // A line without its newline was cut short, even if it parses.
            if !line.ends_with('\n') {
                last_valid_pos = line_start;
                break;
            }

            match serde_json::from_str::<JournalEntry<T>>(trimmed) {
                Ok(entry) if max_seq.is_none_or(|prev| entry.seq > prev) => {
                    max_seq = Some(entry.seq);
                    entries.push(entry);
                    last_valid_pos = current_pos;
                }
                _ => {
                    last_valid_pos = line_start;
                    break;
                }
            }
        }

        if last_valid_pos < file_len {
            warn!(
                path = %path.display(),
                kept_bytes = last_valid_pos,
                dropped_bytes = file_len - last_valid_pos,
                "Truncating torn journal tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(last_valid_pos)?;
            fsync_file(&file)?;
        }

        let next_seq = max_seq.map(|s| s + 1).unwrap_or(0);
        Ok((entries, next_seq))
    }
}
