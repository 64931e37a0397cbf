// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log of domain events.
//!
//! One JSON event per line, in seq order. Appends are buffered and
//! group-committed; `flush` forces the buffer to disk. A corrupt tail
//! (torn write, binary garbage) is quarantined on open: the damaged file
//! is rotated to `.bak` and a clean file is rewritten from the valid
//! prefix, with the lost seq range reported.

use chrono::{DateTime, Utc};
use cvr_core::event::{Event, ProposedEvent};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Buffered entries that trigger a flush.
const FLUSH_THRESHOLD: usize = 100;
/// Elapsed time since last flush that triggers a flush.
const FLUSH_INTERVAL_MS: u64 = 10;
/// Number of quarantined `.bak` files to keep.
const BAK_KEEP: u32 = 3;

/// Errors from WAL operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only event log file.
pub struct Wal {
    path: PathBuf,
    file: File,
    buffer: Vec<String>,
    last_flush: Instant,
    /// Seq of the last entry written (buffered or flushed).
    write_seq: u64,
    /// Seq of the last entry applied to derived state.
    processed_seq: u64,
}

impl Wal {
    /// Open (or create) the WAL, recovering from a corrupt tail if needed.
    ///
    /// `processed_seq` is the seq already covered by a snapshot; entries at
    /// or below it are retained but not re-surfaced by `entries_after`.
    pub fn open(path: &Path, processed_seq: u64) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (entries, corrupt) = read_valid_prefix(path)?;
        if corrupt {
            quarantine(path)?;
            // Rewrite a clean file containing only the valid prefix.
            let mut clean = File::create(path)?;
            for line in &entries {
                clean.write_all(line.as_bytes())?;
                clean.write_all(b"\n")?;
            }
            clean.sync_all()?;
        }

        let write_seq = entries
            .last()
            .and_then(|line| serde_json::from_str::<Event>(line).ok())
            .map(|e| e.seq)
            .unwrap_or(0);

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            buffer: Vec::new(),
            last_flush: Instant::now(),
            write_seq,
            processed_seq,
        })
    }

    /// Seq of the last appended entry.
    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// Seq of the last entry marked processed.
    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    /// Record that derived state has absorbed everything up to `seq`.
    pub fn mark_processed(&mut self, seq: u64) {
        if seq > self.processed_seq {
            self.processed_seq = seq;
        }
    }

    /// Assign the next seq, stamp the proposed event, and buffer it.
    ///
    /// The entry is durable only after [`flush`](Self::flush).
    pub fn append(
        &mut self,
        proposed: ProposedEvent,
        time: DateTime<Utc>,
    ) -> Result<Event, WalError> {
        let seq = self.write_seq + 1;
        let event = proposed.into_event(seq, time);
        let line = serde_json::to_string(&event)?;
        self.buffer.push(line);
        self.write_seq = seq;
        Ok(event)
    }

    /// True when the buffer is due for a group commit.
    pub fn needs_flush(&self) -> bool {
        !self.buffer.is_empty()
            && (self.buffer.len() >= FLUSH_THRESHOLD
                || self.last_flush.elapsed().as_millis() as u64 >= FLUSH_INTERVAL_MS)
    }

    /// Write buffered entries to disk and sync.
    pub fn flush(&mut self) -> Result<(), WalError> {
        if self.buffer.is_empty() {
            self.last_flush = Instant::now();
            return Ok(());
        }
        for line in &self.buffer {
            self.file.write_all(line.as_bytes())?;
            self.file.write_all(b"\n")?;
        }
        self.file.sync_data()?;
        self.buffer.clear();
        self.last_flush = Instant::now();
        Ok(())
    }

    /// All durable entries with seq strictly greater than `after`, in order.
    ///
    /// Flushes the buffer first so the answer for a given `after` is stable.
    /// Stops at the first unreadable line (a torn tail is invisible until
    /// the next open quarantines it).
    pub fn entries_after(&mut self, after: u64) -> Result<Vec<Event>, WalError> {
        self.flush()?;
        let (lines, _) = read_valid_prefix(&self.path)?;
        let mut out = Vec::new();
        for line in lines {
            match serde_json::from_str::<Event>(&line) {
                Ok(event) if event.seq > after => out.push(event),
                Ok(_) => {}
                Err(_) => break,
            }
        }
        Ok(out)
    }

}

/// Read the longest valid prefix of JSONL event lines, reporting whether
/// anything after it was corrupt.
fn read_valid_prefix(path: &Path) -> Result<(Vec<String>, bool), WalError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), false)),
        Err(e) => return Err(e.into()),
    };
    let mut reader = BufReader::new(file);
    let mut lines = Vec::new();
    let mut corrupt = false;
    let mut last_seq = 0u64;
    loop {
        let mut raw = Vec::new();
        let n = reader.read_until(b'\n', &mut raw)?;
        if n == 0 {
            break;
        }
        let Ok(text) = std::str::from_utf8(&raw) else {
            corrupt = true;
            break;
        };
        let text = text.trim_end();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(text) {
            Ok(event) if event.seq > last_seq => {
                last_seq = event.seq;
                lines.push(text.to_string());
            }
            _ => {
                corrupt = true;
                break;
            }
        }
    }
    if corrupt {
        tracing::warn!(
            path = %path.display(),
            valid_entries = lines.len(),
            last_seq,
            "WAL has a corrupt tail; entries after seq {} are lost",
            last_seq
        );
    }
    Ok((lines, corrupt))
}

/// Rotate a damaged WAL file to `.bak`, shifting older backups and keeping
/// at most [`BAK_KEEP`].
fn quarantine(path: &Path) -> Result<(), WalError> {
    let bak_path = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{}", n))
        }
    };
    // Evict the oldest, then shift each backup down one slot.
    let oldest = bak_path(BAK_KEEP);
    if oldest.exists() {
        std::fs::remove_file(&oldest)?;
    }
    for n in (1..BAK_KEEP).rev() {
        let from = bak_path(n);
        if from.exists() {
            std::fs::rename(&from, bak_path(n + 1))?;
        }
    }
    std::fs::rename(path, bak_path(1))?;
    Ok(())
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
