//! Channel-identity lookup table and its background reload thread (§5
//! "Auxiliary threads": "Lookup-table reloaders run on their own
//! background thread, periodically re-reading a text file and swapping
//! the in-memory table under a mutex").
//!
//! The table's own file format and the radio-ID/talkgroup alias tables
//! are out-of-scope collaborators (§1: "radio-ID/talkgroup lookup-table
//! files...each exists in the repository but is glue around the core");
//! what belongs to the core is the reload mechanism itself — a shared,
//! read-mostly table a background thread swaps out wholesale on a
//! timer, read by the rest of the core without ever blocking on I/O.
//! This module implements that mechanism for the one lookup table §6
//! actually gives a config surface to: `system.iden_table.{file,time}`,
//! the channel-identity table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("failed to read lookup table file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed entry on line {line}: {text}")]
    MalformedLine { line: usize, text: String },
}

/// One row of the channel-identity table: a channel number and the RF
/// parameters a modem would need to tune to it. The core never acts on
/// these values itself (DSP/RF tuning is out of scope, §1) — it only
/// holds and serves them to whatever external surface asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdenEntry {
    pub channel_id: u8,
    pub base_frequency_hz: u64,
    pub tx_offset_hz: i64,
    pub channel_spacing_hz: u32,
}

/// An in-memory snapshot of the channel-identity table, keyed by channel
/// ID. Immutable once built; reloads build a fresh one and swap it in
/// wholesale rather than mutating entries in place.
#[derive(Debug, Clone, Default)]
pub struct IdenTable {
    entries: HashMap<u8, IdenEntry>,
}

impl IdenTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a text file of `channel_id,base_freq_hz,tx_offset_hz,spacing_hz`
    /// lines (blank lines and `#`-prefixed comments ignored).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LookupError> {
        let contents = std::fs::read_to_string(path)?;
        let mut entries = HashMap::new();
        for (idx, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let parsed = (|| -> Option<IdenEntry> {
                Some(IdenEntry {
                    channel_id: fields.first()?.parse().ok()?,
                    base_frequency_hz: fields.get(1)?.parse().ok()?,
                    tx_offset_hz: fields.get(2)?.parse().ok()?,
                    channel_spacing_hz: fields.get(3)?.parse().ok()?,
                })
            })();
            match parsed {
                Some(entry) => {
                    entries.insert(entry.channel_id, entry);
                }
                None => {
                    return Err(LookupError::MalformedLine {
                        line: idx + 1,
                        text: raw_line.to_string(),
                    });
                }
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, channel_id: u8) -> Option<IdenEntry> {
        self.entries.get(&channel_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A shared, thread-safe handle onto the current [`IdenTable`] snapshot.
/// Cloning is cheap (an `Arc` bump); every clone sees reloads performed
/// through any other clone.
#[derive(Clone)]
pub struct IdenTableHandle {
    inner: Arc<RwLock<IdenTable>>,
}

impl IdenTableHandle {
    pub fn new(table: IdenTable) -> Self {
        Self {
            inner: Arc::new(RwLock::new(table)),
        }
    }

    pub fn get(&self, channel_id: u8) -> Option<IdenEntry> {
        self.inner.read().get(channel_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    fn swap(&self, table: IdenTable) {
        *self.inner.write() = table;
    }
}

/// Owns the background reload thread for one [`IdenTableHandle`]. Dropping
/// it stops the thread and joins it; cloning `IdenTableHandle`s that
/// outlive the reloader keep serving the last-loaded snapshot (§7
/// "Lookup-reload": "file missing on reload → keep previous table in
/// memory" applies to every failed reload attempt, not only a missing
/// file at startup).
pub struct IdenTableReloader {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl IdenTableReloader {
    /// Spawn a thread that re-reads `path` every `period` and swaps the
    /// table into `handle` on success, leaving the previous snapshot in
    /// place on any read/parse failure (§5, §7).
    pub fn spawn(path: PathBuf, period: Duration, handle: IdenTableHandle) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);
        let join = std::thread::spawn(move || {
            while !stop_thread.load(Ordering::Relaxed) {
                std::thread::sleep(period);
                if stop_thread.load(Ordering::Relaxed) {
                    break;
                }
                match IdenTable::load(&path) {
                    Ok(table) => {
                        debug!(entries = table.len(), path = %path.display(), "reloaded channel-identity table");
                        handle.swap(table);
                    }
                    Err(err) => {
                        warn!(%err, path = %path.display(), "channel-identity table reload failed; keeping previous table");
                    }
                }
            }
        });
        Self {
            stop,
            join: Some(join),
        }
    }
}

impl Drop for IdenTableReloader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_lines_and_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iden_table.dat");
        std::fs::write(&path, "# comment\n\n1,851000000,-45000000,12500\n2,851012500,-45000000,12500\n").unwrap();
        let table = IdenTable::load(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get(1),
            Some(IdenEntry {
                channel_id: 1,
                base_frequency_hz: 851_000_000,
                tx_offset_hz: -45_000_000,
                channel_spacing_hz: 12_500,
            })
        );
    }

    #[test]
    fn malformed_line_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iden_table.dat");
        std::fs::write(&path, "not,a,valid,row\n").unwrap();
        assert!(IdenTable::load(&path).is_err());
    }

    #[test]
    fn missing_file_is_an_error_callers_can_treat_as_keep_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.dat");
        assert!(IdenTable::load(&path).is_err());
    }

    #[test]
    fn handle_reads_through_to_latest_swap() {
        let handle = IdenTableHandle::new(IdenTable::empty());
        assert!(handle.is_empty());
        let mut table = IdenTable::empty();
        table.entries.insert(
            5,
            IdenEntry {
                channel_id: 5,
                base_frequency_hz: 1,
                tx_offset_hz: 0,
                channel_spacing_hz: 1,
            },
        );
        handle.swap(table);
        assert_eq!(handle.len(), 1);
        assert!(handle.get(5).is_some());
    }

    #[test]
    fn reloader_picks_up_a_changed_file_and_keeps_prior_snapshot_on_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iden_table.dat");
        std::fs::write(&path, "1,851000000,-45000000,12500\n").unwrap();

        let handle = IdenTableHandle::new(IdenTable::load(&path).unwrap());
        let reloader = IdenTableReloader::spawn(path.clone(), Duration::from_millis(20), handle.clone());
        assert_eq!(handle.len(), 1);

        std::fs::write(&path, "1,851000000,-45000000,12500\n2,851012500,-45000000,12500\n").unwrap();
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(handle.len(), 2);

        std::fs::remove_file(&path).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        // Reload failed (file gone); previous two-entry snapshot is kept.
        assert_eq!(handle.len(), 2);

        drop(reloader);
    }
}
