//! Snapshot persistence.
//!
//! The whole services state is written as a sequence of typed rows and read
//! back the same way. Rows are produced and consumed through the
//! [`RowWriter`] and [`RowReader`] traits so record codecs stay independent
//! of the storage format; [`flatfile`] is the only backend.
//!
//! # Row format
//!
//! ```text
//! TYPE word word ... [string to end of row]
//! ```
//!
//! Words never contain whitespace and are never empty (`*` stands for an
//! absent optional word). At most one free-form string is allowed per row
//! and it is always the last field; backslashes, newlines and carriage
//! returns in it are escaped as `\\`, `\n` and `\r`.

pub mod flatfile;
mod records;

pub use flatfile::{FlatFileReader, FlatFileWriter, FlatRow};
pub use records::DB_VERSION;

use crate::error::DbError;
use crate::state::Matrix;
use crate::telemetry::{OpTimer, spans};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Sink for snapshot rows.
pub trait RowWriter {
    fn start_row(&mut self, kind: &str) -> Result<(), DbError>;
    fn write_word(&mut self, word: &str) -> Result<(), DbError>;
    /// Free-form trailing string; must be the last field of the row.
    fn write_str(&mut self, s: &str) -> Result<(), DbError>;
    fn write_int(&mut self, n: i64) -> Result<(), DbError>;
    fn write_uint(&mut self, n: u64) -> Result<(), DbError>;
    fn write_time(&mut self, t: i64) -> Result<(), DbError>;
    fn commit_row(&mut self) -> Result<(), DbError>;
    /// Drop the row started last without writing it.
    fn discard_row(&mut self);
}

/// Source of fields for one snapshot row.
pub trait RowReader {
    /// Line (or record) number, for error reports.
    fn line(&self) -> usize;
    fn read_word(&mut self) -> Result<&str, DbError>;
    /// Everything left in the row, unescaped.
    fn read_str(&mut self) -> Result<String, DbError>;

    fn read_int(&mut self) -> Result<i64, DbError> {
        let line = self.line();
        let word = self.read_word()?;
        word.parse()
            .map_err(|_| DbError::parse(line, format!("expected integer, got {word:?}")))
    }

    fn read_uint(&mut self) -> Result<u64, DbError> {
        let line = self.line();
        let word = self.read_word()?;
        word.parse()
            .map_err(|_| DbError::parse(line, format!("expected unsigned integer, got {word:?}")))
    }

    fn read_time(&mut self) -> Result<i64, DbError> {
        self.read_int()
    }
}

impl Matrix {
    /// Write the current state to `path`.
    ///
    /// The snapshot is written next to the target and renamed over it, so
    /// a crash mid-write leaves the previous snapshot intact.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DbError> {
        let path = path.as_ref();
        let span = spans::snapshot("save", &path.display().to_string());
        let _enter = span.enter();
        let _timer = OpTimer::new("snapshot_save");

        let tmp = path.with_extension("new");
        {
            let mut writer = FlatFileWriter::new(BufWriter::new(File::create(&tmp)?));
            self.write_rows(&mut writer)?;
            writer.into_inner().flush()?;
        }
        fs::rename(&tmp, path)?;

        info!(
            accounts = self.entities_of(crate::state::EntityKind::Account).count(),
            channels = self.channels.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    /// Load a snapshot into this (normally empty) state, then reconcile
    /// accounts with their nicknames.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), DbError> {
        let path = path.as_ref();
        let span = spans::snapshot("load", &path.display().to_string());
        let _enter = span.enter();
        let _timer = OpTimer::new("snapshot_load");

        let reader = FlatFileReader::new(BufReader::new(File::open(path)?));
        let rows = self.read_rows(reader)?;
        self.db_check();

        info!(
            rows,
            accounts = self.entities_of(crate::state::EntityKind::Account).count(),
            channels = self.channels.len(),
            "Snapshot loaded"
        );
        Ok(())
    }
}
