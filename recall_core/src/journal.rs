//! Review journal: an append-only log of committed grades.
//!
//! Records are appended to a JSONL (JSON Lines) file with file locking
//! so several processes can log reviews safely.

use crate::{CardId, Result, ReviewRecord};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Destination for review records
pub trait ReviewSink {
    fn append(&mut self, record: &ReviewRecord) -> Result<()>;
}

/// JSONL-based review sink with file locking
pub struct JsonlJournal {
    path: PathBuf,
}

impl JsonlJournal {
    /// Create a new journal for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl ReviewSink for JsonlJournal {
    fn append(&mut self, record: &ReviewRecord) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        FileExt::lock_exclusive(&file)?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        FileExt::unlock(&file)?;

        tracing::debug!("Journaled review of card {}", record.card_id);
        Ok(())
    }
}

/// Read every record from a journal, oldest first
///
/// Lines that fail to parse (for example a write cut short by a crash) are
/// skipped with a warning.
pub fn read_reviews(path: &Path) -> Result<Vec<ReviewRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    FileExt::lock_shared(&file)?;

    let reader = BufReader::new(&file);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<ReviewRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Skipping journal line {}: {}", line_num + 1, e);
            }
        }
    }

    FileExt::unlock(&file)?;
    tracing::debug!("Read {} review records", records.len());
    Ok(records)
}

/// Review history of one card, oldest first
pub fn reviews_for_card(path: &Path, card_id: CardId) -> Result<Vec<ReviewRecord>> {
    Ok(read_reviews(path)?
        .into_iter()
        .filter(|record| record.card_id == card_id)
        .collect())
}
