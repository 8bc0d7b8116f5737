//! Deck persistence adapters.
//!
//! The card store only needs two calls: load everything, and replace
//! everything. Each `save_all` is all-or-nothing.

use crate::{Error, Flashcard, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

/// Default upper bound on waiting for the deck lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Storage backend for a deck of flashcards
pub trait PersistenceAdapter: Send + Sync {
    fn load(&self) -> Result<Vec<Flashcard>>;
    fn save_all(&self, cards: &[Flashcard]) -> Result<()>;
}

impl<A: PersistenceAdapter + ?Sized> PersistenceAdapter for Arc<A> {
    fn load(&self) -> Result<Vec<Flashcard>> {
        (**self).load()
    }

    fn save_all(&self, cards: &[Flashcard]) -> Result<()> {
        (**self).save_all(cards)
    }
}

/// In-process adapter holding the last saved snapshot
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    cards: Mutex<Vec<Flashcard>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the adapter with an existing deck
    pub fn with_cards(cards: Vec<Flashcard>) -> Self {
        Self {
            cards: Mutex::new(cards),
        }
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn load(&self) -> Result<Vec<Flashcard>> {
        let cards = self
            .cards
            .lock()
            .map_err(|_| Error::State("memory adapter lock poisoned".into()))?;
        Ok(cards.clone())
    }

    fn save_all(&self, cards: &[Flashcard]) -> Result<()> {
        let mut stored = self
            .cards
            .lock()
            .map_err(|_| Error::State("memory adapter lock poisoned".into()))?;
        *stored = cards.to_vec();
        Ok(())
    }
}

/// JSON document on disk, guarded by a sidecar lock file.
///
/// The adapter remembers the deck contents it last read or wrote. A save
/// only replaces the file if it still holds exactly those contents, so a
/// second adapter working from an older load cannot overwrite changes it
/// never saw. One adapter serves one store.
pub struct JsonFileAdapter {
    path: PathBuf,
    lock_timeout: Duration,
    /// `None` while no deck file is expected on disk
    baseline: Mutex<Option<String>>,
}

impl JsonFileAdapter {
    /// Create an adapter for the given deck path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            baseline: Mutex::new(None),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn baseline(&self) -> MutexGuard<'_, Option<String>> {
        self.baseline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the sidecar lock file and take a lock on it, giving up after `lock_timeout`
    fn acquire_lock(&self, exclusive: bool) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;

        let deadline = Instant::now() + self.lock_timeout;
        loop {
            let attempt = if exclusive {
                FileExt::try_lock_exclusive(&lock_file)
            } else {
                FileExt::try_lock_shared(&lock_file)
            };

            match attempt {
                Ok(()) => return Ok(lock_file),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if Instant::now() >= deadline {
                        tracing::warn!(
                            "Timed out after {:?} waiting for deck lock {:?}",
                            self.lock_timeout,
                            self.lock_path()
                        );
                        return Err(Error::Timeout(self.lock_timeout));
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Raw deck contents, or `None` if there is no deck file yet
    fn read_deck(&self) -> Result<Option<String>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut contents = String::new();
        std::io::BufReader::new(file).read_to_string(&mut contents)?;
        Ok(Some(contents))
    }

    /// Replace the deck with `contents` if the file is as this adapter last saw it.
    /// Caller holds the exclusive lock.
    fn replace_if_unchanged(&self, dir: &Path, contents: String) -> Result<()> {
        let mut baseline = self.baseline();
        if self.read_deck()? != *baseline {
            tracing::warn!(
                "Deck file {:?} changed on disk since it was loaded, refusing to overwrite",
                self.path
            );
            return Err(Error::Persistence(format!(
                "Deck file {:?} was changed by another process since it was loaded",
                self.path
            )));
        }

        write_atomically(dir, &self.path, contents.as_bytes())?;
        *baseline = Some(contents);
        Ok(())
    }
}

impl PersistenceAdapter for JsonFileAdapter {
    /// Load the deck with a shared lock.
    ///
    /// A missing file is an empty deck. A corrupt file is an error: silently
    /// starting over would discard every card's schedule.
    fn load(&self) -> Result<Vec<Flashcard>> {
        let lock = self.acquire_lock(false)?;
        let read = self.read_deck();
        let _ = FileExt::unlock(&lock);

        let Some(contents) = read? else {
            tracing::info!("No deck file found at {:?}, starting empty", self.path);
            *self.baseline() = None;
            return Ok(Vec::new());
        };

        let cards: Vec<Flashcard> = serde_json::from_str(&contents).map_err(|e| {
            tracing::warn!("Failed to parse deck file {:?}: {}", self.path, e);
            Error::Json(e)
        })?;
        *self.baseline() = Some(contents);

        tracing::debug!("Loaded {} cards from {:?}", cards.len(), self.path);
        Ok(cards)
    }

    /// Save the deck with an exclusive lock
    ///
    /// Atomically writes the deck by:
    /// 1. Checking the file still holds what this adapter last saw
    /// 2. Writing to a temp file and syncing it to disk
    /// 3. Renaming over the deck file
    fn save_all(&self, cards: &[Flashcard]) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "deck path missing parent")
        })?;
        let contents = serde_json::to_string(cards)?;

        let lock = self.acquire_lock(true)?;
        let result = self.replace_if_unchanged(parent, contents);
        let _ = FileExt::unlock(&lock);
        result?;

        tracing::debug!("Saved {} cards to {:?}", cards.len(), self.path);
        Ok(())
    }
}

fn write_atomically(dir: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
