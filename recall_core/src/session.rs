//! Review session controller.
//!
//! A session walks a frozen snapshot of due cards exactly once:
//!
//! ```text
//! Idle --start--> Presenting --reveal--> Revealed --grade--> Presenting | Completed
//!   ^                                                                       |
//!   +------------------------------ cancel (from anywhere) -----------------+
//! ```
//!
//! Grades are written to the card store immediately, one card at a time.
//! The session lock is never held across a store write, so `cancel` is
//! always available; a write that finishes after cancellation stays
//! committed but no longer moves the session.

use crate::{CardStore, Error, Flashcard, Grade, Result};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Observable position of a review session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Presenting { card: Flashcard, index: usize },
    Revealed { card: Flashcard, index: usize },
    Completed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Presenting { .. } => "presenting",
            SessionState::Revealed { .. } => "revealed",
            SessionState::Completed => "completed",
        }
    }

    /// The card currently on screen, if any
    pub fn card(&self) -> Option<&Flashcard> {
        match self {
            SessionState::Presenting { card, .. } | SessionState::Revealed { card, .. } => {
                Some(card)
            }
            SessionState::Idle | SessionState::Completed => None,
        }
    }
}

/// Counters for progress display
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionProgress {
    pub completed: usize,
    pub position: usize,
    pub total: usize,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    queue: Vec<Flashcard>,
    completed: usize,
    /// Bumped on start and cancel so late store replies can tell they are stale
    generation: u64,
    grading: bool,
}

impl Inner {
    fn invalid(&self, operation: &'static str) -> Error {
        let state = if self.grading {
            "grading"
        } else {
            self.state.name()
        };
        Error::InvalidState { operation, state }
    }

    fn advance_from(&mut self, index: usize) {
        let next = index + 1;
        self.state = match self.queue.get(next) {
            Some(card) => SessionState::Presenting {
                card: card.clone(),
                index: next,
            },
            None => SessionState::Completed,
        };
    }
}

/// One learner's pass over a batch of due cards
#[derive(Debug)]
pub struct ReviewSession {
    store: Arc<CardStore>,
    inner: Mutex<Inner>,
}

impl ReviewSession {
    /// Create an idle session grading into `store`
    pub fn new(store: Arc<CardStore>) -> Self {
        Self {
            store,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                queue: Vec::new(),
                completed: 0,
                generation: 0,
                grading: false,
            }),
        }
    }

    pub fn store(&self) -> &Arc<CardStore> {
        &self.store
    }

    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn completed_count(&self) -> usize {
        self.lock().completed
    }

    pub fn progress(&self) -> SessionProgress {
        let inner = self.lock();
        let position = match &inner.state {
            SessionState::Presenting { index, .. } | SessionState::Revealed { index, .. } => {
                *index
            }
            SessionState::Completed => inner.queue.len(),
            SessionState::Idle => 0,
        };
        SessionProgress {
            completed: inner.completed,
            position,
            total: inner.queue.len(),
        }
    }

    /// Begin a pass over `due`. The list is frozen for the life of the session.
    pub fn start(&self, due: Vec<Flashcard>) -> Result<SessionState> {
        let mut inner = self.lock();
        if inner.grading
            || matches!(
                inner.state,
                SessionState::Presenting { .. } | SessionState::Revealed { .. }
            )
        {
            return Err(inner.invalid("start"));
        }

        let first = due.first().cloned().ok_or(Error::EmptyQueue)?;

        inner.queue = due;
        inner.completed = 0;
        inner.generation += 1;
        inner.state = SessionState::Presenting {
            card: first,
            index: 0,
        };

        tracing::info!("Started review session with {} cards", inner.queue.len());
        Ok(inner.state.clone())
    }

    /// Show the answer of the current card
    pub fn reveal(&self) -> Result<SessionState> {
        let mut inner = self.lock();
        let next = match &inner.state {
            SessionState::Presenting { card, index } if !inner.grading => SessionState::Revealed {
                card: card.clone(),
                index: *index,
            },
            _ => return Err(inner.invalid("reveal")),
        };
        inner.state = next;
        Ok(inner.state.clone())
    }

    /// Grade the revealed card and move on.
    ///
    /// If the store rejects the grade the session stays on the revealed card
    /// so the caller can retry.
    pub fn grade(&self, grade: Grade, now: DateTime<Utc>) -> Result<Flashcard> {
        let (card_id, index, generation) = {
            let mut inner = self.lock();
            let (card_id, index) = match &inner.state {
                SessionState::Revealed { card, index } if !inner.grading => (card.id, *index),
                _ => return Err(inner.invalid("grade")),
            };
            inner.grading = true;
            (card_id, index, inner.generation)
        };

        let result = self.store.grade(card_id, grade, now);

        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::info!(
                "Session was cancelled while grading card {}; grade outcome kept in store only",
                card_id
            );
            return result;
        }
        inner.grading = false;

        let graded = result?;
        inner.completed += 1;
        inner.advance_from(index);

        tracing::debug!(
            "Session graded {} of {} ({})",
            inner.completed,
            inner.queue.len(),
            inner.state.name()
        );
        Ok(graded)
    }

    /// Move past the current card without grading it
    pub fn skip(&self) -> Result<SessionState> {
        let mut inner = self.lock();
        let index = match &inner.state {
            SessionState::Presenting { index, .. } | SessionState::Revealed { index, .. }
                if !inner.grading =>
            {
                *index
            }
            _ => return Err(inner.invalid("skip")),
        };
        inner.advance_from(index);
        Ok(inner.state.clone())
    }

    /// Abandon the session. Grades already written are kept.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        if inner.state != SessionState::Idle {
            tracing::info!(
                "Cancelled review session after {} of {} cards",
                inner.completed,
                inner.queue.len()
            );
        }
        inner.state = SessionState::Idle;
        inner.queue.clear();
        inner.completed = 0;
        inner.generation += 1;
        inner.grading = false;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // every transition is a single assignment under the lock
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
