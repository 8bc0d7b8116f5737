#![forbid(unsafe_code)]

//! Core scheduling engine for the Recall spaced-repetition system.
//!
//! This crate provides:
//! - Domain types (flashcards, grades, patches, review records)
//! - Interval policy
//! - Card store with atomic grading
//! - Due-set query
//! - Review session state machine
//! - Persistence (JSON deck, JSONL review journal, CSV import/export)

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod interval;
pub mod persistence;
pub mod store;
pub mod due;
pub mod session;
pub mod journal;
pub mod csv_io;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use interval::{default_policy, IntervalPolicy};
pub use persistence::{JsonFileAdapter, MemoryAdapter, PersistenceAdapter};
pub use store::CardStore;
pub use due::select_due;
pub use session::{ReviewSession, SessionProgress, SessionState};
pub use journal::{read_reviews, JsonlJournal, ReviewSink};
