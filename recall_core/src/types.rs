//! Core domain types for the Recall scheduling system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Grades and flashcards
//! - Edit patches and new-card input
//! - Review journal records and deck summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque, immutable card identifier
pub type CardId = Uuid;

// ============================================================================
// Grades
// ============================================================================

/// Recall quality reported by the learner for one review
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Grade {
    pub const ALL: [Grade; 3] = [Grade::Hard, Grade::Medium, Grade::Easy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Easy => "easy",
            Grade::Medium => "medium",
            Grade::Hard => "hard",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" | "e" => Ok(Grade::Easy),
            "medium" | "m" => Ok(Grade::Medium),
            "hard" | "h" => Ok(Grade::Hard),
            other => Err(crate::Error::Validation(format!(
                "Unknown grade '{}' (expected easy, medium or hard)",
                other
            ))),
        }
    }
}

// ============================================================================
// Flashcards
// ============================================================================

/// A durable learnable item.
///
/// Values are treated as immutable snapshots: every change produces a new
/// `Flashcard` that replaces the stored one wholesale.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flashcard {
    pub id: CardId,
    pub question: String,
    pub answer: String,
    pub mode: String,
    pub last_grade: Grade,
    pub review_count: u32,
    pub streak: u32,
    pub next_review_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a card
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewCard {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub mode: String,
}

impl NewCard {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        mode: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            mode: mode.into(),
        }
    }
}

/// Requested changes to a card's content.
///
/// `review_count`, `streak` and `last_grade` are present so that patches
/// arriving from a presentation layer can be checked; setting any of them is
/// rejected because only grading may move scheduling state.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CardPatch {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub mode: Option<String>,
    /// Manual override that bypasses the interval policy
    pub next_review_at: Option<DateTime<Utc>>,
    pub review_count: Option<u32>,
    pub streak: Option<u32>,
    pub last_grade: Option<Grade>,
}

impl CardPatch {
    pub fn is_empty(&self) -> bool {
        self == &CardPatch::default()
    }
}

// ============================================================================
// Journal and reporting
// ============================================================================

/// One committed grade, as written to the review journal
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewRecord {
    pub id: Uuid,
    pub card_id: CardId,
    pub grade: Grade,
    pub reviewed_at: DateTime<Utc>,
    pub review_count: u32,
    pub streak: u32,
    pub interval_days: i64,
    pub next_review_at: DateTime<Utc>,
}

impl ReviewRecord {
    /// Build a journal entry from the snapshot returned by a grade.
    pub fn from_graded(card: &Flashcard) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_id: card.id,
            grade: card.last_grade,
            reviewed_at: card.updated_at,
            review_count: card.review_count,
            streak: card.streak,
            interval_days: (card.next_review_at - card.updated_at).num_days(),
            next_review_at: card.next_review_at,
        }
    }
}

/// Aggregate view of a deck at a point in time
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct DeckSummary {
    pub total: usize,
    pub due: usize,
    pub never_reviewed: usize,
    pub last_easy: usize,
    pub last_medium: usize,
    pub last_hard: usize,
    pub longest_streak: u32,
    pub next_due_at: Option<DateTime<Utc>>,
}
