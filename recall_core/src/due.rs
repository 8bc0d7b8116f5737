//! Due-set query: which cards should be reviewed now.
//!
//! Results are ordered most-overdue first (ascending `next_review_at`),
//! ties broken by creation time and then id, so repeated calls against an
//! unchanged deck return the same sequence.

use crate::{CardStore, DeckSummary, Flashcard, Grade};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Select and order the due cards from any collection
pub fn select_due<'a>(
    cards: impl IntoIterator<Item = &'a Flashcard>,
    now: DateTime<Utc>,
) -> Vec<Flashcard> {
    let mut due: Vec<Flashcard> = cards
        .into_iter()
        .filter(|card| card.is_due(now))
        .cloned()
        .collect();
    due.sort_by(most_overdue_first);
    due
}

fn most_overdue_first(a: &Flashcard, b: &Flashcard) -> Ordering {
    a.next_review_at
        .cmp(&b.next_review_at)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

impl CardStore {
    /// Cards due at `now`, most overdue first
    pub fn due_cards(&self, now: DateTime<Utc>) -> Vec<Flashcard> {
        let cards = self.lock();
        let due = select_due(cards.values(), now);
        tracing::debug!("{} of {} cards due at {}", due.len(), cards.len(), now);
        due
    }

    /// Due cards restricted to one classification label
    pub fn due_cards_in_mode(&self, now: DateTime<Utc>, mode: &str) -> Vec<Flashcard> {
        let mode = mode.trim();
        let cards = self.lock();
        select_due(cards.values().filter(|card| card.mode == mode), now)
    }

    /// Earliest scheduled review that is still in the future
    pub fn next_due_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lock()
            .values()
            .map(|card| card.next_review_at)
            .filter(|at| *at > now)
            .min()
    }

    /// Aggregate counts for reporting
    pub fn summary(&self, now: DateTime<Utc>) -> DeckSummary {
        let cards = self.lock();
        let mut summary = DeckSummary {
            total: cards.len(),
            ..Default::default()
        };

        for card in cards.values() {
            if card.is_due(now) {
                summary.due += 1;
            }
            if card.review_count == 0 {
                summary.never_reviewed += 1;
                continue;
            }
            match card.last_grade {
                Grade::Easy => summary.last_easy += 1,
                Grade::Medium => summary.last_medium += 1,
                Grade::Hard => summary.last_hard += 1,
            }
            summary.longest_streak = summary.longest_streak.max(card.streak);
        }
        drop(cards);

        summary.next_due_at = self.next_due_at(now);
        summary
    }
}
