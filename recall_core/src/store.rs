//! Card store: the owned, durable collection of flashcards.
//!
//! Every mutation is a single read-modify-write performed under the store
//! lock. The new deck is persisted first and only then published to
//! readers, so a failed save leaves nothing observable behind and two
//! grades on the same card can never start from the same review count.

use crate::persistence::PersistenceAdapter;
use crate::{CardId, CardPatch, Error, Flashcard, Grade, IntervalPolicy, NewCard, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

impl Flashcard {
    /// Create a fresh card, due immediately.
    pub fn new(input: NewCard, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            question: required_text("question", &input.question)?,
            answer: required_text("answer", &input.answer)?,
            mode: input.mode.trim().to_string(),
            last_grade: Grade::default(),
            review_count: 0,
            streak: 0,
            next_review_at: now,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether the card should be shown at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }

    /// The snapshot that results from grading this card at `now`.
    ///
    /// The interval is looked up with the review count *before* increment.
    pub fn graded(&self, grade: Grade, policy: &IntervalPolicy, now: DateTime<Utc>) -> Flashcard {
        // never schedule before the card existed
        let now = now.max(self.created_at);
        let days = policy.days(grade, self.review_count);

        Flashcard {
            last_grade: grade,
            review_count: self.review_count.saturating_add(1),
            streak: if grade == Grade::Easy {
                self.streak.saturating_add(1)
            } else {
                0
            },
            next_review_at: now + Duration::days(i64::from(days)),
            updated_at: now,
            ..self.clone()
        }
    }

    /// The snapshot that results from applying a content patch.
    ///
    /// Scheduling fields other than a forced `next_review_at` are off limits.
    pub fn patched(&self, patch: &CardPatch, now: DateTime<Utc>) -> Result<Flashcard> {
        let mut forbidden = Vec::new();
        if patch.review_count.is_some() {
            forbidden.push("review_count");
        }
        if patch.streak.is_some() {
            forbidden.push("streak");
        }
        if patch.last_grade.is_some() {
            forbidden.push("last_grade");
        }
        if !forbidden.is_empty() {
            return Err(Error::Validation(format!(
                "Only grading may change {}",
                forbidden.join(", ")
            )));
        }

        if patch.is_empty() {
            return Ok(self.clone());
        }

        let mut next = self.clone();
        if let Some(question) = &patch.question {
            next.question = required_text("question", question)?;
        }
        if let Some(answer) = &patch.answer {
            next.answer = required_text("answer", answer)?;
        }
        if let Some(mode) = &patch.mode {
            next.mode = mode.trim().to_string();
        }
        if let Some(at) = patch.next_review_at {
            if at < self.created_at {
                return Err(Error::Validation(format!(
                    "next_review_at {} is before the card was created ({})",
                    at, self.created_at
                )));
            }
            next.next_review_at = at;
        }
        next.updated_at = now.max(self.created_at);

        Ok(next)
    }
}

fn required_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Owned collection of cards backed by a persistence adapter
pub struct CardStore {
    adapter: Box<dyn PersistenceAdapter>,
    policy: IntervalPolicy,
    cards: Mutex<HashMap<CardId, Flashcard>>,
}

impl CardStore {
    /// Load the deck from `adapter` and take ownership of it
    pub fn open(adapter: impl PersistenceAdapter + 'static, policy: IntervalPolicy) -> Result<Self> {
        let loaded = adapter.load().map_err(Error::into_persistence)?;

        let mut cards = HashMap::with_capacity(loaded.len());
        for card in loaded {
            if let Some(previous) = cards.insert(card.id, card) {
                tracing::warn!("Duplicate card id {} in deck, keeping the later entry", previous.id);
            }
        }

        tracing::info!("Opened card store with {} cards", cards.len());
        Ok(Self {
            adapter: Box::new(adapter),
            policy,
            cards: Mutex::new(cards),
        })
    }

    pub fn policy(&self) -> &IntervalPolicy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Add one card
    pub fn add(
        &self,
        question: &str,
        answer: &str,
        mode: &str,
        now: DateTime<Utc>,
    ) -> Result<Flashcard> {
        let mut added = self.add_many(vec![NewCard::new(question, answer, mode)], now)?;
        added
            .pop()
            .ok_or_else(|| Error::State("add produced no card".into()))
    }

    /// Add several cards in one commit. Nothing is added if any item is invalid.
    pub fn add_many(&self, items: Vec<NewCard>, now: DateTime<Utc>) -> Result<Vec<Flashcard>> {
        let created = items
            .into_iter()
            .map(|item| Flashcard::new(item, now))
            .collect::<Result<Vec<_>>>()?;

        if created.is_empty() {
            return Ok(created);
        }

        let mut cards = self.lock();
        let mut next = cards.clone();
        for card in &created {
            next.insert(card.id, card.clone());
        }
        self.commit(&mut cards, next)?;

        tracing::info!("Added {} card(s)", created.len());
        Ok(created)
    }

    /// Fetch a single card
    pub fn get(&self, id: CardId) -> Result<Flashcard> {
        self.lock().get(&id).cloned().ok_or(Error::NotFound(id))
    }

    /// All cards, oldest first
    pub fn list(&self) -> Vec<Flashcard> {
        let mut cards: Vec<_> = self.lock().values().cloned().collect();
        sort_by_creation(&mut cards);
        cards
    }

    /// Apply a grade and reschedule the card.
    ///
    /// On failure the stored card is exactly as it was before the call.
    pub fn grade(&self, id: CardId, grade: Grade, now: DateTime<Utc>) -> Result<Flashcard> {
        let mut cards = self.lock();
        let current = cards.get(&id).ok_or(Error::NotFound(id))?;
        let graded = current.graded(grade, &self.policy, now);

        let mut next = cards.clone();
        next.insert(id, graded.clone());
        self.commit(&mut cards, next)?;

        tracing::debug!(
            "Graded card {} {}: review {}, streak {}, next review {}",
            id,
            grade,
            graded.review_count,
            graded.streak,
            graded.next_review_at
        );
        Ok(graded)
    }

    /// Change a card's content, or force its next review time
    pub fn edit(&self, id: CardId, patch: &CardPatch, now: DateTime<Utc>) -> Result<Flashcard> {
        let mut cards = self.lock();
        let current = cards.get(&id).ok_or(Error::NotFound(id))?;
        let edited = current.patched(patch, now)?;

        if &edited == current {
            return Ok(edited);
        }

        let mut next = cards.clone();
        next.insert(id, edited.clone());
        self.commit(&mut cards, next)?;

        tracing::info!("Edited card {}", id);
        Ok(edited)
    }

    /// Permanently remove a card
    pub fn delete(&self, id: CardId) -> Result<()> {
        let mut cards = self.lock();
        if !cards.contains_key(&id) {
            return Err(Error::NotFound(id));
        }

        let mut next = cards.clone();
        next.remove(&id);
        self.commit(&mut cards, next)?;

        tracing::info!("Deleted card {}", id);
        Ok(())
    }

    /// Persist `next` and, only if that succeeds, make it the visible deck
    fn commit(
        &self,
        cards: &mut MutexGuard<'_, HashMap<CardId, Flashcard>>,
        next: HashMap<CardId, Flashcard>,
    ) -> Result<()> {
        let mut snapshot: Vec<_> = next.values().cloned().collect();
        sort_by_creation(&mut snapshot);

        if let Err(e) = self.adapter.save_all(&snapshot) {
            tracing::warn!("Failed to persist deck: {}", e);
            return Err(e.into_persistence());
        }

        **cards = next;
        Ok(())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HashMap<CardId, Flashcard>> {
        // commit publishes only after a successful save, so a panic mid-commit
        // cannot leave a half-applied deck behind the poison flag
        self.cards.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardStore")
            .field("cards", &self.len())
            .field("policy", &self.policy)
            .finish()
    }
}

fn sort_by_creation(cards: &mut [Flashcard]) {
    cards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::persistence::{JsonFileAdapter, MemoryAdapter};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Adapter that fails saves while `failing` is set
    #[derive(Default)]
    pub(crate) struct FlakyAdapter {
        inner: MemoryAdapter,
        pub(crate) failing: AtomicBool,
    }

    impl PersistenceAdapter for FlakyAdapter {
        fn load(&self) -> Result<Vec<Flashcard>> {
            self.inner.load()
        }

        fn save_all(&self, cards: &[Flashcard]) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk unavailable",
                )));
            }
            self.inner.save_all(cards)
        }
    }

    pub(crate) fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn memory_store() -> CardStore {
        CardStore::open(MemoryAdapter::new(), IntervalPolicy::default()).unwrap()
    }

    #[test]
    fn test_add_creates_due_card() {
        let store = memory_store();
        let card = store.add("2+2?", "4", "maths", t0()).unwrap();

        assert_eq!(card.next_review_at, t0());
        assert_eq!(card.created_at, t0());
        assert_eq!(card.review_count, 0);
        assert_eq!(card.streak, 0);
        assert_eq!(card.last_grade, Grade::Medium);
        assert!(card.is_due(t0()));
        assert_eq!(store.get(card.id).unwrap(), card);
    }

    #[test]
    fn test_add_trims_and_rejects_blank_text() {
        let store = memory_store();
        let card = store.add("  capital of France? ", " Paris\n", " geo ", t0()).unwrap();
        assert_eq!(card.question, "capital of France?");
        assert_eq!(card.answer, "Paris");
        assert_eq!(card.mode, "geo");

        assert!(matches!(store.add("   ", "4", "maths", t0()), Err(Error::Validation(_))));
        assert!(matches!(store.add("q", "\t", "maths", t0()), Err(Error::Validation(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_grade_easy_then_hard() {
        let store = memory_store();
        let policy = IntervalPolicy::default();
        let card = store.add("2+2?", "4", "maths", t0()).unwrap();

        let easy = store.grade(card.id, Grade::Easy, t0()).unwrap();
        assert_eq!(easy.review_count, 1);
        assert_eq!(easy.streak, 1);
        assert_eq!(easy.last_grade, Grade::Easy);
        assert_eq!(
            easy.next_review_at,
            t0() + Duration::days(i64::from(policy.days(Grade::Easy, 0)))
        );

        let later = easy.next_review_at;
        let hard = store.grade(card.id, Grade::Hard, later).unwrap();
        assert_eq!(hard.streak, 0);
        assert_eq!(hard.review_count, 2);
        assert_eq!(
            hard.next_review_at,
            later + Duration::days(i64::from(policy.days(Grade::Hard, 1)))
        );
        assert!(hard.next_review_at > hard.updated_at);
    }

    #[test]
    fn test_streak_counts_consecutive_easy() {
        let store = memory_store();
        let card = store.add("q", "a", "", t0()).unwrap();

        for expected in 1..=3 {
            let graded = store.grade(card.id, Grade::Easy, t0()).unwrap();
            assert_eq!(graded.streak, expected);
        }
        assert_eq!(store.grade(card.id, Grade::Medium, t0()).unwrap().streak, 0);
        assert_eq!(store.grade(card.id, Grade::Easy, t0()).unwrap().streak, 1);
        assert_eq!(store.get(card.id).unwrap().review_count, 5);
    }

    #[test]
    fn test_grade_before_creation_never_schedules_earlier() {
        let store = memory_store();
        let card = store.add("q", "a", "", t0()).unwrap();

        let graded = store
            .grade(card.id, Grade::Hard, t0() - Duration::days(30))
            .unwrap();
        assert!(graded.next_review_at >= graded.created_at);
        assert!(graded.next_review_at > graded.updated_at);
    }

    #[test]
    fn test_grade_unknown_card() {
        let store = memory_store();
        let id = Uuid::new_v4();
        assert!(matches!(store.grade(id, Grade::Easy, t0()), Err(Error::NotFound(missing)) if missing == id));
    }

    #[test]
    fn test_failed_save_leaves_card_untouched() {
        let adapter = Arc::new(FlakyAdapter::default());
        let store = CardStore::open(adapter.clone(), IntervalPolicy::default()).unwrap();
        let card = store.add("q", "a", "", t0()).unwrap();

        adapter.failing.store(true, Ordering::SeqCst);
        let err = store.grade(card.id, Grade::Easy, t0()).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.get(card.id).unwrap(), card);
        assert_eq!(adapter.load().unwrap(), vec![card.clone()]);

        adapter.failing.store(false, Ordering::SeqCst);
        let graded = store.grade(card.id, Grade::Easy, t0()).unwrap();
        assert_eq!(graded.review_count, 1);
    }

    #[test]
    fn test_edit_changes_content_only() {
        let store = memory_store();
        let card = store.add("q", "a", "m", t0()).unwrap();
        let graded = store.grade(card.id, Grade::Easy, t0()).unwrap();

        let patch = CardPatch {
            question: Some("new question".into()),
            mode: Some("history".into()),
            ..Default::default()
        };
        let edited = store.edit(card.id, &patch, t0() + Duration::hours(1)).unwrap();

        assert_eq!(edited.question, "new question");
        assert_eq!(edited.answer, "a");
        assert_eq!(edited.mode, "history");
        assert_eq!(edited.review_count, graded.review_count);
        assert_eq!(edited.streak, graded.streak);
        assert_eq!(edited.last_grade, graded.last_grade);
        assert_eq!(edited.next_review_at, graded.next_review_at);
    }

    #[test]
    fn test_edit_rejects_scheduling_fields() {
        let store = memory_store();
        let card = store.add("q", "a", "", t0()).unwrap();

        for patch in [
            CardPatch { review_count: Some(9), ..Default::default() },
            CardPatch { streak: Some(2), ..Default::default() },
            CardPatch { last_grade: Some(Grade::Easy), ..Default::default() },
        ] {
            assert!(matches!(store.edit(card.id, &patch, t0()), Err(Error::Validation(_))));
        }
        assert_eq!(store.get(card.id).unwrap(), card);
    }

    #[test]
    fn test_edit_forced_next_review() {
        let store = memory_store();
        let card = store.add("q", "a", "", t0()).unwrap();

        let forced = t0() + Duration::days(40);
        let edited = store
            .edit(card.id, &CardPatch { next_review_at: Some(forced), ..Default::default() }, t0())
            .unwrap();
        assert_eq!(edited.next_review_at, forced);
        assert_eq!(edited.review_count, 0);

        let too_early = CardPatch {
            next_review_at: Some(t0() - Duration::days(1)),
            ..Default::default()
        };
        assert!(matches!(store.edit(card.id, &too_early, t0()), Err(Error::Validation(_))));
    }

    #[test]
    fn test_edit_and_delete_unknown_card() {
        let store = memory_store();
        let id = Uuid::new_v4();
        assert!(matches!(store.edit(id, &CardPatch::default(), t0()), Err(Error::NotFound(_))));
        assert!(matches!(store.delete(id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_removes_card() {
        let store = memory_store();
        let keep = store.add("keep", "a", "", t0()).unwrap();
        let drop = store.add("drop", "a", "", t0()).unwrap();

        store.delete(drop.id).unwrap();
        assert!(matches!(store.get(drop.id), Err(Error::NotFound(_))));
        assert_eq!(store.list(), vec![keep]);
    }

    #[test]
    fn test_add_many_is_all_or_nothing() {
        let store = memory_store();
        let result = store.add_many(
            vec![NewCard::new("q1", "a1", ""), NewCard::new("q2", " ", "")],
            t0(),
        );
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(store.is_empty());

        let added = store
            .add_many(vec![NewCard::new("q1", "a1", ""), NewCard::new("q2", "a2", "")], t0())
            .unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_concurrent_grades_do_not_lose_updates() {
        let store = Arc::new(memory_store());
        let card = store.add("q", "a", "", t0()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.grade(card.id, Grade::Easy, t0()).unwrap())
            })
            .collect();

        let mut counts: Vec<u32> = handles
            .into_iter()
            .map(|h| h.join().unwrap().review_count)
            .collect();
        counts.sort_unstable();

        assert_eq!(counts, (1..=8).collect::<Vec<_>>());
        let stored = store.get(card.id).unwrap();
        assert_eq!(stored.review_count, 8);
        assert_eq!(stored.streak, 8);
    }

    #[test]
    fn test_reopen_from_disk_preserves_fields() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("cards.json");

        let graded = {
            let store = CardStore::open(JsonFileAdapter::new(&path), IntervalPolicy::default()).unwrap();
            let card = store.add("2+2?", "4", "maths", t0()).unwrap();
            store.grade(card.id, Grade::Easy, t0()).unwrap()
        };

        let reopened = CardStore::open(JsonFileAdapter::new(&path), IntervalPolicy::default()).unwrap();
        assert_eq!(reopened.get(graded.id).unwrap(), graded);
    }

    fn disk_store(path: &std::path::Path) -> CardStore {
        CardStore::open(JsonFileAdapter::new(path), IntervalPolicy::default()).unwrap()
    }

    #[test]
    fn test_two_stores_on_one_deck_file_never_lose_updates() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("cards.json");
        let card = disk_store(&path).add("q", "a", "", t0()).unwrap();

        // both load the same deck before either writes
        let a = disk_store(&path);
        let b = disk_store(&path);

        assert_eq!(a.grade(card.id, Grade::Easy, t0()).unwrap().review_count, 1);

        let err = b.grade(card.id, Grade::Easy, t0()).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert!(err.is_retryable());
        assert_eq!(b.get(card.id).unwrap().review_count, 0);

        assert!(matches!(
            b.add("from b", "a", "", t0()),
            Err(Error::Persistence(_))
        ));
        assert_eq!(b.len(), 1);

        a.grade(card.id, Grade::Hard, t0()).unwrap();

        let reopened = disk_store(&path);
        assert_eq!(reopened.len(), 1);
        let stored = reopened.get(card.id).unwrap();
        assert_eq!(stored.review_count, 2);
        assert_eq!(stored.last_grade, Grade::Hard);
        assert_eq!(stored.streak, 0);
    }

    #[test]
    fn test_overlapping_writers_on_disk_keep_every_commit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("cards.json");
        disk_store(&path).add("seed", "a", "", t0()).unwrap();

        let stores: Vec<_> = (0..6).map(|_| disk_store(&path)).collect();
        let barrier = Arc::new(std::sync::Barrier::new(stores.len()));

        let handles: Vec<_> = stores
            .into_iter()
            .enumerate()
            .map(|(i, store)| {
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.add(&format!("q{}", i), "a", "", t0())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let committed: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();

        // every store loaded the one-card deck, so exactly the first writer wins
        assert_eq!(committed.len(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::Persistence(_))));

        let reopened = disk_store(&path);
        assert_eq!(reopened.len(), 2);
        assert!(reopened.get(committed[0].id).is_ok());
    }
}
