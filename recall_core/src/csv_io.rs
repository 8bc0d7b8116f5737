//! CSV import and export of decks.
//!
//! Import reads plain `question,answer[,mode]` rows, the simplest shape an
//! external content source can produce. Export writes the full schedule.

use crate::{Flashcard, NewCard, Result};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A row in the exported CSV
#[derive(Debug, Serialize)]
struct ExportRow {
    id: String,
    question: String,
    answer: String,
    mode: String,
    last_grade: String,
    review_count: u32,
    streak: u32,
    next_review_at: String,
    created_at: String,
    updated_at: String,
}

impl From<&Flashcard> for ExportRow {
    fn from(card: &Flashcard) -> Self {
        ExportRow {
            id: card.id.to_string(),
            question: card.question.clone(),
            answer: card.answer.clone(),
            mode: card.mode.clone(),
            last_grade: card.last_grade.to_string(),
            review_count: card.review_count,
            streak: card.streak,
            next_review_at: card.next_review_at.to_rfc3339(),
            created_at: card.created_at.to_rfc3339(),
            updated_at: card.updated_at.to_rfc3339(),
        }
    }
}

/// A row accepted on import
#[derive(Debug, Deserialize)]
struct ImportRow {
    question: String,
    answer: String,
    #[serde(default)]
    mode: Option<String>,
}

/// Write `cards` to a CSV file, replacing it. Returns the number of rows.
pub fn export_cards(cards: &[Flashcard], path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for card in cards {
        writer.serialize(ExportRow::from(card))?;
    }
    writer.flush()?;

    tracing::info!("Exported {} cards to {:?}", cards.len(), path);
    Ok(cards.len())
}

/// Read question/answer pairs from a CSV file with a header row.
///
/// Malformed rows fail the whole import so that nothing is half-loaded;
/// validation of the text itself happens when the cards are added.
pub fn read_card_pairs(path: &Path) -> Result<Vec<NewCard>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;

    let mut cards = Vec::new();
    for result in reader.deserialize::<ImportRow>() {
        let row = result?;
        cards.push(NewCard::new(row.question, row.answer, row.mode.unwrap_or_default()));
    }

    tracing::debug!("Read {} card pairs from {:?}", cards.len(), path);
    Ok(cards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryAdapter;
    use crate::{CardStore, Error, IntervalPolicy};
    use chrono::Utc;

    #[test]
    fn test_import_with_and_without_mode() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("import.csv");
        std::fs::write(
            &path,
            "question,answer,mode\n2+2?,4,maths\n\"Capital of Chile?\", Santiago ,\nlast,row\n",
        )
        .unwrap();

        let pairs = read_card_pairs(&path).unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], NewCard::new("2+2?", "4", "maths"));
        assert_eq!(pairs[1].answer, "Santiago");
        assert_eq!(pairs[1].mode, "");
        assert_eq!(pairs[2].mode, "");
    }

    #[test]
    fn test_import_rejects_missing_columns() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("import.csv");
        std::fs::write(&path, "question,answer\nonly-a-question\n").unwrap();

        assert!(matches!(read_card_pairs(&path), Err(Error::Csv(_))));
    }

    #[test]
    fn test_export_writes_every_card() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("out").join("deck.csv");

        let store = CardStore::open(MemoryAdapter::new(), IntervalPolicy::default()).unwrap();
        store.add("q1", "a, with comma", "m", Utc::now()).unwrap();
        store.add("q2", "a2", "", Utc::now()).unwrap();

        let count = export_cards(&store.list(), &path).unwrap();
        assert_eq!(count, 2);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "id");
        assert_eq!(reader.records().count(), 2);
    }
}
