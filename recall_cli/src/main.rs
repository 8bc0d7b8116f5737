use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use recall_core::csv_io::{export_cards, read_card_pairs};
use recall_core::journal::reviews_for_card;
use recall_core::*;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "recall")]
#[command(about = "Spaced-repetition flashcard reviewer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Review the cards that are due now (default)
    Review {
        /// Only cards with this mode label
        #[arg(long)]
        mode: Option<String>,

        /// Review at most this many cards
        #[arg(long)]
        limit: Option<usize>,

        /// Grade every card with this value without prompting (for scripting)
        #[arg(long)]
        auto_grade: Option<Grade>,
    },

    /// Add a card
    Add {
        #[arg(long)]
        question: String,

        #[arg(long)]
        answer: String,

        #[arg(long, default_value = "")]
        mode: String,
    },

    /// Change a card's text or mode, or force its next review date
    Edit {
        id: Uuid,

        #[arg(long)]
        question: Option<String>,

        #[arg(long)]
        answer: Option<String>,

        #[arg(long)]
        mode: Option<String>,

        /// Next review, as YYYY-MM-DD or RFC 3339 (bypasses the schedule)
        #[arg(long)]
        due: Option<String>,
    },

    /// Delete a card permanently
    Delete { id: Uuid },

    /// List every card
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show cards due now, most overdue first
    Due {
        #[arg(long)]
        mode: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Import question,answer[,mode] rows from a CSV file
    Import { path: PathBuf },

    /// Export the deck to a CSV file
    Export { path: PathBuf },

    /// Deck statistics
    Stats,

    /// Show the review journal
    History {
        /// Only reviews of this card
        #[arg(long)]
        card: Option<Uuid>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        recall_core::logging::init_with_level("debug");
    } else {
        recall_core::logging::init();
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let store = open_store(&data_dir, &config)?;
    tracing::debug!("Opened deck in {:?} with {} cards", data_dir, store.len());

    match cli.command {
        Some(Commands::Review {
            mode,
            limit,
            auto_grade,
        }) => cmd_review(
            store,
            &data_dir,
            mode,
            limit.or(config.review.session_limit),
            auto_grade,
        ),
        Some(Commands::Add {
            question,
            answer,
            mode,
        }) => cmd_add(&store, &question, &answer, &mode),
        Some(Commands::Edit {
            id,
            question,
            answer,
            mode,
            due,
        }) => cmd_edit(&store, id, question, answer, mode, due),
        Some(Commands::Delete { id }) => {
            store.delete(id)?;
            println!("✓ Deleted card {}", id);
            Ok(())
        }
        Some(Commands::List { json }) => print_cards(&store.list(), json),
        Some(Commands::Due { mode, json }) => {
            let now = Utc::now();
            let due = match mode {
                Some(m) => store.due_cards_in_mode(now, &m),
                None => store.due_cards(now),
            };
            print_cards(&due, json)
        }
        Some(Commands::Import { path }) => cmd_import(&store, &path),
        Some(Commands::Export { path }) => {
            let count = export_cards(&store.list(), &path)?;
            println!("✓ Exported {} cards to {}", count, path.display());
            Ok(())
        }
        Some(Commands::Stats) => cmd_stats(&store),
        Some(Commands::History { card }) => cmd_history(&data_dir, card),
        None => cmd_review(store, &data_dir, None, config.review.session_limit, None),
    }
}

fn open_store(data_dir: &Path, config: &Config) -> Result<Arc<CardStore>> {
    std::fs::create_dir_all(data_dir)?;

    let policy = config.interval_policy()?;
    let adapter =
        JsonFileAdapter::new(Config::deck_path(data_dir)).with_lock_timeout(config.lock_timeout());

    Ok(Arc::new(CardStore::open(adapter, policy)?))
}

fn cmd_add(store: &CardStore, question: &str, answer: &str, mode: &str) -> Result<()> {
    let card = store.add(question, answer, mode, Utc::now())?;
    println!("✓ Added card {}", card.id);
    Ok(())
}

fn cmd_edit(
    store: &CardStore,
    id: Uuid,
    question: Option<String>,
    answer: Option<String>,
    mode: Option<String>,
    due: Option<String>,
) -> Result<()> {
    let patch = CardPatch {
        question,
        answer,
        mode,
        next_review_at: due.as_deref().map(parse_when).transpose()?,
        ..Default::default()
    };

    if patch.is_empty() {
        println!("Nothing to change.");
        return Ok(());
    }

    let card = store.edit(id, &patch, Utc::now())?;
    println!("✓ Updated card {}", card.id);
    println!("  Next review: {}", format_when(card.next_review_at));
    Ok(())
}

fn cmd_import(store: &CardStore, path: &Path) -> Result<()> {
    let pairs = read_card_pairs(path)?;
    let added = store.add_many(pairs, Utc::now())?;
    println!("✓ Imported {} cards", added.len());
    Ok(())
}

fn cmd_stats(store: &CardStore) -> Result<()> {
    let summary = store.summary(Utc::now());

    println!("Cards:          {}", summary.total);
    println!("Due now:        {}", summary.due);
    println!("Never reviewed: {}", summary.never_reviewed);
    println!(
        "Last grade:     {} easy, {} medium, {} hard",
        summary.last_easy, summary.last_medium, summary.last_hard
    );
    println!("Longest streak: {}", summary.longest_streak);
    if let Some(next) = summary.next_due_at {
        println!("Next review:    {}", format_when(next));
    }
    Ok(())
}

fn cmd_history(data_dir: &Path, card: Option<Uuid>) -> Result<()> {
    let path = Config::journal_path(data_dir);
    let records = match card {
        Some(id) => reviews_for_card(&path, id)?,
        None => read_reviews(&path)?,
    };

    if records.is_empty() {
        println!("No reviews recorded.");
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  {}  {:<6}  review #{}  streak {}  +{}d",
            format_when(record.reviewed_at),
            record.card_id,
            record.grade.as_str(),
            record.review_count,
            record.streak,
            record.interval_days
        );
    }
    Ok(())
}

fn cmd_review(
    store: Arc<CardStore>,
    data_dir: &Path,
    mode: Option<String>,
    limit: Option<usize>,
    auto_grade: Option<Grade>,
) -> Result<()> {
    let now = Utc::now();
    let mut due = match &mode {
        Some(m) => store.due_cards_in_mode(now, m),
        None => store.due_cards(now),
    };
    if let Some(limit) = limit {
        due.truncate(limit);
    }
    tracing::info!("Starting review of {} cards", due.len());

    let session = ReviewSession::new(Arc::clone(&store));
    match session.start(due) {
        Ok(_) => {}
        Err(Error::EmptyQueue) => {
            println!("Nothing due. 🎉");
            if let Some(next) = store.next_due_at(now) {
                println!("  Next review: {}", format_when(next));
            }
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    let mut journal = JsonlJournal::new(Config::journal_path(data_dir));
    let stdin = io::stdin();
    let mut input = stdin.lock();

    loop {
        let progress = session.progress();
        match session.state() {
            SessionState::Presenting { card, .. } => {
                display_question(&card, progress);

                if auto_grade.is_none() {
                    match prompt(&mut input, "Enter to reveal, 's' to skip, 'q' to quit")?
                        .as_deref()
                    {
                        None | Some("q") => {
                            session.cancel();
                            break;
                        }
                        Some("s") => {
                            session.skip()?;
                            continue;
                        }
                        Some(_) => {}
                    }
                }
                session.reveal()?;
            }

            SessionState::Revealed { card, .. } => {
                println!("  A: {}", card.answer);

                let grade = match auto_grade {
                    Some(grade) => grade,
                    None => match prompt(&mut input, "[e]asy / [m]edium / [h]ard, 'q' to quit")?
                        .as_deref()
                    {
                        None | Some("q") => {
                            session.cancel();
                            break;
                        }
                        Some(answer) => match answer.parse::<Grade>() {
                            Ok(grade) => grade,
                            Err(e) => {
                                println!("  {}", e);
                                continue;
                            }
                        },
                    },
                };

                match session.grade(grade, Utc::now()) {
                    Ok(graded) => {
                        // the grade is already committed; a journal failure only loses history
                        if let Err(e) = journal.append(&ReviewRecord::from_graded(&graded)) {
                            tracing::warn!("Failed to journal review of card {}: {}", graded.id, e);
                            eprintln!("  Grade saved, but not recorded in the review history: {}", e);
                        }
                        println!("  → next review {}", format_when(graded.next_review_at));
                    }
                    Err(e) if e.is_retryable() && auto_grade.is_none() => {
                        tracing::warn!("Grade not saved: {}", e);
                        eprintln!("  Could not save grade: {}. Try again.", e);
                    }
                    Err(e) => return Err(e),
                }
            }

            SessionState::Completed | SessionState::Idle => break,
        }
    }

    let progress = session.progress();
    match session.state() {
        SessionState::Completed => {
            println!("\n✓ Reviewed {} cards", progress.completed);
        }
        _ => {
            println!("\nSession ended early. Grades so far are saved.");
        }
    }
    Ok(())
}

fn display_question(card: &Flashcard, progress: SessionProgress) {
    println!();
    println!("── {}/{} ─────────────────────────────", progress.position + 1, progress.total);
    if !card.mode.is_empty() {
        println!("  [{}]", card.mode);
    }
    println!("  Q: {}", card.question);
}

fn prompt(input: &mut impl BufRead, message: &str) -> Result<Option<String>> {
    print!("{} > ", message);
    io::stdout().flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_lowercase()))
}

fn print_cards(cards: &[Flashcard], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(cards)?);
        return Ok(());
    }

    if cards.is_empty() {
        println!("No cards.");
        return Ok(());
    }

    for card in cards {
        println!(
            "{}  due {}  reviews {:>3}  streak {:>2}  {:<6}  {}{}",
            card.id,
            format_when(card.next_review_at),
            card.review_count,
            card.streak,
            card.last_grade.as_str(),
            if card.mode.is_empty() {
                String::new()
            } else {
                format!("[{}] ", card.mode)
            },
            card.question
        );
    }
    Ok(())
}

fn parse_when(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
        Error::Validation(format!("Invalid date '{}': {}", value, e))
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::Validation(format!("Invalid date '{}'", value)))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

fn format_when(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}
