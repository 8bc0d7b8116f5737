//! Interval policy: how many days until a card is shown again.
//!
//! Each grade tier owns a non-decreasing sequence of day counts indexed by the
//! card's review count *before* the current grade is applied. Past the end of
//! a sequence the last value repeats. For every index,
//! `hard <= medium <= easy` holds, so easier cards are never shown sooner.

use crate::{Error, Grade, Result};
use once_cell::sync::Lazy;

/// Built-in day sequences, one per grade tier
pub const DEFAULT_HARD_DAYS: [u32; 6] = [1, 1, 2, 3, 5, 8];
pub const DEFAULT_MEDIUM_DAYS: [u32; 6] = [1, 3, 7, 14, 30, 60];
pub const DEFAULT_EASY_DAYS: [u32; 6] = [3, 7, 14, 30, 60, 120];

static DEFAULT_POLICY: Lazy<IntervalPolicy> = Lazy::new(|| IntervalPolicy {
    hard: DEFAULT_HARD_DAYS.to_vec(),
    medium: DEFAULT_MEDIUM_DAYS.to_vec(),
    easy: DEFAULT_EASY_DAYS.to_vec(),
});

/// Get a reference to the built-in policy
pub fn default_policy() -> &'static IntervalPolicy {
    &DEFAULT_POLICY
}

/// Validated per-tier day sequences
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntervalPolicy {
    hard: Vec<u32>,
    medium: Vec<u32>,
    easy: Vec<u32>,
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        default_policy().clone()
    }
}

impl IntervalPolicy {
    /// Build a policy from custom sequences.
    ///
    /// Fails with `Error::Config` if a tier is empty, contains a zero, ever
    /// decreases, or breaks `hard <= medium <= easy` at any index.
    pub fn new(hard: Vec<u32>, medium: Vec<u32>, easy: Vec<u32>) -> Result<Self> {
        for (grade, days) in [
            (Grade::Hard, &hard),
            (Grade::Medium, &medium),
            (Grade::Easy, &easy),
        ] {
            validate_tier(grade, days)?;
        }

        let policy = Self { hard, medium, easy };

        let longest = policy.hard.len().max(policy.medium.len()).max(policy.easy.len());
        for n in 0..longest {
            let (h, m, e) = (
                policy.days(Grade::Hard, n as u32),
                policy.days(Grade::Medium, n as u32),
                policy.days(Grade::Easy, n as u32),
            );
            if !(h <= m && m <= e) {
                return Err(Error::Config(format!(
                    "Interval tiers out of order at review {}: hard={} medium={} easy={}",
                    n, h, m, e
                )));
            }
        }

        Ok(policy)
    }

    /// Days until the next review for `grade`, given the pre-increment review count.
    ///
    /// Pure and total: never fails and always returns at least 1.
    pub fn days(&self, grade: Grade, review_count: u32) -> u32 {
        let seq = self.tier(grade);
        let idx = (review_count as usize).min(seq.len().saturating_sub(1));
        seq.get(idx).copied().unwrap_or(1).max(1)
    }

    /// The configured sequence for a tier
    pub fn tier(&self, grade: Grade) -> &[u32] {
        match grade {
            Grade::Hard => &self.hard,
            Grade::Medium => &self.medium,
            Grade::Easy => &self.easy,
        }
    }
}

fn validate_tier(grade: Grade, days: &[u32]) -> Result<()> {
    if days.is_empty() {
        return Err(Error::Config(format!("No intervals configured for {}", grade)));
    }
    if days.contains(&0) {
        return Err(Error::Config(format!(
            "Intervals for {} must be at least one day",
            grade
        )));
    }
    if days.windows(2).any(|w| w[1] < w[0]) {
        return Err(Error::Config(format!(
            "Intervals for {} must not decrease: {:?}",
            grade, days
        )));
    }
    Ok(())
}
