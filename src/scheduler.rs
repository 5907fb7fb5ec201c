use chrono::{DateTime, Duration, Utc};

use crate::models::Flashcard;

/// Learner feedback for a single card review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Again = 1,
    Good = 3,
}

impl ReviewOutcome {
    /// Parse the wire code used by consumers. Codes other than
    /// 1 (Again) and 3 (Good) are rejected.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(ReviewOutcome::Again),
            3 => Some(ReviewOutcome::Good),
            _ => None,
        }
    }
}

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const INITIAL_EASE_FACTOR: f64 = 2.5;

const FIRST_INTERVAL_DAYS: i64 = 1;
const SECOND_INTERVAL_DAYS: i64 = 6;
const LAPSE_INTERVAL_DAYS: i64 = 1;
const EASE_BONUS: f64 = 0.1;
const EASE_PENALTY: f64 = 0.2;

/// SM-2 style scheduler: two fixed bootstrap intervals, then growth by the
/// card's ease factor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewScheduler;

impl ReviewScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Apply a review outcome and return the rescheduled card.
    ///
    /// `next_review_date` never moves backwards, so reviewing a card ahead
    /// of schedule cannot shorten its existing interval.
    pub fn apply_outcome(
        &self,
        card: &Flashcard,
        outcome: ReviewOutcome,
        now: DateTime<Utc>,
    ) -> Flashcard {
        let (interval_days, repetition_count, ease_factor) = match outcome {
            ReviewOutcome::Again => (
                LAPSE_INTERVAL_DAYS,
                0,
                (card.ease_factor - EASE_PENALTY).max(MIN_EASE_FACTOR),
            ),
            ReviewOutcome::Good => {
                let (interval, ease) = match card.repetition_count {
                    0 => (FIRST_INTERVAL_DAYS, card.ease_factor),
                    1 => (SECOND_INTERVAL_DAYS, card.ease_factor + EASE_BONUS),
                    _ => {
                        let previous = self.previous_interval_days(card);
                        let grown = (previous as f64 * card.ease_factor).round() as i64;
                        (grown.max(1), card.ease_factor + EASE_BONUS)
                    }
                };
                (interval, card.repetition_count + 1, ease)
            }
        };

        let mut next_review_date = now + Duration::days(interval_days);
        if next_review_date <= card.next_review_date {
            next_review_date = card.next_review_date + Duration::days(1);
        }

        Flashcard {
            next_review_date,
            last_reviewed: Some(now),
            repetition_count,
            ease_factor,
            ..card.clone()
        }
    }

    /// The interval that was scheduled at the previous review, recovered
    /// from the gap between `last_reviewed` and `next_review_date`.
    fn previous_interval_days(&self, card: &Flashcard) -> i64 {
        card.last_reviewed
            .map(|last| (card.next_review_date - last).num_days())
            .unwrap_or(FIRST_INTERVAL_DAYS)
            .max(1)
    }

    /// Every card whose scheduled review time has arrived, weakest first:
    /// ascending next review date, ties broken by ascending ease factor,
    /// then by insertion order.
    pub fn due_queue<'a>(
        &self,
        cards: &'a [Flashcard],
        now: DateTime<Utc>,
    ) -> Vec<&'a Flashcard> {
        let mut due: Vec<(usize, &Flashcard)> = cards
            .iter()
            .enumerate()
            .filter(|(_, card)| card.next_review_date <= now)
            .collect();

        due.sort_by(|(ai, a), (bi, b)| {
            a.next_review_date
                .cmp(&b.next_review_date)
                .then(a.ease_factor.total_cmp(&b.ease_factor))
                .then(ai.cmp(bi))
        });

        due.into_iter().map(|(_, card)| card).collect()
    }
}
