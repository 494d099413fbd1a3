//! A registered player identity: an immutable name and a mutable Elo-style
//! rating.

use std::sync::{Arc, Mutex};

/// Rating assigned to a newly-registered player.
pub const INITIAL_RATING: i32 = 1500;

/// The per-game point value used in the rating update below.
const RATING_K_FACTOR: f64 = 32.0;

#[derive(Debug)]
pub struct Player {
    name: String,
    rating: Mutex<i32>,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Arc<Player> {
        Arc::new(Player {
            name: name.into(),
            rating: Mutex::new(INITIAL_RATING),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rating(&self) -> i32 {
        *self.rating.lock().unwrap()
    }

    /// Applies one game's worth of Elo adjustment against `opponent_rating`
    /// (a snapshot taken by the caller before either side's rating moved),
    /// reading and writing this player's own rating under a single lock
    /// acquisition. A client can be party to two simultaneous ACCEPTED
    /// games, so the same `Player` may have `post_result` running
    /// concurrently from two different connection tasks; holding the lock
    /// across the whole read-modify-write, rather than a separate load and
    /// store, is what keeps the second update from clobbering the first.
    fn apply_result(&self, opponent_rating: i32, score: f64) {
        let mut rating = self.rating.lock().unwrap();
        let expected = 1.0 / (1.0 + 10f64.powf((opponent_rating - *rating) as f64 / 400.0));
        *rating += (RATING_K_FACTOR * (score - expected)).round() as i32;
    }
}

/// The outcome of a finished game, from the perspective of `post_result`'s
/// two arguments (`first`, `second`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    FirstWon,
    SecondWon,
    Draw,
}

/// Updates both players' ratings for the outcome of a game between them,
/// using the standard Elo expected-score formula:
/// `E_i = 1 / (1 + 10^((R_j - R_i) / 400))`, and applying
/// `R_i' = round(R_i + K * (S_i - E_i))` with `K = 32`. Each side's
/// pre-game rating is snapshotted once to compute the other's expected
/// score, but the read-modify-write of each player's own rating happens
/// under that player's own lock in `apply_result`, so a concurrent
/// `post_result` call sharing one of these two players (possible since a
/// client can hold two simultaneous ACCEPTED invitations) cannot lose an
/// update.
pub fn post_result(first: &Player, second: &Player, result: MatchResult) {
    let r1_before = first.rating();
    let r2_before = second.rating();

    let (score_first, score_second) = match result {
        MatchResult::FirstWon => (1.0, 0.0),
        MatchResult::SecondWon => (0.0, 1.0),
        MatchResult::Draw => (0.5, 0.5),
    };

    first.apply_result(r2_before, score_first);
    second.apply_result(r1_before, score_second);
}
