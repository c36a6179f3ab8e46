//! ELO rating updates.

use serde::{Deserialize, Serialize};

/// The maximum rating change a single debate can cause.
pub const K_FACTOR: f64 = 32.0;

/// The result of a debate from one participant's point of view.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum MatchResult {
    Win,
    Loss,
    Draw,
}

impl MatchResult {
    pub fn score(self) -> f64 {
        match self {
            MatchResult::Win => 1.0,
            MatchResult::Loss => 0.0,
            MatchResult::Draw => 0.5,
        }
    }

    /// The same result, seen from the other side of the debate.
    pub fn inverse(self) -> Self {
        match self {
            MatchResult::Win => MatchResult::Loss,
            MatchResult::Loss => MatchResult::Win,
            MatchResult::Draw => MatchResult::Draw,
        }
    }
}

/// The probability that a player rated `rating` beats one rated `opponent`.
pub fn expected_score(rating: i64, opponent: i64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) as f64 / 400.0))
}

/// The rating change for a player rated `rating` who achieved `result`
/// against a player rated `opponent`.
///
/// In a two-player debate the other side's change is always the negation of
/// this value; callers compute it once and negate it rather than calling this
/// twice.
pub fn elo_delta(rating: i64, opponent: i64, result: MatchResult) -> i64 {
    let expected = expected_score(rating, opponent);
    (K_FACTOR * (result.score() - expected)).round() as i64
}

/// Rating changes for both sides of a debate, in (challenger, opponent)
/// order.
pub fn elo_deltas(
    challenger_rating: i64,
    opponent_rating: i64,
    challenger_result: MatchResult,
) -> (i64, i64) {
    let delta =
        elo_delta(challenger_rating, opponent_rating, challenger_result);
    (delta, -delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratings_win_gives_half_k() {
        assert_eq!(elo_delta(1200, 1200, MatchResult::Win), 16);
        assert_eq!(elo_delta(1200, 1200, MatchResult::Loss), -16);
        assert_eq!(elo_delta(1200, 1200, MatchResult::Draw), 0);
    }

    #[test]
    fn upsets_move_ratings_further() {
        let favourite_wins = elo_delta(1600, 1200, MatchResult::Win);
        let underdog_wins = elo_delta(1200, 1600, MatchResult::Win);
        assert!(favourite_wins < underdog_wins);
        assert_eq!(favourite_wins, 3);
        assert_eq!(underdog_wins, 29);
    }

    #[test]
    fn draw_against_stronger_player_gains_rating() {
        assert!(elo_delta(1200, 1500, MatchResult::Draw) > 0);
        assert!(elo_delta(1500, 1200, MatchResult::Draw) < 0);
    }

    #[test]
    fn win_and_loss_are_symmetric() {
        let pairs = [
            (1200, 1200),
            (1400, 1200),
            (1000, 1600),
            (1500, 1525),
            (2400, 800),
            (1337, 1201),
        ];
        for (a, b) in pairs {
            assert_eq!(
                elo_delta(a, b, MatchResult::Win),
                -elo_delta(b, a, MatchResult::Loss),
                "ratings {a} vs {b}"
            );
        }
    }

    #[test]
    fn deltas_are_zero_sum() {
        let (c, o) = elo_deltas(1450, 1210, MatchResult::Loss);
        assert_eq!(c + o, 0);
        assert!(c < 0);
    }
}
