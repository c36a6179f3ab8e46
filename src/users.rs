//! Cumulative debating statistics.
//!
//! Every change made here is a relative increment. Resolutions and appeals
//! describe what they want to add or take away as a [`StatChange`], which
//! keeps the arithmetic exactly reversible.

use std::ops::Neg;

use chrono::NaiveDateTime;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{error::EngineError, rating::MatchResult, schema::users};

#[derive(Queryable, Selectable, Serialize, Clone, Debug, PartialEq)]
#[diesel(check_for_backend(Sqlite))]
#[diesel(table_name = users)]
pub struct User {
    pub id: String,
    pub username: String,
    pub elo_rating: i64,
    pub debates_won: i64,
    pub debates_lost: i64,
    pub debates_tied: i64,
    pub total_debates: i64,
    /// Hundredths of a point.
    pub total_score: i64,
    /// Hundredths of a point.
    pub total_max_score: i64,
    pub average_rounds: f64,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn fetch(
        user_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<User, EngineError> {
        users::table
            .find(user_id)
            .select(User::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| EngineError::UserNotFound(user_id.to_string()))
    }

    pub fn total_score_points(&self) -> Decimal {
        Decimal::new(self.total_score, 2)
    }

    pub fn total_max_score_points(&self) -> Decimal {
        Decimal::new(self.total_max_score, 2)
    }
}

/// A relative change to one user's statistics.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub struct StatChange {
    pub won: i64,
    pub lost: i64,
    pub tied: i64,
    pub debates: i64,
    pub elo: i64,
    /// Hundredths of a point.
    pub score: i64,
    /// Hundredths of a point.
    pub max_score: i64,
}

impl StatChange {
    /// One more debate with the given result.
    pub fn debate(
        result: MatchResult,
        elo: i64,
        score: i64,
        max_score: i64,
    ) -> Self {
        Self {
            debates: 1,
            elo,
            ..Self::result(result, score, max_score)
        }
    }

    /// A result and its scores, without touching the debate count or rating.
    pub fn result(result: MatchResult, score: i64, max_score: i64) -> Self {
        let mut change = Self {
            score,
            max_score,
            ..Self::default()
        };
        match result {
            MatchResult::Win => change.won = 1,
            MatchResult::Loss => change.lost = 1,
            MatchResult::Draw => change.tied = 1,
        }
        change
    }

    pub fn with_elo(self, elo: i64) -> Self {
        Self { elo, ..self }
    }
}

impl Neg for StatChange {
    type Output = StatChange;

    fn neg(self) -> StatChange {
        StatChange {
            won: -self.won,
            lost: -self.lost,
            tied: -self.tied,
            debates: -self.debates,
            elo: -self.elo,
            score: -self.score,
            max_score: -self.max_score,
        }
    }
}

/// Adds `change` to the user's statistics in place.
pub fn apply_change(
    user_id: &str,
    change: &StatChange,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<(), EngineError> {
    let updated = diesel::update(users::table.find(user_id))
        .set((
            users::debates_won.eq(users::debates_won + change.won),
            users::debates_lost.eq(users::debates_lost + change.lost),
            users::debates_tied.eq(users::debates_tied + change.tied),
            users::total_debates.eq(users::total_debates + change.debates),
            users::elo_rating.eq(users::elo_rating + change.elo),
            users::total_score.eq(users::total_score + change.score),
            users::total_max_score
                .eq(users::total_max_score + change.max_score),
        ))
        .execute(conn)?;

    if updated == 0 {
        return Err(EngineError::UserNotFound(user_id.to_string()));
    }
    Ok(())
}

/// Folds one more debate of `rounds` rounds into the user's running average.
///
/// Must run before the debate itself is counted in `total_debates`.
pub fn record_rounds(
    user_id: &str,
    rounds: i64,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<(), EngineError> {
    let user = User::fetch(user_id, conn)?;
    let old_count = user.total_debates as f64;
    let average =
        (user.average_rounds * old_count + rounds as f64) / (old_count + 1.0);

    diesel::update(users::table.find(user_id))
        .set(users::average_rounds.eq(average))
        .execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debate_change_counts_one_result() {
        let change = StatChange::debate(MatchResult::Loss, -16, 9000, 30000);
        assert_eq!(
            change,
            StatChange {
                won: 0,
                lost: 1,
                tied: 0,
                debates: 1,
                elo: -16,
                score: 9000,
                max_score: 30000,
            }
        );
    }

    #[test]
    fn negation_reverses_result() {
        let change = StatChange::result(MatchResult::Draw, 14950, 30000);
        let reversed = -change;
        assert_eq!(reversed.tied, -1);
        assert_eq!(reversed.score, -14950);
        assert_eq!(reversed.debates, 0);
        assert_eq!(reversed.elo, 0);
    }
}
