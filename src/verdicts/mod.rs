use std::{fmt, str::FromStr};

use chrono::NaiveDateTime;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::{
    debates::Debate, error::EngineError, rating::MatchResult,
    schema::debate_verdicts,
};

pub mod aggregate;

/// A single judge's scores must differ by at least this much for the judge
/// to have picked a winner.
pub const JUDGE_TIE_THRESHOLD: f64 = 1.0;

/// Summed scores must differ by at least this much for the panel to have
/// picked a winner.
pub const AGGREGATE_TIE_THRESHOLD: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// The most points a judge can award one side.
pub const MAX_SCORE: f64 = 100.0;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Decision {
    ChallengerWins,
    OpponentWins,
    Tie,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::ChallengerWins => "CHALLENGER_WINS",
            Decision::OpponentWins => "OPPONENT_WINS",
            Decision::Tie => "TIE",
        }
    }

    /// Interprets free text from a provider. Anything that does not clearly
    /// name an outcome yields `None`.
    pub fn parse_lenient(raw: &str) -> Option<Decision> {
        let normalized = raw
            .trim()
            .to_ascii_uppercase()
            .replace([' ', '-'], "_");
        match normalized.as_str() {
            "CHALLENGER_WINS" | "CHALLENGER" | "CHALLENGER_WIN" => {
                Some(Decision::ChallengerWins)
            }
            "OPPONENT_WINS" | "OPPONENT" | "OPPONENT_WIN" => {
                Some(Decision::OpponentWins)
            }
            "TIE" | "DRAW" => Some(Decision::Tie),
            _ => None,
        }
    }

    /// The result this decision represents for the challenger.
    pub fn challenger_result(self) -> MatchResult {
        match self {
            Decision::ChallengerWins => MatchResult::Win,
            Decision::OpponentWins => MatchResult::Loss,
            Decision::Tie => MatchResult::Draw,
        }
    }

    /// The winning user, if any.
    pub fn winner_id(self, debate: &Debate) -> Option<String> {
        match self {
            Decision::ChallengerWins => Some(debate.challenger_id.clone()),
            Decision::OpponentWins => debate.opponent_id.clone(),
            Decision::Tie => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CHALLENGER_WINS" => Ok(Decision::ChallengerWins),
            "OPPONENT_WINS" => Ok(Decision::OpponentWins),
            "TIE" => Ok(Decision::Tie),
            other => Err(EngineError::UnknownValue {
                column: "decision",
                value: other.to_string(),
            }),
        }
    }
}

/// Works out a judge's decision from the scores they gave.
///
/// Providers also state a decision, which is frequently inconsistent with
/// their own scores. It is never consulted: the scores are authoritative.
pub fn derive_decision(challenger_score: f64, opponent_score: f64) -> Decision {
    if (challenger_score - opponent_score).abs() < JUDGE_TIE_THRESHOLD {
        Decision::Tie
    } else if challenger_score > opponent_score {
        Decision::ChallengerWins
    } else {
        Decision::OpponentWins
    }
}

/// Which resolution pass a verdict belongs to.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Pass {
    Original,
    Appeal,
}

impl Pass {
    pub fn is_appeal(self) -> bool {
        matches!(self, Pass::Appeal)
    }
}

#[derive(Queryable, Selectable, Insertable, Serialize, Clone, Debug)]
#[diesel(check_for_backend(Sqlite))]
#[diesel(table_name = debate_verdicts)]
pub struct Verdict {
    pub id: String,
    pub debate_id: String,
    pub judge_id: String,
    pub is_appeal: bool,
    pub decision: String,
    pub reasoning: String,
    pub challenger_score: f64,
    pub opponent_score: f64,
    pub winner_id: Option<String>,
    /// Set when the provider failed and a neutral verdict was substituted.
    pub is_fallback: bool,
    pub created_at: NaiveDateTime,
}

impl Verdict {
    pub fn decision(&self) -> Result<Decision, EngineError> {
        self.decision.parse()
    }

    /// The verdicts recorded for `debate_id` in one resolution pass, oldest
    /// first.
    pub fn of_pass(
        debate_id: &str,
        pass: Pass,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Vec<Verdict>, EngineError> {
        Ok(debate_verdicts::table
            .filter(debate_verdicts::debate_id.eq(debate_id))
            .filter(debate_verdicts::is_appeal.eq(pass.is_appeal()))
            .order_by(debate_verdicts::created_at.asc())
            .then_order_by(debate_verdicts::id.asc())
            .select(Verdict::as_select())
            .load(conn)?)
    }

    /// Deletes the verdicts left behind by an earlier attempt at a pass
    /// whose result was never committed.
    pub fn discard_pass(
        debate_id: &str,
        pass: Pass,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<usize, EngineError> {
        Ok(diesel::delete(
            debate_verdicts::table
                .filter(debate_verdicts::debate_id.eq(debate_id))
                .filter(debate_verdicts::is_appeal.eq(pass.is_appeal())),
        )
        .execute(conn)?)
    }

    pub fn count_for_debate(
        debate_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<i64, EngineError> {
        Ok(debate_verdicts::table
            .filter(debate_verdicts::debate_id.eq(debate_id))
            .count()
            .get_result(conn)?)
    }
}

/// Converts a stored score into an exact two-decimal-place value.
pub fn score_decimal(score: f64) -> Decimal {
    Decimal::from_f64_retain(score)
        .map(|d| d.round_dp(2))
        .unwrap_or(Decimal::ZERO)
}

/// Clamps a raw provider score into range and rounds it to two decimal
/// places. Non-finite scores are rejected.
pub fn normalize_score(raw: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    score_decimal(raw.clamp(0.0, MAX_SCORE)).to_f64()
}

/// Summed scores for one resolution pass.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Totals {
    pub challenger: Decimal,
    pub opponent: Decimal,
    /// The most either side could have scored in this pass.
    pub max_possible: Decimal,
    pub verdict_count: usize,
}

impl Totals {
    pub fn of(verdicts: &[Verdict]) -> Totals {
        let (challenger, opponent) = verdicts.iter().fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(challenger, opponent), verdict| {
                (
                    challenger + score_decimal(verdict.challenger_score),
                    opponent + score_decimal(verdict.opponent_score),
                )
            },
        );

        Totals {
            challenger,
            opponent,
            max_possible: Decimal::from(verdicts.len() as i64)
                * Decimal::ONE_HUNDRED,
            verdict_count: verdicts.len(),
        }
    }

    /// The panel's decision. This uses a wider tie band than individual
    /// judges do, so close debates are not decided by noise in one score.
    pub fn decision(&self) -> Decision {
        if (self.challenger - self.opponent).abs() < AGGREGATE_TIE_THRESHOLD {
            Decision::Tie
        } else if self.challenger > self.opponent {
            Decision::ChallengerWins
        } else {
            Decision::OpponentWins
        }
    }
}

/// Converts a score into hundredths of a point, the unit user totals are
/// stored in.
pub fn to_centipoints(score: Decimal) -> i64 {
    (score * Decimal::ONE_HUNDRED).round().to_i64().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn verdict(challenger_score: f64, opponent_score: f64) -> Verdict {
        Verdict {
            id: "v".to_string(),
            debate_id: "d".to_string(),
            judge_id: "j".to_string(),
            is_appeal: false,
            decision: derive_decision(challenger_score, opponent_score)
                .to_string(),
            reasoning: String::new(),
            challenger_score,
            opponent_score,
            winner_id: None,
            is_fallback: false,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn decisions_follow_scores() {
        assert_eq!(derive_decision(50.0, 50.0), Decision::Tie);
        assert_eq!(derive_decision(60.0, 40.0), Decision::ChallengerWins);
        assert_eq!(derive_decision(40.0, 60.0), Decision::OpponentWins);
        assert_eq!(derive_decision(50.0, 50.9), Decision::Tie);
        assert_eq!(derive_decision(50.0, 51.0), Decision::OpponentWins);
    }

    #[test]
    fn lenient_parsing() {
        assert_eq!(
            Decision::parse_lenient(" challenger wins "),
            Some(Decision::ChallengerWins)
        );
        assert_eq!(
            Decision::parse_lenient("OPPONENT-WINS"),
            Some(Decision::OpponentWins)
        );
        assert_eq!(Decision::parse_lenient("draw"), Some(Decision::Tie));
        assert_eq!(Decision::parse_lenient("who knows"), None);
    }

    #[test]
    fn aggregate_tie_band_is_five_points() {
        let close = Totals::of(&[
            verdict(50.0, 48.0),
            verdict(50.0, 49.0),
            verdict(50.0, 49.0),
        ]);
        assert_eq!(close.challenger, Decimal::from(150));
        assert_eq!(close.opponent, Decimal::from(146));
        assert_eq!(close.decision(), Decision::Tie);

        let clear = Totals::of(&[
            verdict(50.0, 48.0),
            verdict(50.0, 48.0),
            verdict(50.0, 48.0),
        ]);
        assert_eq!(clear.opponent, Decimal::from(144));
        assert_eq!(clear.decision(), Decision::ChallengerWins);
    }

    #[test]
    fn aggregate_ignores_individual_decisions() {
        // every judge individually calls a tie, but the sum is decisive
        let totals = Totals::of(&[
            verdict(50.0, 48.5),
            verdict(50.0, 48.5),
            verdict(50.0, 48.5),
            verdict(50.0, 48.5),
        ]);
        assert_eq!(totals.decision(), Decision::ChallengerWins);
        assert_eq!(totals.max_possible, Decimal::from(400));
    }

    #[test]
    fn scores_are_normalized() {
        assert_eq!(normalize_score(120.0), Some(100.0));
        assert_eq!(normalize_score(-3.0), Some(0.0));
        assert_eq!(
            normalize_score(72.456).map(score_decimal),
            Some(Decimal::new(7246, 2))
        );
        assert_eq!(normalize_score(f64::NAN), None);
        assert_eq!(normalize_score(f64::INFINITY), None);
    }

    #[test]
    fn centipoints_are_exact() {
        assert_eq!(to_centipoints(score_decimal(70.1)), 7010);
        assert_eq!(to_centipoints(Decimal::from(210)), 21000);
    }
}
