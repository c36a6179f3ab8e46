use std::{fmt, str::FromStr};

use chrono::NaiveDateTime;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};

use crate::{
    error::EngineError,
    schema::{debate_statements, debates, users},
    verdicts::{Decision, Totals, to_centipoints},
};

pub mod context;

pub use context::DebateContext;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum DebateStatus {
    Active,
    Completed,
    VerdictReady,
    Appealed,
}

impl DebateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DebateStatus::Active => "ACTIVE",
            DebateStatus::Completed => "COMPLETED",
            DebateStatus::VerdictReady => "VERDICT_READY",
            DebateStatus::Appealed => "APPEALED",
        }
    }
}

impl fmt::Display for DebateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DebateStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(DebateStatus::Active),
            "COMPLETED" => Ok(DebateStatus::Completed),
            "VERDICT_READY" => Ok(DebateStatus::VerdictReady),
            "APPEALED" => Ok(DebateStatus::Appealed),
            other => Err(EngineError::UnknownValue {
                column: "debates.status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum AppealStatus {
    Pending,
    Processing,
    Resolved,
    Denied,
}

impl AppealStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppealStatus::Pending => "PENDING",
            AppealStatus::Processing => "PROCESSING",
            AppealStatus::Resolved => "RESOLVED",
            AppealStatus::Denied => "DENIED",
        }
    }
}

impl fmt::Display for AppealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppealStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(AppealStatus::Pending),
            "PROCESSING" => Ok(AppealStatus::Processing),
            "RESOLVED" => Ok(AppealStatus::Resolved),
            "DENIED" => Ok(AppealStatus::Denied),
            other => Err(EngineError::UnknownValue {
                column: "debates.appeal_status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Queryable, Selectable, Serialize, Clone, Debug)]
#[diesel(check_for_backend(Sqlite))]
#[diesel(table_name = debates)]
pub struct Debate {
    pub id: String,
    pub topic: String,
    pub challenger_id: String,
    pub opponent_id: Option<String>,
    pub challenger_position: String,
    pub opponent_position: String,
    pub current_round: i64,
    pub total_rounds: i64,
    pub status: String,
    /// `None` once a verdict has been reached means the debate was tied.
    pub winner_id: Option<String>,
    pub verdict_reached: bool,
    pub verdict_date: Option<NaiveDateTime>,
    pub challenger_elo_change: Option<i64>,
    pub opponent_elo_change: Option<i64>,
    pub appeal_status: Option<String>,
    /// The winner at the time the appeal was filed.
    pub original_winner_id: Option<String>,
    pub appeal_reason: Option<String>,
    pub appealed_at: Option<NaiveDateTime>,
    pub appeal_rejection_reason: Option<String>,
    pub appeal_approval_reason: Option<String>,
    pub tournament_match_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub challenger_score_awarded: Option<i64>,
    pub opponent_score_awarded: Option<i64>,
    pub max_score_awarded: Option<i64>,
}

/// The scores a result credited to each side, in hundredths of a point.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Award {
    pub challenger: i64,
    pub opponent: i64,
    pub max_possible: i64,
}

impl Award {
    pub fn of(totals: &Totals) -> Award {
        Award {
            challenger: to_centipoints(totals.challenger),
            opponent: to_centipoints(totals.opponent),
            max_possible: to_centipoints(totals.max_possible),
        }
    }
}

impl Debate {
    pub fn fetch(
        debate_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Debate, EngineError> {
        debates::table
            .find(debate_id)
            .select(Debate::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| EngineError::DebateNotFound(debate_id.to_string()))
    }

    pub fn status(&self) -> Result<DebateStatus, EngineError> {
        self.status.parse()
    }

    pub fn appeal_status(&self) -> Result<Option<AppealStatus>, EngineError> {
        self.appeal_status.as_deref().map(str::parse).transpose()
    }

    /// What the result in force credited to each side. `None` until the
    /// debate has been resolved.
    pub fn award(&self) -> Option<Award> {
        Some(Award {
            challenger: self.challenger_score_awarded?,
            opponent: self.opponent_score_awarded?,
            max_possible: self.max_score_awarded?,
        })
    }

    /// The opponent's id, or `MissingOpponent` for open challenges that
    /// nobody accepted.
    pub fn require_opponent(&self) -> Result<&str, EngineError> {
        self.opponent_id
            .as_deref()
            .ok_or_else(|| EngineError::MissingOpponent(self.id.clone()))
    }

    pub fn invalid_state(&self, expected: &'static str) -> EngineError {
        EngineError::InvalidState {
            debate_id: self.id.clone(),
            status: self.status.clone(),
            expected,
        }
    }

    /// The decision the stored winner represents. Only meaningful once
    /// `verdict_reached` is set.
    pub fn decision_for_winner(&self, winner_id: Option<&str>) -> Decision {
        match winner_id {
            None => Decision::Tie,
            Some(winner) if winner == self.challenger_id => {
                Decision::ChallengerWins
            }
            Some(_) => Decision::OpponentWins,
        }
    }

    pub fn statements(
        &self,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Vec<Statement>, EngineError> {
        Ok(debate_statements::table
            .filter(debate_statements::debate_id.eq(&self.id))
            .order_by(debate_statements::created_at.asc())
            .then_order_by(debate_statements::id.asc())
            .select(Statement::as_select())
            .load(conn)?)
    }

    /// Builds the transcript the judges see.
    pub fn context(
        &self,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<DebateContext, EngineError> {
        let opponent_id = self.require_opponent()?;
        let challenger_name = username(&self.challenger_id, conn)?;
        let opponent_name = username(opponent_id, conn)?;
        let statements = self.statements(conn)?;

        Ok(DebateContext::new(
            self,
            challenger_name,
            opponent_name,
            &statements,
        ))
    }
}

fn username(
    user_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<String, EngineError> {
    users::table
        .find(user_id)
        .select(users::username)
        .first::<String>(conn)
        .optional()?
        .ok_or_else(|| EngineError::UserNotFound(user_id.to_string()))
}

#[derive(Queryable, Selectable, Serialize, Clone, Debug)]
#[diesel(check_for_backend(Sqlite))]
#[diesel(table_name = debate_statements)]
pub struct Statement {
    pub id: String,
    pub debate_id: String,
    pub author_id: String,
    pub round: i64,
    pub content: String,
    pub created_at: NaiveDateTime,
}
