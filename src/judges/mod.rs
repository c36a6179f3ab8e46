use chrono::NaiveDateTime;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};

use crate::{error::EngineError, schema::judges};

pub mod sample;

/// A judge persona. The system prompt is handed to the provider verbatim for
/// every debate this judge is asked to score.
#[derive(
    Queryable, Selectable, Serialize, Deserialize, Clone, Debug, PartialEq,
)]
#[diesel(check_for_backend(Sqlite))]
#[diesel(table_name = judges)]
pub struct Judge {
    pub id: String,
    pub name: String,
    pub system_prompt: String,
    pub debates_judged: i64,
    pub created_at: NaiveDateTime,
}

impl Judge {
    /// All judges currently on the roster.
    pub fn roster(
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Vec<Judge>, EngineError> {
        Ok(judges::table
            .order_by(judges::created_at.asc())
            .select(Judge::as_select())
            .load(conn)?)
    }

    /// Records that each of `judge_ids` has judged one more debate.
    pub fn record_assignments(
        judge_ids: &[String],
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<(), EngineError> {
        diesel::update(judges::table.filter(judges::id.eq_any(judge_ids)))
            .set(judges::debates_judged.eq(judges::debates_judged + 1))
            .execute(conn)?;
        Ok(())
    }
}
