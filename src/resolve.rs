//! First-pass resolution of a completed debate.

use std::collections::HashSet;

use chrono::Utc;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    debates::{Award, Debate, DebateStatus},
    engine::Engine,
    error::EngineError,
    judges::Judge,
    msg::{MsgContents, OutcomeTag},
    rating::elo_deltas,
    schema::debates,
    state::with_conn,
    users::{StatChange, User, apply_change, record_rounds},
    verdicts::{Decision, Pass, Totals, Verdict},
};

/// The outcome of [`Engine::resolve`].
#[derive(Clone, Debug, Serialize)]
pub struct Resolution {
    pub debate_id: String,
    /// `None` for a tie.
    pub winner_id: Option<String>,
    pub decision: Decision,
    pub totals: Totals,
    pub challenger_elo_change: i64,
    pub opponent_elo_change: i64,
    pub verdicts: Vec<Verdict>,
}

/// Checks that `debate` is waiting for a verdict.
fn check_resolvable(
    debate: &Debate,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<(), EngineError> {
    match debate.status()? {
        DebateStatus::Completed | DebateStatus::VerdictReady
            if debate.verdict_reached =>
        {
            return Err(EngineError::AlreadyResolved(debate.id.clone()));
        }
        DebateStatus::Completed => {}
        DebateStatus::VerdictReady => {
            if Verdict::count_for_debate(&debate.id, conn)? > 0 {
                return Err(EngineError::AlreadyResolved(debate.id.clone()));
            }
        }
        DebateStatus::Active | DebateStatus::Appealed => {
            return Err(debate.invalid_state("COMPLETED or VERDICT_READY"));
        }
    }

    debate.require_opponent()?;
    Ok(())
}

impl Engine {
    /// Has a panel of judges decide a completed debate, then records the
    /// result against both participants.
    ///
    /// Nothing is written if a precondition fails. Once the panel has been
    /// consulted its verdicts are kept even if the final update fails; a
    /// later attempt replaces them with its own.
    #[tracing::instrument(skip_all, fields(debate_id = %debate_id))]
    pub async fn resolve(
        &self,
        debate_id: &str,
    ) -> Result<Resolution, EngineError> {
        let provider = self.provider()?;

        let id = debate_id.to_string();
        let (debate, context, roster) = with_conn(&self.pool, move |conn| {
            let debate = Debate::fetch(&id, conn)?;
            check_resolvable(&debate, conn)?;
            let context = debate.context(conn)?;
            let roster = Judge::roster(conn)?;
            Ok((debate, context, roster))
        })
        .await?;

        let panel = self.sample_panel(&roster, &HashSet::new())?;

        // verdicts from an attempt whose commit failed
        let id = debate.id.clone();
        let stale = with_conn(&self.pool, move |conn| {
            Verdict::discard_pass(&id, Pass::Original, conn)
        })
        .await?;
        if stale > 0 {
            warn!(
                debate_id = %debate.id,
                stale,
                "discarded verdicts from an unfinished resolution"
            );
        }

        let verdicts = self
            .aggregator(provider)
            .collect(Pass::Original, &debate, &context, &panel)
            .await;

        if verdicts.is_empty() {
            return Err(EngineError::NoVerdicts(debate.id.clone()));
        }

        let totals = Totals::of(&verdicts);
        let decision = totals.decision();
        let winner_id = decision.winner_id(&debate);
        let rounds = context.rounds_played();
        let panel_ids = panel.iter().map(|j| j.id.clone()).collect::<Vec<_>>();

        let id = debate.id.clone();
        let winner = winner_id.clone();
        let (challenger_id, opponent_id, challenger_delta, opponent_delta) =
            with_conn(&self.pool, move |conn| {
                conn.transaction(|conn| {
                    commit_resolution(
                        &id, winner, decision, totals, rounds, &panel_ids,
                        conn,
                    )
                })
            })
            .await?;

        info!(
            debate_id = %debate.id,
            decision = %decision,
            challenger_total = %totals.challenger,
            opponent_total = %totals.opponent,
            challenger_delta,
            opponent_delta,
            "debate resolved"
        );

        let challenger_tag = OutcomeTag::from(decision.challenger_result());
        let opponent_tag =
            OutcomeTag::from(decision.challenger_result().inverse());
        self.notify(
            &debate.id,
            &challenger_id,
            MsgContents::DebateResolved(challenger_tag),
        );
        self.notify(
            &debate.id,
            &opponent_id,
            MsgContents::DebateResolved(opponent_tag),
        );

        if let (Some(hook), Some(match_id)) =
            (self.tournament.clone(), debate.tournament_match_id.clone())
        {
            let debate_id = debate.id.clone();
            let winner = winner_id.clone();
            self.background
                .spawn("tournament-update", &debate.id, async move {
                    hook.debate_resolved(
                        &match_id,
                        &debate_id,
                        winner.as_deref(),
                    )
                    .await
                })
                .await;
        }

        Ok(Resolution {
            debate_id: debate.id,
            winner_id,
            decision,
            totals,
            challenger_elo_change: challenger_delta,
            opponent_elo_change: opponent_delta,
            verdicts,
        })
    }
}

/// Writes a decided result. Runs inside a transaction, and repeats the status
/// check so that a second resolver racing this one cannot apply its result
/// too.
fn commit_resolution(
    debate_id: &str,
    winner_id: Option<String>,
    decision: Decision,
    totals: Totals,
    rounds: i64,
    panel_ids: &[String],
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<(String, String, i64, i64), EngineError> {
    let debate = Debate::fetch(debate_id, conn)?;
    match debate.status()? {
        _ if debate.verdict_reached => {
            return Err(EngineError::AlreadyResolved(debate.id.clone()));
        }
        DebateStatus::Completed | DebateStatus::VerdictReady => {}
        DebateStatus::Active | DebateStatus::Appealed => {
            return Err(debate.invalid_state("COMPLETED or VERDICT_READY"));
        }
    }
    let opponent_id = debate.require_opponent()?.to_string();

    Judge::record_assignments(panel_ids, conn)?;

    let challenger = User::fetch(&debate.challenger_id, conn)?;
    let opponent = User::fetch(&opponent_id, conn)?;
    let challenger_result = decision.challenger_result();
    let (challenger_delta, opponent_delta) = elo_deltas(
        challenger.elo_rating,
        opponent.elo_rating,
        challenger_result,
    );

    let award = Award::of(&totals);
    diesel::update(debates::table.find(&debate.id))
        .set((
            debates::status.eq(DebateStatus::VerdictReady.as_str()),
            debates::winner_id.eq(&winner_id),
            debates::verdict_reached.eq(true),
            debates::verdict_date.eq(Utc::now().naive_utc()),
            debates::challenger_elo_change.eq(challenger_delta),
            debates::opponent_elo_change.eq(opponent_delta),
            debates::challenger_score_awarded.eq(award.challenger),
            debates::opponent_score_awarded.eq(award.opponent),
            debates::max_score_awarded.eq(award.max_possible),
        ))
        .execute(conn)?;

    let sides = [
        (
            &debate.challenger_id,
            challenger_result,
            challenger_delta,
            award.challenger,
        ),
        (
            &opponent_id,
            challenger_result.inverse(),
            opponent_delta,
            award.opponent,
        ),
    ];
    for (user_id, result, delta, score) in sides {
        record_rounds(user_id, rounds, conn)?;
        apply_change(
            user_id,
            &StatChange::debate(result, delta, score, award.max_possible),
            conn,
        )?;
    }

    Ok((
        debate.challenger_id.clone(),
        opponent_id,
        challenger_delta,
        opponent_delta,
    ))
}
