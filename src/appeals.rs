//! Appeals: a second panel, disjoint from the first where the roster allows,
//! re-scores a resolved debate. If the outcome changes, the original result
//! is backed out of both participants' records and the new one applied.

use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    debates::{AppealStatus, Award, Debate, DebateContext, DebateStatus},
    engine::Engine,
    error::EngineError,
    judges::Judge,
    msg::{MsgContents, OutcomeTag},
    provider::JudgeProvider,
    rating::elo_deltas,
    schema::debates,
    state::{DbPool, with_conn},
    users::{StatChange, User, apply_change},
    verdicts::{Decision, Pass, Totals, Verdict},
};

pub const REJECTION_FALLBACK: &str = "A fresh panel of judges reviewed the \
     debate and reached the same outcome, so the original decision stands.";
pub const APPROVAL_FALLBACK: &str = "A fresh panel of judges reviewed the \
     debate and reached a different outcome, so the original decision has \
     been overturned.";

const CLERK_PROMPT: &str = "You write short, neutral explanations of appeal \
     decisions for a debate platform. Address the participants directly, \
     refer to the scores where useful, and keep to three sentences or fewer. \
     Reply with plain text only.";

/// The outcome of [`Engine::reconcile`].
#[derive(Clone, Debug, Serialize)]
pub struct AppealOutcome {
    pub debate_id: String,
    /// Whether the appeal panel reached a different winner.
    pub flipped: bool,
    pub original_winner_id: Option<String>,
    pub winner_id: Option<String>,
    pub decision: Decision,
    pub totals: Totals,
    /// The rating change applied by the appeal. Zero for both sides unless
    /// the appeal flipped the result.
    pub challenger_elo_change: i64,
    pub opponent_elo_change: i64,
    pub verdicts: Vec<Verdict>,
}

fn check_reconcilable(debate: &Debate) -> Result<(), EngineError> {
    if debate.status()? != DebateStatus::Appealed {
        return Err(debate.invalid_state("APPEALED"));
    }
    if debate.appeal_status()? != Some(AppealStatus::Pending) {
        return Err(debate.invalid_state("APPEALED with a PENDING appeal"));
    }
    debate.require_opponent()?;
    Ok(())
}

impl Engine {
    /// Opens an appeal against a resolved debate, recording the winner at
    /// this moment so the appeal panel has something to compare against.
    #[tracing::instrument(skip_all, fields(debate_id = %debate_id))]
    pub async fn file_appeal(
        &self,
        debate_id: &str,
        reason: &str,
    ) -> Result<(), EngineError> {
        let id = debate_id.to_string();
        let reason = reason.to_string();
        with_conn(&self.pool, move |conn| {
            conn.transaction(|conn| {
                let debate = Debate::fetch(&id, conn)?;
                if debate.appeal_status.is_some() {
                    return Err(EngineError::AlreadyAppealed(debate.id));
                }
                if debate.status()? != DebateStatus::VerdictReady
                    || !debate.verdict_reached
                {
                    return Err(debate.invalid_state("VERDICT_READY"));
                }

                diesel::update(debates::table.find(&debate.id))
                    .set((
                        debates::original_winner_id.eq(&debate.winner_id),
                        debates::appeal_reason.eq(&reason),
                        debates::appealed_at.eq(Utc::now().naive_utc()),
                        debates::appeal_status
                            .eq(AppealStatus::Pending.as_str()),
                        debates::status.eq(DebateStatus::Appealed.as_str()),
                    ))
                    .execute(conn)?;
                Ok(())
            })
        })
        .await?;

        info!(debate_id, "appeal filed");
        Ok(())
    }

    /// Re-scores an appealed debate with a new panel and settles the appeal.
    ///
    /// Ratings are never rolled back. When the result flips, the counters
    /// and scores of the original result are reversed and a fresh rating
    /// change for the new result is layered on top of the old one.
    #[tracing::instrument(skip_all, fields(debate_id = %debate_id))]
    pub async fn reconcile(
        &self,
        debate_id: &str,
    ) -> Result<AppealOutcome, EngineError> {
        let provider = self.provider()?;

        let id = debate_id.to_string();
        let (debate, context, roster, original) =
            with_conn(&self.pool, move |conn| {
                let debate = Debate::fetch(&id, conn)?;
                check_reconcilable(&debate)?;
                let context = debate.context(conn)?;
                let roster = Judge::roster(conn)?;
                let original =
                    Verdict::of_pass(&debate.id, Pass::Original, conn)?;
                Ok((debate, context, roster, original))
            })
            .await?;

        let exclude = original
            .iter()
            .map(|v| v.judge_id.clone())
            .collect::<HashSet<_>>();
        let panel = self.sample_panel(&roster, &exclude)?;

        let id = debate.id.clone();
        with_conn(&self.pool, move |conn| {
            conn.transaction(|conn| {
                mark_appeal(
                    &id,
                    AppealStatus::Pending,
                    AppealStatus::Processing,
                    conn,
                )?;
                // left by an attempt that was released back to PENDING
                Verdict::discard_pass(&id, Pass::Appeal, conn)?;
                Ok(())
            })
        })
        .await?;

        let verdicts = self
            .aggregator(provider.clone())
            .collect(Pass::Appeal, &debate, &context, &panel)
            .await;

        if verdicts.iter().all(|v| v.is_fallback) {
            warn!(
                debate_id = %debate.id,
                recorded = verdicts.len(),
                "no judge on the appeal panel produced a verdict"
            );
            set_appeal_status(
                &self.pool,
                &debate.id,
                AppealStatus::Processing,
                AppealStatus::Denied,
            )
            .await?;
            return Err(EngineError::AppealExhausted(debate.id.clone()));
        }

        let original_totals = Totals::of(&original);
        let totals = Totals::of(&verdicts);
        let decision = totals.decision();
        let winner_id = decision.winner_id(&debate);
        let flipped = winner_id != debate.original_winner_id;
        let panel_ids = panel.iter().map(|j| j.id.clone()).collect::<Vec<_>>();

        let id = debate.id.clone();
        let winner = winner_id.clone();
        let committed = if flipped {
            with_conn(&self.pool, move |conn| {
                conn.transaction(|conn| {
                    commit_flip(
                        &id, winner, decision, totals, &panel_ids, conn,
                    )
                })
            })
            .await
        } else {
            with_conn(&self.pool, move |conn| {
                conn.transaction(|conn| {
                    Judge::record_assignments(&panel_ids, conn)?;
                    mark_appeal(
                        &id,
                        AppealStatus::Processing,
                        AppealStatus::Resolved,
                        conn,
                    )?;
                    Ok((0, 0))
                })
            })
            .await
        };
        let (challenger_delta, opponent_delta): (i64, i64) = match committed {
            Ok(deltas) => deltas,
            Err(e) => {
                self.release_appeal(&debate.id).await;
                return Err(e);
            }
        };

        info!(
            debate_id = %debate.id,
            flipped,
            decision = %decision,
            challenger_total = %totals.challenger,
            opponent_total = %totals.opponent,
            challenger_delta,
            opponent_delta,
            "appeal resolved"
        );

        let result = decision.challenger_result();
        let participants = [
            (debate.challenger_id.as_str(), OutcomeTag::from(result)),
            (debate.require_opponent()?, OutcomeTag::from(result.inverse())),
        ];
        for (user_id, outcome) in participants {
            self.notify(
                &debate.id,
                user_id,
                MsgContents::AppealResolved {
                    outcome,
                    overturned: flipped,
                },
            );
        }

        let prompt = explanation_prompt(
            &debate,
            &context,
            &original_totals,
            &totals,
            decision,
            flipped,
        );
        let pool = self.pool.clone();
        let id = debate.id.clone();
        self.background
            .spawn("appeal-explanation", &debate.id, async move {
                let text = explain(provider, &prompt, flipped).await;
                attach_explanation(&pool, id, text, flipped).await
            })
            .await;

        Ok(AppealOutcome {
            debate_id: debate.id,
            flipped,
            original_winner_id: debate.original_winner_id,
            winner_id,
            decision,
            totals,
            challenger_elo_change: challenger_delta,
            opponent_elo_change: opponent_delta,
            verdicts,
        })
    }

    /// Hands an appeal whose result could not be committed back to
    /// `PENDING`, so that it can be reconciled again.
    async fn release_appeal(&self, debate_id: &str) {
        let released = set_appeal_status(
            &self.pool,
            debate_id,
            AppealStatus::Processing,
            AppealStatus::Pending,
        )
        .await;
        match released {
            Ok(()) => warn!(debate_id, "appeal returned to PENDING"),
            Err(e) => {
                error!(debate_id, error = %e, "could not release appeal")
            }
        }
    }
}

/// Moves the appeal from `from` to `to`, failing if another caller has
/// already moved it on.
fn mark_appeal(
    debate_id: &str,
    from: AppealStatus,
    to: AppealStatus,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<(), EngineError> {
    let updated = diesel::update(
        debates::table
            .find(debate_id)
            .filter(debates::appeal_status.eq(from.as_str())),
    )
    .set(debates::appeal_status.eq(to.as_str()))
    .execute(conn)?;

    if updated == 0 {
        let debate = Debate::fetch(debate_id, conn)?;
        return Err(debate.invalid_state(from.as_str()));
    }
    Ok(())
}

async fn set_appeal_status(
    pool: &DbPool,
    debate_id: &str,
    from: AppealStatus,
    to: AppealStatus,
) -> Result<(), EngineError> {
    let id = debate_id.to_string();
    with_conn(pool, move |conn| mark_appeal(&id, from, to, conn)).await
}

/// Backs the original result out of both participants' records and applies
/// the appeal result. Returns the new rating changes.
fn commit_flip(
    debate_id: &str,
    winner_id: Option<String>,
    decision: Decision,
    totals: Totals,
    panel_ids: &[String],
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<(i64, i64), EngineError> {
    let debate = Debate::fetch(debate_id, conn)?;
    if debate.appeal_status()? != Some(AppealStatus::Processing) {
        return Err(debate.invalid_state("APPEALED with a PROCESSING appeal"));
    }
    let opponent_id = debate.require_opponent()?.to_string();
    let original = debate
        .award()
        .ok_or_else(|| debate.invalid_state("a recorded award"))?;

    Judge::record_assignments(panel_ids, conn)?;

    let original_result = debate
        .decision_for_winner(debate.original_winner_id.as_deref())
        .challenger_result();
    let reversals = [
        (
            &debate.challenger_id,
            StatChange::result(
                original_result,
                original.challenger,
                original.max_possible,
            ),
        ),
        (
            &opponent_id,
            StatChange::result(
                original_result.inverse(),
                original.opponent,
                original.max_possible,
            ),
        ),
    ];
    for (user_id, change) in reversals {
        apply_change(user_id, &-change, conn)?;
    }

    let challenger = User::fetch(&debate.challenger_id, conn)?;
    let opponent = User::fetch(&opponent_id, conn)?;
    let result = decision.challenger_result();
    let (challenger_delta, opponent_delta) =
        elo_deltas(challenger.elo_rating, opponent.elo_rating, result);

    let award = Award::of(&totals);
    let reapplied = [
        (
            &debate.challenger_id,
            StatChange::result(result, award.challenger, award.max_possible)
                .with_elo(challenger_delta),
        ),
        (
            &opponent_id,
            StatChange::result(
                result.inverse(),
                award.opponent,
                award.max_possible,
            )
            .with_elo(opponent_delta),
        ),
    ];
    for (user_id, change) in reapplied {
        apply_change(user_id, &change, conn)?;
    }

    diesel::update(debates::table.find(&debate.id))
        .set((
            debates::winner_id.eq(&winner_id),
            debates::verdict_reached.eq(true),
            debates::verdict_date.eq(Utc::now().naive_utc()),
            debates::appeal_status.eq(AppealStatus::Resolved.as_str()),
            debates::status.eq(DebateStatus::VerdictReady.as_str()),
            debates::challenger_elo_change.eq(challenger_delta),
            debates::opponent_elo_change.eq(opponent_delta),
            debates::challenger_score_awarded.eq(award.challenger),
            debates::opponent_score_awarded.eq(award.opponent),
            debates::max_score_awarded.eq(award.max_possible),
        ))
        .execute(conn)?;

    Ok((challenger_delta, opponent_delta))
}

fn describe(decision: Decision, context: &DebateContext) -> String {
    match decision {
        Decision::ChallengerWins => format!("{} won", context.challenger_name),
        Decision::OpponentWins => format!("{} won", context.opponent_name),
        Decision::Tie => "the debate was a tie".to_string(),
    }
}

fn explanation_prompt(
    debate: &Debate,
    context: &DebateContext,
    original: &Totals,
    totals: &Totals,
    decision: Decision,
    flipped: bool,
) -> String {
    let original_decision =
        debate.decision_for_winner(debate.original_winner_id.as_deref());
    format!(
        "Debate topic: {topic}\n\
         Appeal reason: {reason}\n\
         Original result: {before} ({oc} to {oo} out of {om}).\n\
         Appeal panel result: {after} ({nc} to {no} out of {nm}).\n\
         The appeal was {verdict}. Explain this to the participants, \
         {challenger} and {opponent}.",
        topic = context.topic,
        reason = debate.appeal_reason.as_deref().unwrap_or("none given"),
        before = describe(original_decision, context),
        oc = original.challenger,
        oo = original.opponent,
        om = original.max_possible,
        after = describe(decision, context),
        nc = totals.challenger,
        no = totals.opponent,
        nm = totals.max_possible,
        verdict = if flipped { "upheld" } else { "rejected" },
        challenger = context.challenger_name,
        opponent = context.opponent_name,
    )
}

async fn explain(
    provider: Arc<dyn JudgeProvider>,
    prompt: &str,
    flipped: bool,
) -> String {
    let fallback = if flipped {
        APPROVAL_FALLBACK
    } else {
        REJECTION_FALLBACK
    };

    match provider.complete(CLERK_PROMPT, prompt).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => fallback.to_string(),
        Err(e) => {
            warn!(error = %e, "could not generate appeal explanation");
            fallback.to_string()
        }
    }
}

async fn attach_explanation(
    pool: &DbPool,
    debate_id: String,
    text: String,
    flipped: bool,
) -> Result<(), EngineError> {
    with_conn(pool, move |conn| {
        let debate = debates::table.find(&debate_id);
        if flipped {
            diesel::update(debate)
                .set(debates::appeal_approval_reason.eq(&text))
                .execute(conn)?;
        } else {
            diesel::update(debate)
                .set(debates::appeal_rejection_reason.eq(&text))
                .execute(conn)?;
        }
        Ok(())
    })
    .await
}
