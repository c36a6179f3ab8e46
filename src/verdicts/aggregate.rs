use std::sync::Arc;

use chrono::Utc;
use diesel::prelude::*;
use futures::future::join_all;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    debates::{Debate, DebateContext},
    error::EngineError,
    judges::Judge,
    provider::{JudgeProvider, JudgeResponse},
    schema::debate_verdicts,
    state::{DbPool, with_conn},
    verdicts::{Decision, Pass, Verdict, derive_decision, normalize_score},
};

/// The score given to both sides when a judge could not be consulted.
pub const FALLBACK_SCORE: f64 = 50.0;

/// Runs a panel of judges against one debate.
pub struct VerdictAggregator {
    provider: Arc<dyn JudgeProvider>,
    pool: DbPool,
}

/// Scores for one judge, before they are tied to a debate.
struct Scored {
    challenger_score: f64,
    opponent_score: f64,
    reasoning: String,
    stated_decision: Option<String>,
    is_fallback: bool,
}

impl Scored {
    fn from_response(response: JudgeResponse) -> Option<Scored> {
        Some(Scored {
            challenger_score: normalize_score(response.challenger_score)?,
            opponent_score: normalize_score(response.opponent_score)?,
            reasoning: response.reasoning,
            stated_decision: Some(response.decision)
                .filter(|d| !d.trim().is_empty()),
            is_fallback: false,
        })
    }

    fn fallback(cause: &str) -> Scored {
        Scored {
            challenger_score: FALLBACK_SCORE,
            opponent_score: FALLBACK_SCORE,
            reasoning: format!(
                "This judge was unable to evaluate the debate ({cause}), so \
                 a neutral score was recorded."
            ),
            stated_decision: None,
            is_fallback: true,
        }
    }
}

impl VerdictAggregator {
    pub fn new(provider: Arc<dyn JudgeProvider>, pool: DbPool) -> Self {
        Self { provider, pool }
    }

    /// Asks every judge on `panel` to score the debate, all at once.
    ///
    /// A judge whose call fails gets a neutral verdict instead, so one bad
    /// call never sinks the panel. Each verdict is written as soon as it is
    /// ready. A verdict that cannot be written is logged and left out of the
    /// returned list.
    pub async fn collect(
        &self,
        pass: Pass,
        debate: &Debate,
        context: &DebateContext,
        panel: &[Judge],
    ) -> Vec<Verdict> {
        let verdicts = join_all(
            panel
                .iter()
                .map(|judge| self.judge_one(pass, debate, context, judge)),
        )
        .await;

        let verdicts = verdicts.into_iter().flatten().collect::<Vec<_>>();

        info!(
            debate_id = %debate.id,
            appeal = pass.is_appeal(),
            panel = panel.len(),
            recorded = verdicts.len(),
            fallbacks = verdicts.iter().filter(|v| v.is_fallback).count(),
            "collected verdicts"
        );

        verdicts
    }

    async fn judge_one(
        &self,
        pass: Pass,
        debate: &Debate,
        context: &DebateContext,
        judge: &Judge,
    ) -> Option<Verdict> {
        let response =
            self.provider.judge(&judge.system_prompt, context).await;

        let scored = match response {
            Ok(response) => {
                Scored::from_response(response).unwrap_or_else(|| {
                    warn!(
                        debate_id = %debate.id,
                        judge_id = %judge.id,
                        "judge returned a non-numeric score"
                    );
                    Scored::fallback("invalid scores")
                })
            }
            Err(e) => {
                warn!(
                    debate_id = %debate.id,
                    judge_id = %judge.id,
                    error = %e,
                    "judge failed, substituting a neutral verdict"
                );
                Scored::fallback("provider error")
            }
        };

        let decision =
            derive_decision(scored.challenger_score, scored.opponent_score);

        if let Some(stated) = &scored.stated_decision
            && Decision::parse_lenient(stated) != Some(decision)
        {
            warn!(
                debate_id = %debate.id,
                judge_id = %judge.id,
                stated = %stated,
                derived = %decision,
                challenger_score = scored.challenger_score,
                opponent_score = scored.opponent_score,
                "judge's stated decision disagrees with its scores"
            );
        }

        let verdict = Verdict {
            id: Uuid::now_v7().to_string(),
            debate_id: debate.id.clone(),
            judge_id: judge.id.clone(),
            is_appeal: pass.is_appeal(),
            decision: decision.to_string(),
            reasoning: scored.reasoning,
            challenger_score: scored.challenger_score,
            opponent_score: scored.opponent_score,
            winner_id: decision.winner_id(debate),
            is_fallback: scored.is_fallback,
            created_at: Utc::now().naive_utc(),
        };

        let row = verdict.clone();
        let written = with_conn(&self.pool, move |conn| {
            diesel::insert_into(debate_verdicts::table)
                .values(&row)
                .execute(conn)?;
            Ok::<_, EngineError>(())
        })
        .await;

        match written {
            Ok(()) => Some(verdict),
            Err(e) => {
                error!(
                    debate_id = %debate.id,
                    judge_id = %judge.id,
                    error = %e,
                    "could not record verdict, dropping it from the panel"
                );
                None
            }
        }
    }
}
