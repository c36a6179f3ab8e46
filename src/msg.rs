use serde::{Deserialize, Serialize};

use crate::rating::MatchResult;

#[derive(Clone, Debug)]
/// A notification for one participant, sent after a debate is resolved or an
/// appeal is decided. Each resolution event produces one message per
/// participant.
pub struct Msg {
    pub debate_id: String,
    pub user_id: String,
    pub inner: MsgContents,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum MsgContents {
    DebateResolved(OutcomeTag),
    AppealResolved {
        outcome: OutcomeTag,
        /// Whether the appeal changed the result.
        overturned: bool,
    },
}

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum OutcomeTag {
    Won,
    Lost,
    Tied,
}

impl From<MatchResult> for OutcomeTag {
    fn from(result: MatchResult) -> Self {
        match result {
            MatchResult::Win => OutcomeTag::Won,
            MatchResult::Loss => OutcomeTag::Lost,
            MatchResult::Draw => OutcomeTag::Tied,
        }
    }
}
