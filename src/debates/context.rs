//! The view of a debate that is handed to judges.
//!
//! Judges only ever see display names, never user ids, so nothing here can be
//! used to look participants up.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::debates::{Debate, DebateStatus, Statement};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateContext {
    pub topic: String,
    pub challenger_position: String,
    pub opponent_position: String,
    pub challenger_name: String,
    pub opponent_name: String,
    pub statements: Vec<ContextStatement>,
    pub current_round: i64,
    pub total_rounds: i64,
    pub is_complete: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextStatement {
    pub round: i64,
    pub author: String,
    pub position: String,
    pub content: String,
}

impl DebateContext {
    pub fn new(
        debate: &Debate,
        challenger_name: String,
        opponent_name: String,
        statements: &[Statement],
    ) -> Self {
        let statements = statements
            .iter()
            .map(|statement| {
                let (author, position) =
                    if statement.author_id == debate.challenger_id {
                        (&challenger_name, &debate.challenger_position)
                    } else {
                        (&opponent_name, &debate.opponent_position)
                    };
                ContextStatement {
                    round: statement.round,
                    author: author.clone(),
                    position: position.clone(),
                    content: statement.content.clone(),
                }
            })
            .collect();

        let is_complete = !matches!(debate.status(), Ok(DebateStatus::Active));

        DebateContext {
            topic: debate.topic.clone(),
            challenger_position: debate.challenger_position.clone(),
            opponent_position: debate.opponent_position.clone(),
            challenger_name,
            opponent_name,
            statements,
            current_round: debate.current_round,
            total_rounds: debate.total_rounds,
            is_complete,
        }
    }

    /// The number of rounds that were actually argued. Falls back to the
    /// debate's round counter when there is no transcript.
    pub fn rounds_played(&self) -> i64 {
        self.statements
            .iter()
            .map(|s| s.round)
            .max()
            .unwrap_or(self.current_round)
    }

    /// Renders the debate as plain text for a prompt.
    pub fn transcript(&self) -> String {
        let header = format!(
            "Topic: {}\n\nChallenger: {} (arguing: {})\nOpponent: {} (arguing: {})\nRounds: {} of {}{}",
            self.topic,
            self.challenger_name,
            self.challenger_position,
            self.opponent_name,
            self.opponent_position,
            self.current_round,
            self.total_rounds,
            if self.is_complete { " (complete)" } else { "" },
        );

        let body = self
            .statements
            .iter()
            .chunk_by(|s| s.round)
            .into_iter()
            .map(|(round, statements)| {
                let speeches = statements
                    .map(|s| {
                        format!("{} ({}):\n{}", s.author, s.position, s.content)
                    })
                    .join("\n\n");
                format!("## Round {round}\n\n{speeches}")
            })
            .join("\n\n");

        if body.is_empty() {
            format!("{header}\n\nNo arguments were submitted.")
        } else {
            format!("{header}\n\n{body}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(statements: Vec<ContextStatement>) -> DebateContext {
        DebateContext {
            topic: "Cats are better than dogs".to_string(),
            challenger_position: "FOR".to_string(),
            opponent_position: "AGAINST".to_string(),
            challenger_name: "alice".to_string(),
            opponent_name: "bob".to_string(),
            statements,
            current_round: 3,
            total_rounds: 3,
            is_complete: true,
        }
    }

    fn statement(round: i64, author: &str, content: &str) -> ContextStatement {
        ContextStatement {
            round,
            author: author.to_string(),
            position: if author == "alice" { "FOR" } else { "AGAINST" }
                .to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn rounds_played_uses_transcript() {
        let ctx = context(vec![
            statement(1, "alice", "a"),
            statement(1, "bob", "b"),
            statement(2, "alice", "c"),
        ]);
        assert_eq!(ctx.rounds_played(), 2);
        assert_eq!(context(vec![]).rounds_played(), 3);
    }

    #[test]
    fn transcript_groups_rounds() {
        let ctx = context(vec![
            statement(1, "alice", "Cats purr."),
            statement(1, "bob", "Dogs fetch."),
            statement(2, "alice", "Cats nap."),
        ]);
        let text = ctx.transcript();
        assert!(text.starts_with("Topic: Cats are better than dogs"));
        assert!(text.contains("## Round 1\n\nalice (FOR):\nCats purr.\n\nbob (AGAINST):\nDogs fetch."));
        assert!(text.contains("## Round 2\n\nalice (FOR):\nCats nap."));
    }

    #[test]
    fn empty_transcript_is_noted() {
        assert!(
            context(vec![])
                .transcript()
                .ends_with("No arguments were submitted.")
        );
    }
}
