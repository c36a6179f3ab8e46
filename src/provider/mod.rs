//! Generative judges.
//!
//! A provider turns a judge persona and a transcript into scores. Providers
//! are unreliable: calls fail, time out, or return a stated decision that
//! contradicts the scores. Callers are expected to cope with all three.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::debates::DebateContext;

pub mod openai;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not parse provider response: {0}")]
    Parse(String),

    #[error("provider returned an empty response")]
    Empty,
}

/// What a judge returned. `decision` is advisory; only the scores are used
/// to decide the debate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeResponse {
    #[serde(default)]
    pub decision: String,
    pub challenger_score: f64,
    pub opponent_score: f64,
    #[serde(default)]
    pub reasoning: String,
}

#[async_trait]
pub trait JudgeProvider: Send + Sync {
    /// Asks the judge described by `system_prompt` to score a debate.
    async fn judge(
        &self,
        system_prompt: &str,
        context: &DebateContext,
    ) -> Result<JudgeResponse, ProviderError>;

    /// Free-form text generation, used for appeal explanations.
    async fn complete(
        &self,
        system_prompt: &str,
        prompt: &str,
    ) -> Result<String, ProviderError>;
}

/// Instructions appended to every judge persona describing the expected
/// response format.
pub const RESPONSE_FORMAT: &str = r#"Score each side from 0 to 100 on the quality of their arguments, evidence and rebuttals.
Respond with a single JSON object and nothing else:
{"decision": "CHALLENGER_WINS" | "OPPONENT_WINS" | "TIE", "challengerScore": <0-100>, "opponentScore": <0-100>, "reasoning": "<two or three sentences>"}"#;

/// Parses a judge's reply. Models like to wrap JSON in markdown fences or
/// surround it with commentary, so the first JSON object in the text is used.
pub fn parse_judge_response(text: &str) -> Result<JudgeResponse, ProviderError> {
    static FENCED: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap()
    });
    static BARE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

    let text = text.trim();
    if text.is_empty() {
        return Err(ProviderError::Empty);
    }

    let json = FENCED
        .captures(text)
        .and_then(|c| c.get(1))
        .or_else(|| BARE.find(text))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            ProviderError::Parse(format!("no JSON object in {text:?}"))
        })?;

    serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let response = parse_judge_response(
            r#"{"decision":"TIE","challengerScore":61,"opponentScore":59.5,"reasoning":"Close."}"#,
        )
        .unwrap();
        assert_eq!(response.challenger_score, 61.0);
        assert_eq!(response.opponent_score, 59.5);
        assert_eq!(response.decision, "TIE");
    }

    #[test]
    fn parses_fenced_json_with_commentary() {
        let response = parse_judge_response(
            "Here is my verdict:\n```json\n{\"challengerScore\": 70, \"opponentScore\": 30, \"reasoning\": \"Clear win.\"}\n```\nThanks!",
        )
        .unwrap();
        assert_eq!(response.challenger_score, 70.0);
        assert_eq!(response.decision, "");
    }

    #[test]
    fn rejects_missing_scores() {
        assert!(matches!(
            parse_judge_response(r#"{"decision":"CHALLENGER_WINS"}"#),
            Err(ProviderError::Parse(_))
        ));
        assert!(matches!(
            parse_judge_response("I cannot judge this."),
            Err(ProviderError::Parse(_))
        ));
        assert!(matches!(
            parse_judge_response("   "),
            Err(ProviderError::Empty)
        ));
    }
}
