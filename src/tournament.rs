use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("tournament update failed: {0}")]
pub struct HookError(pub String);

/// Receives results of debates that belong to a tournament match.
///
/// Calls are made in the background after the result is committed; a
/// failing hook never affects the resolution.
#[async_trait]
pub trait TournamentHook: Send + Sync {
    async fn debate_resolved(
        &self,
        match_id: &str,
        debate_id: &str,
        winner_id: Option<&str>,
    ) -> Result<(), HookError>;
}
