use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tokio::sync::broadcast;

use crate::{
    error::EngineError,
    judges::{Judge, sample::sample},
    msg::{Msg, MsgContents},
    provider::JudgeProvider,
    state::{DbPool, run_migrations},
    tasks::{Background, TaskFailure},
    tournament::TournamentHook,
    verdicts::aggregate::VerdictAggregator,
};

pub const DEFAULT_PANEL_SIZE: usize = 3;

/// Resolves debates and appeals.
///
/// The engine does not serialise work on a single debate. Callers that can
/// trigger resolution of the same debate more than once concurrently must
/// prevent that themselves; the status checks only catch the common case.
pub struct Engine {
    pub(crate) pool: DbPool,
    provider: Option<Arc<dyn JudgeProvider>>,
    notifier: broadcast::Sender<Msg>,
    pub(crate) tournament: Option<Arc<dyn TournamentHook>>,
    pub(crate) background: Background,
    panel_size: usize,
    rng: Mutex<ChaCha20Rng>,
}

impl Engine {
    pub fn new(pool: DbPool, notifier: broadcast::Sender<Msg>) -> Self {
        Self {
            pool,
            provider: None,
            notifier,
            tournament: None,
            background: Background::new(),
            panel_size: DEFAULT_PANEL_SIZE,
            rng: Mutex::new(ChaCha20Rng::from_os_rng()),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn JudgeProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_tournament_hook(
        mut self,
        hook: Arc<dyn TournamentHook>,
    ) -> Self {
        self.tournament = Some(hook);
        self
    }

    pub fn with_rng(mut self, rng: ChaCha20Rng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn judges_per_panel(mut self, count: usize) -> Self {
        self.panel_size = count.max(1);
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Brings the database schema up to date.
    pub async fn migrate(&self) -> Result<(), EngineError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || run_migrations(&pool)).await?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Msg> {
        self.notifier.subscribe()
    }

    pub fn task_failures(&self) -> broadcast::Receiver<TaskFailure> {
        self.background.failures()
    }

    /// Waits for outstanding background work, such as appeal explanations,
    /// to finish.
    pub async fn settle(&self) {
        self.background.settle().await
    }

    pub(crate) fn provider(
        &self,
    ) -> Result<Arc<dyn JudgeProvider>, EngineError> {
        self.provider
            .clone()
            .ok_or(EngineError::ProviderNotConfigured)
    }

    pub(crate) fn aggregator(
        &self,
        provider: Arc<dyn JudgeProvider>,
    ) -> VerdictAggregator {
        VerdictAggregator::new(provider, self.pool.clone())
    }

    pub(crate) fn sample_panel(
        &self,
        roster: &[Judge],
        exclude: &HashSet<String>,
    ) -> Result<Vec<Judge>, EngineError> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        Ok(sample(roster, self.panel_size, exclude, &mut *rng)?)
    }

    pub(crate) fn notify(
        &self,
        debate_id: &str,
        user_id: &str,
        inner: MsgContents,
    ) {
        // nobody listening is not an error
        let _ = self.notifier.send(Msg {
            debate_id: debate_id.to_string(),
            user_id: user_id.to_string(),
            inner,
        });
    }
}
