//! Fixtures for driving the engine end to end against an in-memory database
//! and a provider whose answers are scripted per judge.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use diesel::{
    SqliteConnection,
    prelude::*,
    r2d2::{ConnectionManager, Pool},
};
use diesel_migrations::MigrationHarness;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    MIGRATIONS,
    debates::{Debate, DebateContext, DebateStatus},
    engine::Engine,
    judges::Judge,
    provider::{JudgeProvider, JudgeResponse, ProviderError},
    schema::{debate_statements, debates, judges, users},
    state::DbPool,
    tournament::{HookError, TournamentHook},
    users::User,
    verdicts::{Pass, Verdict},
};


pub fn test_pool() -> DbPool {
    let pool: DbPool = Pool::builder()
        .max_size(1)
        .build(ConnectionManager::<SqliteConnection>::new(":memory:"))
        .unwrap();
    pool.get().unwrap().run_pending_migrations(MIGRATIONS).unwrap();
    pool
}

#[derive(Clone, Copy, Debug)]
pub enum Script {
    Scores {
        challenger: f64,
        opponent: f64,
        stated: &'static str,
    },
    Fail,
}

impl Script {
    pub fn scores(challenger: f64, opponent: f64) -> Script {
        Script::Scores {
            challenger,
            opponent,
            stated: "TIE",
        }
    }
}

/// Answers according to a script keyed on the judge's system prompt, falling
/// back to `default` for judges without one.
pub struct ScriptedProvider {
    default: Mutex<Script>,
    overrides: Mutex<HashMap<String, Script>>,
    explanation: Mutex<Option<String>>,
    pub judge_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(default: Script) -> Self {
        Self {
            default: Mutex::new(default),
            overrides: Mutex::new(HashMap::new()),
            explanation: Mutex::new(Some("The panel has spoken.".to_string())),
            judge_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_default(&self, script: Script) {
        *self.default.lock().unwrap() = script;
        self.overrides.lock().unwrap().clear();
    }

    pub fn set_for(&self, system_prompt: &str, script: Script) {
        self.overrides
            .lock()
            .unwrap()
            .insert(system_prompt.to_string(), script);
    }

    /// `None` makes explanation requests fail.
    pub fn set_explanation(&self, text: Option<&str>) {
        *self.explanation.lock().unwrap() = text.map(str::to_string);
    }

    pub fn calls(&self) -> usize {
        self.judge_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JudgeProvider for ScriptedProvider {
    async fn judge(
        &self,
        system_prompt: &str,
        _context: &DebateContext,
    ) -> Result<JudgeResponse, ProviderError> {
        self.judge_calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .overrides
            .lock()
            .unwrap()
            .get(system_prompt)
            .copied()
            .unwrap_or(*self.default.lock().unwrap());

        match script {
            Script::Scores {
                challenger,
                opponent,
                stated,
            } => Ok(JudgeResponse {
                decision: stated.to_string(),
                challenger_score: challenger,
                opponent_score: opponent,
                reasoning: format!("{challenger} to {opponent}"),
            }),
            Script::Fail => Err(ProviderError::Request(
                "connection reset by peer".to_string(),
            )),
        }
    }

    async fn complete(
        &self,
        _system_prompt: &str,
        _prompt: &str,
    ) -> Result<String, ProviderError> {
        self.explanation.lock().unwrap().clone().ok_or(ProviderError::Empty)
    }
}

#[derive(Default)]
pub struct RecordingHook {
    pub fail: bool,
    pub calls: Mutex<Vec<(String, String, Option<String>)>>,
}

#[async_trait]
impl TournamentHook for RecordingHook {
    async fn debate_resolved(
        &self,
        match_id: &str,
        debate_id: &str,
        winner_id: Option<&str>,
    ) -> Result<(), HookError> {
        self.calls.lock().unwrap().push((
            match_id.to_string(),
            debate_id.to_string(),
            winner_id.map(str::to_string),
        ));
        if self.fail {
            return Err(HookError("bracket service unavailable".to_string()));
        }
        Ok(())
    }
}

pub fn seed_user(conn: &mut SqliteConnection, username: &str) -> String {
    let id = Uuid::now_v7().to_string();
    diesel::insert_into(users::table)
        .values((
            users::id.eq(&id),
            users::username.eq(username),
            users::created_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
        .unwrap();
    id
}

/// Judges with system prompts `judge-0`, `judge-1`, ... in roster order.
pub fn seed_judges(conn: &mut SqliteConnection, count: usize) -> Vec<String> {
    let base = Utc::now().naive_utc();
    (0..count)
        .map(|i| {
            let id = Uuid::now_v7().to_string();
            diesel::insert_into(judges::table)
                .values((
                    judges::id.eq(&id),
                    judges::name.eq(format!("Judge {i}")),
                    judges::system_prompt.eq(format!("judge-{i}")),
                    judges::created_at.eq(base + Duration::seconds(i as i64)),
                ))
                .execute(conn)
                .unwrap();
            id
        })
        .collect()
}

pub struct DebateSeed<'a> {
    pub challenger: &'a str,
    pub opponent: Option<&'a str>,
    pub status: DebateStatus,
    pub rounds: i64,
    pub tournament_match_id: Option<&'a str>,
}

pub fn seed_debate(conn: &mut SqliteConnection, seed: DebateSeed) -> String {
    let id = Uuid::now_v7().to_string();
    let base = Utc::now().naive_utc();
    diesel::insert_into(debates::table)
        .values((
            debates::id.eq(&id),
            debates::topic.eq("Cities should ban private cars"),
            debates::challenger_id.eq(seed.challenger),
            debates::opponent_id.eq(seed.opponent),
            debates::challenger_position.eq("For"),
            debates::opponent_position.eq("Against"),
            debates::current_round.eq(seed.rounds),
            debates::total_rounds.eq(seed.rounds),
            debates::status.eq(seed.status.as_str()),
            debates::tournament_match_id.eq(seed.tournament_match_id),
            debates::created_at.eq(base),
        ))
        .execute(conn)
        .unwrap();

    let authors = std::iter::once(seed.challenger).chain(seed.opponent);
    let authors = authors.collect::<Vec<_>>();
    let mut offset = 0;
    for round in 1..=seed.rounds {
        for author in &authors {
            offset += 1;
            diesel::insert_into(debate_statements::table)
                .values((
                    debate_statements::id.eq(Uuid::now_v7().to_string()),
                    debate_statements::debate_id.eq(&id),
                    debate_statements::author_id.eq(*author),
                    debate_statements::round.eq(round),
                    debate_statements::content
                        .eq(format!("argument {round} from {author}")),
                    debate_statements::created_at
                        .eq(base + Duration::seconds(offset)),
                ))
                .execute(conn)
                .unwrap();
        }
    }

    id
}

/// An engine over a fresh database with two 1200-rated users, `alice` and
/// `bob`, and a roster of judges.
pub struct Harness {
    pub engine: Engine,
    pub provider: Arc<ScriptedProvider>,
    pub hook: Arc<RecordingHook>,
    pub judges: Vec<String>,
    pub alice: String,
    pub bob: String,
}

impl Harness {
    pub fn new(judges: usize, script: Script) -> Self {
        Self::with_hook(judges, script, RecordingHook::default())
    }

    pub fn with_hook(
        judges: usize,
        script: Script,
        hook: RecordingHook,
    ) -> Self {
        let pool = test_pool();
        let (alice, bob, judges) = {
            let mut conn = pool.get().unwrap();
            (
                seed_user(&mut conn, "alice"),
                seed_user(&mut conn, "bob"),
                seed_judges(&mut conn, judges),
            )
        };

        let provider = Arc::new(ScriptedProvider::new(script));
        let hook = Arc::new(hook);
        let (notifier, _) = broadcast::channel(64);
        let engine = Engine::new(pool, notifier)
            .with_provider(provider.clone())
            .with_tournament_hook(hook.clone())
            .with_rng(ChaCha20Rng::seed_from_u64(0x7a11));

        Self {
            engine,
            provider,
            hook,
            judges,
            alice,
            bob,
        }
    }

    fn conn(
        &self,
    ) -> diesel::r2d2::PooledConnection<ConnectionManager<SqliteConnection>>
    {
        self.engine.pool().get().unwrap()
    }

    /// A three-round debate between alice and bob.
    pub fn debate(&self, status: DebateStatus) -> String {
        self.debate_with(|seed| seed.status = status)
    }

    pub fn debate_with(&self, f: impl FnOnce(&mut DebateSeed)) -> String {
        let mut seed = DebateSeed {
            challenger: &self.alice,
            opponent: Some(&self.bob),
            status: DebateStatus::Completed,
            rounds: 3,
            tournament_match_id: None,
        };
        f(&mut seed);
        seed_debate(&mut self.conn(), seed)
    }

    /// Runs raw SQL against the engine's database. Used to install triggers
    /// that make particular writes fail.
    pub fn exec(&self, sql: &str) {
        diesel::sql_query(sql).execute(&mut *self.conn()).unwrap();
    }

    /// Makes every update to `users` fail until [`Harness::thaw_users`].
    pub fn freeze_users(&self) {
        self.exec(
            "CREATE TRIGGER freeze_users BEFORE UPDATE ON users \
             BEGIN SELECT RAISE(ABORT, 'users are frozen'); END",
        );
    }

    pub fn thaw_users(&self) {
        self.exec("DROP TRIGGER freeze_users");
    }

    pub fn user(&self, id: &str) -> User {
        User::fetch(id, &mut *self.conn()).unwrap()
    }

    pub fn fetch_debate(&self, id: &str) -> Debate {
        Debate::fetch(id, &mut *self.conn()).unwrap()
    }

    pub fn verdicts(&self, debate_id: &str, pass: Pass) -> Vec<Verdict> {
        Verdict::of_pass(debate_id, pass, &mut *self.conn()).unwrap()
    }

    pub fn roster(&self) -> Vec<Judge> {
        Judge::roster(&mut *self.conn()).unwrap()
    }
}
