use std::{path::Path, sync::Arc};

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};
use url::Url;

use crate::{
    engine::Engine,
    error::EngineError,
    provider::{ProviderError, openai::ChatCompletionsProvider},
    state::make_pool,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    /// How many judges hear each debate (and each appeal).
    pub judges_per_panel: usize,
    /// Left out, the engine runs without a provider and refuses to resolve
    /// debates.
    pub provider: Option<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: ":memory:".to_string(),
            judges_per_panel: 3,
            provider: None,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct ProviderConfig {
    pub endpoint: Url,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1024
}

impl Config {
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads the configuration file named by `TALLY_CONFIG` (if any), then
    /// applies `DATABASE_URL` and `TALLY_PROVIDER_API_KEY` from the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("TALLY_CONFIG").map(Into::into));

        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(&path).map_err(
                    |source| ConfigError::Read {
                        path: path.display().to_string(),
                        source,
                    },
                )?;
                Self::from_toml(&contents)?
            }
            None => Self::default(),
        };

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(key) = std::env::var("TALLY_PROVIDER_API_KEY")
            && let Some(provider) = config.provider.as_mut()
        {
            provider.api_key = Some(key);
        }

        Ok(config)
    }

    /// Connects to the database and assembles an engine. Notifications are
    /// published on `notifier`.
    pub fn into_engine(
        self,
        notifier: broadcast::Sender<crate::msg::Msg>,
    ) -> Result<Engine, ConfigError> {
        info!(location = %self.database_url, "opening database");
        let pool = make_pool(&self.database_url)?;

        let mut engine = Engine::new(pool, notifier)
            .judges_per_panel(self.judges_per_panel);

        match &self.provider {
            Some(provider) => {
                engine = engine.with_provider(Arc::new(
                    ChatCompletionsProvider::new(provider)?,
                ));
            }
            None => {
                warn!("no provider configured; debates cannot be resolved")
            }
        }

        Ok(engine)
    }
}
