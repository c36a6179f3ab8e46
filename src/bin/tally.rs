use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tally::{
    config::Config,
    debates::Debate,
    engine::Engine,
    error::EngineError,
    state::with_conn,
    verdicts::{Pass, Verdict},
};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(about = "Decide debates with a panel of generative judges")]
struct Cli {
    /// Configuration file. Defaults to `$TALLY_CONFIG`.
    #[clap(long, short)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bring the database schema up to date.
    Migrate,
    /// Judge a completed debate.
    Resolve { debate_id: String },
    /// Appeal a resolved debate.
    Appeal {
        debate_id: String,
        #[clap(long, default_value = "")]
        reason: String,
    },
    /// Have a fresh panel rule on an appealed debate.
    Reconcile { debate_id: String },
    /// Print a debate and its verdicts.
    Show { debate_id: String },
}

#[derive(Serialize)]
struct Report {
    debate: Debate,
    verdicts: Vec<Verdict>,
    appeal_verdicts: Vec<Verdict>,
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "could not serialise output"),
    }
}

async fn run(engine: &Engine, command: Command) -> Result<(), EngineError> {
    match command {
        Command::Migrate => engine.migrate().await,
        Command::Resolve { debate_id } => {
            print_json(&engine.resolve(&debate_id).await?);
            Ok(())
        }
        Command::Appeal { debate_id, reason } => {
            engine.file_appeal(&debate_id, &reason).await
        }
        Command::Reconcile { debate_id } => {
            print_json(&engine.reconcile(&debate_id).await?);
            Ok(())
        }
        Command::Show { debate_id } => {
            let report = with_conn(engine.pool(), move |conn| {
                let debate = Debate::fetch(&debate_id, conn)?;
                let verdicts =
                    Verdict::of_pass(&debate.id, Pass::Original, conn)?;
                let appeal_verdicts =
                    Verdict::of_pass(&debate.id, Pass::Appeal, conn)?;
                Ok(Report {
                    debate,
                    verdicts,
                    appeal_verdicts,
                })
            })
            .await?;
            print_json(&report);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "could not load configuration");
            return ExitCode::FAILURE;
        }
    };

    let (notifier, _) = broadcast::channel(64);
    let engine = match config.into_engine(notifier) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "could not start engine");
            return ExitCode::FAILURE;
        }
    };

    let result = run(&engine, cli.command).await;
    engine.settle().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}
