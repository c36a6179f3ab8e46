use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub mod appeals;
pub mod config;
pub mod debates;
pub mod engine;
pub mod error;
pub mod judges;
pub mod msg;
pub mod provider;
pub mod rating;
pub mod resolve;
pub mod schema;
pub mod state;
pub mod tasks;
pub mod tournament;
pub mod users;
pub mod verdicts;

#[cfg(test)]
mod test;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
