//! SQLite-backed persistence for channels and programs.

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{migrate::MigrateDatabase, Pool, Sqlite, SqlitePool};

use crate::config::DatabaseConfig;

pub mod channels;
pub mod programs;

pub use channels::ChannelRepository;
pub use programs::ProgramRepository;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS channels (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        origin_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        slug TEXT NOT NULL,
        is_visible INTEGER NOT NULL DEFAULT 0,
        position INTEGER NOT NULL DEFAULT 255
    )",
    "CREATE TABLE IF NOT EXISTS programs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        channel_id INTEGER NOT NULL REFERENCES channels(id),
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        season INTEGER NOT NULL DEFAULT 0,
        episode INTEGER NOT NULL DEFAULT 0,
        episodes INTEGER NOT NULL DEFAULT 0
    )",
    // Duplicate tolerance: INSERT OR IGNORE against this index silently
    // drops rows identical in every content field.
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_programs_identity
        ON programs (channel_id, title, description, start_time, end_time,
                     season, episode, episodes)",
    "CREATE INDEX IF NOT EXISTS idx_programs_channel_start
        ON programs (channel_id, start_time)",
];

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        // An in-memory database exists per connection; it must be pinned to
        // a single one that never gets recycled.
        if config.url.contains(":memory:") {
            let pool = SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(&config.url)
                .await?;
            return Ok(Self { pool });
        }

        if !Sqlite::database_exists(&config.url).await.unwrap_or(false) {
            Sqlite::create_database(&config.url).await?;
        }

        let pool = SqlitePool::connect(&config.url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn channels(&self) -> ChannelRepository<'_> {
        ChannelRepository::new(&self.pool)
    }

    pub fn programs(&self) -> ProgramRepository<'_> {
        ProgramRepository::new(&self.pool)
    }
}
