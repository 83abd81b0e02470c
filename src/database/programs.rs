//! Program repository: window-scoped deletes and chunked bulk inserts.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

use crate::models::{CoverageWindow, ImportedProgram, Program};

/// SQLite 3.32.0+ allows 32,766 bind variables per statement; program rows
/// bind 8 values each.
const BIND_LIMIT: usize = 32_766;
const PROGRAM_FIELDS: usize = 8;
pub(crate) const INSERT_CHUNK_SIZE: usize = BIND_LIMIT / PROGRAM_FIELDS;

pub struct ProgramRepository<'a> {
    pool: &'a Pool<Sqlite>,
}

impl<'a> ProgramRepository<'a> {
    pub fn new(pool: &'a Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Delete every stored program for the channel whose start time falls
    /// inside the closed window. Always runs before the matching inserts.
    pub async fn delete_by_channel_and_window(
        &self,
        channel_id: i64,
        window: &CoverageWindow,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM programs
             WHERE channel_id = ? AND start_time >= ? AND start_time <= ?",
        )
        .bind(channel_id)
        .bind(window.start.to_rfc3339())
        .bind(window.end.to_rfc3339())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Bulk-insert parsed programs for a channel. Chunked to stay under the
    /// bind variable ceiling; `INSERT OR IGNORE` drops rows identical to
    /// stored ones without erroring. Returns the number actually inserted.
    pub async fn add_from_import(
        &self,
        channel_id: i64,
        programs: &[ImportedProgram],
    ) -> Result<u64> {
        let mut inserted = 0;

        for chunk in programs.chunks(INSERT_CHUNK_SIZE) {
            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT OR IGNORE INTO programs
                 (channel_id, title, description, start_time, end_time, season, episode, episodes) ",
            );

            query_builder.push_values(chunk, |mut b, program| {
                b.push_bind(channel_id)
                    .push_bind(&program.title)
                    .push_bind(&program.description)
                    .push_bind(program.start.to_rfc3339())
                    .push_bind(program.end.to_rfc3339())
                    .push_bind(program.season as i64)
                    .push_bind(program.episode as i64)
                    .push_bind(program.episode_count as i64);
            });

            let result = query_builder.build().execute(self.pool).await?;
            inserted += result.rows_affected();
        }

        Ok(inserted)
    }

    /// Stored programs for one channel, ordered by start time.
    pub async fn by_channel(&self, channel_id: i64) -> Result<Vec<Program>> {
        let rows = sqlx::query(
            "SELECT id, channel_id, title, description, start_time, end_time,
                    season, episode, episodes
             FROM programs
             WHERE channel_id = ?
             ORDER BY start_time ASC",
        )
        .bind(channel_id)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Program> {
        Ok(Program {
            id: row.get("id"),
            channel_id: row.get("channel_id"),
            title: row.get("title"),
            description: row.get("description"),
            start_time: parse_stored_time(&row.get::<String, _>("start_time"))?,
            end_time: parse_stored_time(&row.get::<String, _>("end_time"))?,
            season: row.get("season"),
            episode: row.get("episode"),
            episodes: row.get("episodes"),
        })
    }
}

fn parse_stored_time(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
