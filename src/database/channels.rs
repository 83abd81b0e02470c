//! Channel repository: origin-id keyed lookup and create-if-absent inserts.

use anyhow::Result;
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;

use crate::models::Channel;

pub struct ChannelRepository<'a> {
    pool: &'a Pool<Sqlite>,
}

impl<'a> ChannelRepository<'a> {
    pub fn new(pool: &'a Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// The full channel set keyed by origin id. Loaded once per connector
    /// invocation.
    pub async fn all_by_origin_id(&self) -> Result<HashMap<String, Channel>> {
        let rows = sqlx::query(
            "SELECT id, origin_id, name, slug, is_visible, position FROM channels",
        )
        .fetch_all(self.pool)
        .await?;

        let mut channels = HashMap::with_capacity(rows.len());
        for row in rows {
            let channel = Self::from_row(&row);
            channels.insert(channel.origin_id.clone(), channel);
        }

        Ok(channels)
    }

    /// Insert a new channel and return it with its assigned id.
    pub async fn add(&self, channel: Channel) -> Result<Channel> {
        let result = sqlx::query(
            "INSERT INTO channels (origin_id, name, slug, is_visible, position)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&channel.origin_id)
        .bind(&channel.name)
        .bind(&channel.slug)
        .bind(channel.is_visible)
        .bind(channel.position)
        .execute(self.pool)
        .await?;

        Ok(Channel {
            id: result.last_insert_rowid(),
            ..channel
        })
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Channel {
        Channel {
            id: row.get("id"),
            origin_id: row.get("origin_id"),
            name: row.get("name"),
            slug: row.get("slug"),
            is_visible: row.get("is_visible"),
            position: row.get("position"),
        }
    }
}
