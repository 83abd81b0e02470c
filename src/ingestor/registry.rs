//! Channel registry: origin id -> internal channel id, creating channels on
//! first sight.

use anyhow::Result;
use std::collections::HashMap;
use tracing::info;

use crate::database::Database;
use crate::models::Channel;

/// One registry is loaded per connector invocation; created channels are
/// cached so repeated `ensure` calls within a run hit the map.
pub struct ChannelRegistry {
    channels: HashMap<String, Channel>,
}

impl ChannelRegistry {
    pub async fn load(db: &Database) -> Result<Self> {
        Ok(Self {
            channels: db.channels().all_by_origin_id().await?,
        })
    }

    /// Return the internal id for an origin id, creating a hidden channel
    /// with the given display name when unknown. The second element is true
    /// when a channel was created.
    pub async fn ensure(
        &mut self,
        db: &Database,
        origin_id: &str,
        name: &str,
    ) -> Result<(i64, bool)> {
        if let Some(channel) = self.channels.get(origin_id) {
            return Ok((channel.id, false));
        }

        info!("Adding new channel: {} ({})", name, origin_id);
        let channel = db
            .channels()
            .add(Channel::new_hidden(origin_id, name))
            .await?;
        let id = channel.id;
        self.channels.insert(origin_id.to_string(), channel);

        Ok((id, true))
    }

    pub fn contains(&self, origin_id: &str) -> bool {
        self.channels.contains_key(origin_id)
    }
}
