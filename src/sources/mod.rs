//! Source connectors, one per external provider.
//!
//! Every provider implements the same capability: fetch payload(s) over its
//! transport, parse them into a coverage window plus normalized programs,
//! and hand the result to the shared persist step. The orchestrator only
//! sees the `Source` trait.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::database::Database;
use crate::errors::SourceError;
use crate::ingestor::persist::Reconciler;
use crate::ingestor::registry::ChannelRegistry;
use crate::models::{CoverageWindow, ImportCounts, ImportedProgram};

pub mod clipsource;
pub mod eurosport;
pub mod global_listings;
pub mod pawa_discovery;
pub mod venetsia;
pub mod viacom;

#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one full import for this provider. An unconfigured provider is a
    /// no-op success.
    async fn import(&self, db: &Database) -> Result<ImportCounts>;
}

/// One successfully parsed payload, ready for reconciliation.
pub(crate) struct ParsedFeed {
    pub origin_id: String,
    pub channel_name: String,
    pub window: CoverageWindow,
    pub programs: Vec<ImportedProgram>,
}

/// Shared persist step: ensure the channel exists, then overwrite its
/// coverage window with the parsed set.
pub(crate) async fn persist_feed(
    db: &Database,
    registry: &mut ChannelRegistry,
    counts: &mut ImportCounts,
    feed: ParsedFeed,
) -> Result<()> {
    let (channel_id, created) = registry
        .ensure(db, &feed.origin_id, &feed.channel_name)
        .await?;
    if created {
        counts.new_channels += 1;
    }

    let inserted = Reconciler::new(db)
        .reconcile(channel_id, &feed.window, &feed.programs)
        .await?;
    counts.new_programs += inserted;

    Ok(())
}

/// HTTP client shared by the GET-based providers.
pub(crate) fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent("epg-importer/0.1")
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Simple GET returning status and body text.
pub(crate) async fn http_get_text(
    client: &Client,
    url: &str,
) -> Result<(u16, String), SourceError> {
    let response = client.get(url).send().await.map_err(|e| SourceError::Http {
        url: url.to_string(),
        source: e,
    })?;

    let status = response.status().as_u16();
    let body = response.text().await.map_err(|e| SourceError::Http {
        url: url.to_string(),
        source: e,
    })?;

    Ok((status, body))
}
