//! PawaDiscovery: the Global Listings schedule schema served over HTTP,
//! one document per configured file name.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::PawaDiscoveryConfig;
use crate::database::Database;
use crate::ingestor::registry::ChannelRegistry;
use crate::models::ImportCounts;
use crate::sources::global_listings::ScheduleParser;
use crate::sources::{http_client, http_get_text, persist_feed, Source};

pub struct PawaDiscoverySource<'a> {
    config: &'a PawaDiscoveryConfig,
}

impl<'a> PawaDiscoverySource<'a> {
    pub fn new(config: &'a PawaDiscoveryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Source for PawaDiscoverySource<'_> {
    fn name(&self) -> &'static str {
        "PawaDiscovery"
    }

    async fn import(&self, db: &Database) -> Result<ImportCounts> {
        let mut counts = ImportCounts::default();
        let mut registry = ChannelRegistry::load(db).await?;

        if self.config.api_url.is_empty() {
            info!("Source disabled...");
            return Ok(counts);
        }

        let client = http_client();
        let base = self.config.api_url.trim_end_matches('/');

        for file in &self.config.files {
            let url = format!("{base}/{file}");
            info!("Importing file '{}'...", file);

            let (status, body) = match http_get_text(&client, &url).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Failed to fetch '{}': {}", file, e);
                    continue;
                }
            };
            if status != 200 {
                warn!("Failed to fetch '{}': HTTP status {}", file, status);
                continue;
            }

            let parser = match ScheduleParser::parse(&body, "pawadiscovery") {
                Ok(parser) => parser,
                Err(e) => {
                    warn!("Failed to parse file '{}': {}", file, e);
                    continue;
                }
            };

            persist_feed(db, &mut registry, &mut counts, parser.into_feed()).await?;
        }

        Ok(counts)
    }
}
