//! Import orchestration.

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::Database;
use crate::models::ImportCounts;
use crate::sources::{
    clipsource::ClipsourceSource, eurosport::EurosportSource,
    global_listings::GlobalListingsSource, pawa_discovery::PawaDiscoverySource,
    venetsia::VenetsiaSource, viacom::ViacomSource, Source,
};

pub mod episode;
pub mod ftp;
pub mod persist;
pub mod registry;

/// Runs the six source connectors in a fixed sequence and aggregates their
/// counters. Each connector is independent: a failing one is logged and the
/// rest still run.
pub struct ImportRunner {
    config: Config,
    db: Database,
}

impl ImportRunner {
    pub fn new(config: Config, db: Database) -> Self {
        Self { config, db }
    }

    pub async fn run(&self) -> Result<ImportCounts> {
        info!("Running EPG importers...");

        let mut totals = ImportCounts::default();

        for source in self.sources() {
            info!("Importing data from {}...", source.name());
            match source.import(&self.db).await {
                Ok(counts) => {
                    info!(
                        "OK: {} new channels, {} programs imported",
                        counts.new_channels, counts.new_programs
                    );
                    totals.merge(counts);
                }
                Err(e) => {
                    warn!("Import from {} failed: {:#}", source.name(), e);
                }
            }
        }

        info!(
            "All done! New channels: {}, new programs: {}",
            totals.new_channels, totals.new_programs
        );

        Ok(totals)
    }

    fn sources(&self) -> Vec<Box<dyn Source + '_>> {
        vec![
            Box::new(PawaDiscoverySource::new(&self.config.pawa_discovery)),
            Box::new(ViacomSource::new(&self.config.viacom)),
            Box::new(ClipsourceSource::new(&self.config.clipsource)),
            Box::new(GlobalListingsSource::new(
                &self.config.global_listings,
                &self.config.import,
            )),
            Box::new(VenetsiaSource::new(
                &self.config.venetsia,
                &self.config.import,
            )),
            Box::new(EurosportSource::new(
                &self.config.eurosport,
                &self.config.import,
            )),
        ]
    }
}
