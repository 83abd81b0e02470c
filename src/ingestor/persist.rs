//! Overwrite-by-window reconciliation.

use anyhow::Result;
use tracing::{debug, warn};

use crate::database::Database;
use crate::models::{CoverageWindow, ImportedProgram};

/// Deletes the stored programs inside a channel's coverage window, then
/// bulk-inserts the freshly parsed set. Not a diff: re-importing the same
/// window is idempotent because the delete fully precedes the inserts and
/// duplicate rows are ignored.
pub struct Reconciler<'a> {
    db: &'a Database,
}

impl<'a> Reconciler<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Returns the number of programs actually inserted (duplicates the
    /// store already had are not counted).
    pub async fn reconcile(
        &self,
        channel_id: i64,
        window: &CoverageWindow,
        programs: &[ImportedProgram],
    ) -> Result<u64> {
        // Uniform post-parse sanity check: provider-specific clamping can
        // leave inverted or zero-length entries; they are dropped here for
        // all providers.
        let mut sane = Vec::with_capacity(programs.len());
        for program in programs {
            if program.start >= program.end {
                warn!(
                    "Dropping program '{}' with non-positive duration ({} >= {})",
                    program.title, program.start, program.end
                );
                continue;
            }
            sane.push(program.clone());
        }

        let deleted = self
            .db
            .programs()
            .delete_by_channel_and_window(channel_id, window)
            .await?;
        let inserted = self.db.programs().add_from_import(channel_id, &sane).await?;

        debug!(
            "Reconciled channel {}: {} deleted, {} inserted in [{}, {}]",
            channel_id, deleted, inserted, window.start, window.end
        );

        Ok(inserted)
    }
}
