//! Core data model shared by the parsers, the registry and the persistence
//! layer.

use chrono::{DateTime, Utc};

use crate::utils::text::slugify;

/// A TV channel row. Created once per origin id by the channel registry and
/// never deleted by the pipeline.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: i64,
    /// Provider-qualified external id, e.g. `"venetsia.12"`
    pub origin_id: String,
    pub name: String,
    pub slug: String,
    pub is_visible: bool,
    pub position: i64,
}

impl Channel {
    /// Position assigned to channels the pipeline creates; an operator
    /// promotes them later.
    pub const LOWEST_PRIORITY: i64 = 255;

    /// A freshly imported channel: hidden, lowest priority, slug derived
    /// from the display name.
    pub fn new_hidden(origin_id: &str, name: &str) -> Self {
        Self {
            id: 0,
            origin_id: origin_id.to_string(),
            name: name.to_string(),
            slug: slugify(name),
            is_visible: false,
            position: Self::LOWEST_PRIORITY,
        }
    }
}

/// A normalized program entry produced by a format parser. Transient: it is
/// consumed by the reconciler and never stored as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedProgram {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// 0 = unknown
    pub season: u32,
    /// 0 = unknown
    pub episode: u32,
    /// 0 = unknown
    pub episode_count: u32,
}

impl ImportedProgram {
    pub fn new(
        title: String,
        description: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            title,
            description,
            start,
            end,
            season: 0,
            episode: 0,
            episode_count: 0,
        }
    }
}

/// A persisted program row. Identity is not stable across reimports: rows
/// are deleted and recreated whenever their channel's window is re-imported.
#[derive(Debug, Clone)]
pub struct Program {
    pub id: i64,
    pub channel_id: i64,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub season: i64,
    pub episode: i64,
    pub episodes: i64,
}

/// The `[start, end]` time range a single parsed payload claims to fully
/// describe for one channel. Reconciliation unit: stored programs whose
/// start time falls inside the window are replaced wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CoverageWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

/// New-channel / new-program counters, per source and aggregated by the
/// orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportCounts {
    pub new_channels: u64,
    pub new_programs: u64,
}

impl ImportCounts {
    pub fn merge(&mut self, other: ImportCounts) {
        self.new_channels += other.new_channels;
        self.new_programs += other.new_programs;
    }
}
