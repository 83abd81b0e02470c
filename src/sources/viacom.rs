//! Viacom: one XMLTV-style document per channel per day, fetched over HTTP
//! for a rolling three-month horizon.
//!
//! A 404 means different things depending on how far the loop got: within
//! the first week it is a delivery problem, past it it is simply the end of
//! the published schedule. Other failures are retried a bounded number of
//! times before the channel is abandoned.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::ViacomConfig;
use crate::database::Database;
use crate::errors::ParseError;
use crate::ingestor::registry::ChannelRegistry;
use crate::models::{CoverageWindow, ImportCounts, ImportedProgram};
use crate::sources::{http_client, http_get_text, persist_feed, ParsedFeed, Source};
use crate::utils::time::parse_compact_offset_datetime;

const FETCH_HORIZON_DAYS: i64 = 91;
const SCHEDULE_END_GRACE_DAYS: i64 = 7;
const MAX_ATTEMPTS_PER_DAY: u32 = 3;

#[derive(Debug, Deserialize)]
struct TvDocument {
    channel: Option<ChannelElement>,
    #[serde(rename = "programme", default)]
    programmes: Vec<Programme>,
}

#[derive(Debug, Deserialize)]
struct ChannelElement {
    #[serde(rename = "display-name")]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Programme {
    #[serde(rename = "@air_time_start")]
    start: Option<String>,
    #[serde(rename = "@air_time_end")]
    end: Option<String>,
    title: Option<String>,
    #[serde(rename = "sub-title")]
    sub_title: Option<String>,
    desc: Option<String>,
    desc_short: Option<String>,
    format_desc: Option<String>,
    format_desc_short: Option<String>,
    #[serde(rename = "season-num")]
    season_num: Option<String>,
    #[serde(rename = "episode-num")]
    episode_num: Option<String>,
}

pub struct TvParser {
    channel_name: String,
    window: CoverageWindow,
    programmes: Vec<Programme>,
}

impl TvParser {
    /// `fallback_name` is used when the document carries no display name;
    /// the feed occasionally omits it.
    pub fn parse(xml: &str, fallback_name: &str) -> Result<Self, ParseError> {
        let document: TvDocument = quick_xml::de::from_str(xml)?;

        let channel_name = document
            .channel
            .as_ref()
            .and_then(|c| c.display_name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(fallback_name)
            .to_string();

        let first = document
            .programmes
            .first()
            .and_then(|p| p.start.as_deref())
            .ok_or_else(|| ParseError::structure("could not get schedule start time"))?;
        let last = document
            .programmes
            .last()
            .and_then(|p| p.end.as_deref())
            .ok_or_else(|| ParseError::structure("could not get schedule end time"))?;

        let window = CoverageWindow::new(
            parse_compact_offset_datetime(first).map_err(ParseError::structure)?,
            parse_compact_offset_datetime(last).map_err(ParseError::structure)?,
        );

        Ok(Self {
            channel_name,
            window,
            programmes: document.programmes,
        })
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn window(&self) -> CoverageWindow {
        self.window
    }

    pub fn programs(&self) -> Vec<ImportedProgram> {
        let mut programs = Vec::with_capacity(self.programmes.len());

        for programme in &self.programmes {
            match parse_programme(programme) {
                Ok(program) => programs.push(program),
                Err(e) => warn!("Invalid program: {}", e),
            }
        }

        programs
    }
}

fn parse_programme(programme: &Programme) -> Result<ImportedProgram, ParseError> {
    let start = programme
        .start
        .as_deref()
        .ok_or_else(|| ParseError::entry("could not parse program start or end times"))?;
    let end = programme
        .end
        .as_deref()
        .ok_or_else(|| ParseError::entry("could not parse program start or end times"))?;

    let start = parse_compact_offset_datetime(start).map_err(ParseError::entry)?;
    let end = parse_compact_offset_datetime(end).map_err(ParseError::entry)?;

    let mut program = ImportedProgram::new(
        parse_title(programme)?,
        parse_description(programme),
        start,
        end,
    );
    program.season = parse_number(programme.season_num.as_deref());
    program.episode = parse_number(programme.episode_num.as_deref());

    Ok(program)
}

fn parse_title(programme: &Programme) -> Result<String, ParseError> {
    let mut title = programme
        .title
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| ParseError::entry("could not parse title"))?
        .to_string();

    if let Some(sub_title) = programme.sub_title.as_deref().map(str::trim) {
        if !sub_title.is_empty() {
            title.push_str(": ");
            title.push_str(sub_title);
        }
    }

    Ok(title)
}

fn parse_description(programme: &Programme) -> String {
    let mut description = programme
        .desc
        .as_deref()
        .or(programme.desc_short.as_deref())
        .map(str::trim)
        .unwrap_or("")
        .to_string();

    let format_description = programme
        .format_desc
        .as_deref()
        .or(programme.format_desc_short.as_deref())
        .map(str::trim)
        .unwrap_or("");
    if !format_description.is_empty() {
        description.push_str("\n\n");
        description.push_str(format_description);
    }

    description
}

fn parse_number(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse().ok()).unwrap_or(0)
}

pub struct ViacomSource<'a> {
    config: &'a ViacomConfig,
}

impl<'a> ViacomSource<'a> {
    pub fn new(config: &'a ViacomConfig) -> Self {
        Self { config }
    }

    async fn import_channel(
        &self,
        db: &Database,
        registry: &mut ChannelRegistry,
        counts: &mut ImportCounts,
        channel_id: &str,
        language: &str,
    ) -> Result<()> {
        let client = http_client();
        let base = self.config.api_url.trim_end_matches('/');
        let today = Utc::now().date_naive();
        let max_date = today + Duration::days(FETCH_HORIZON_DAYS);
        let grace_limit = today + Duration::days(SCHEDULE_END_GRACE_DAYS);

        let mut date = today;
        let mut attempts = 0u32;

        loop {
            info!(
                "Downloading data for '{}', date '{}'",
                channel_id,
                date.format("%Y-%m-%d")
            );
            let url = format!(
                "{base}/{channel_id}/xmltvlegal/{language}/{}.xml",
                date.format("%Y%m%d")
            );

            let (status, body) = match http_get_text(&client, &url).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Failed to download '{}': {}", url, e);
                    break;
                }
            };

            if status == 404 {
                if date > grace_limit {
                    // Past the first week a 404 is just the end of the
                    // published schedule.
                    info!("No data for date, continuing...");
                } else {
                    warn!("Failed to download '{}' ({})", url, status);
                }
                break;
            }

            if status != 200 {
                attempts += 1;
                if attempts >= MAX_ATTEMPTS_PER_DAY {
                    warn!(
                        "Giving up on '{}' after {} attempts (last status {})",
                        url, attempts, status
                    );
                    break;
                }
                warn!("Failed to download '{}' ({}), retrying...", url, status);
                continue;
            }

            info!("Importing file...");
            match TvParser::parse(&body, channel_id) {
                Ok(parser) => {
                    let feed = ParsedFeed {
                        origin_id: format!("viacom.{channel_id}"),
                        channel_name: parser.channel_name().to_string(),
                        window: parser.window(),
                        programs: parser.programs(),
                    };
                    persist_feed(db, registry, counts, feed).await?;
                }
                Err(e) => {
                    warn!("Failed to parse file from '{}': {}", url, e);
                }
            }

            attempts = 0;
            date += Duration::days(1);
            if date > max_date {
                info!("Reached 3 month fetch limit for channel, continuing...");
                break;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Source for ViacomSource<'_> {
    fn name(&self) -> &'static str {
        "Viacom"
    }

    async fn import(&self, db: &Database) -> Result<ImportCounts> {
        let mut counts = ImportCounts::default();
        let mut registry = ChannelRegistry::load(db).await?;

        if self.config.api_url.is_empty() {
            info!("Source disabled...");
            return Ok(counts);
        }

        for (channel_id, language) in &self.config.channels {
            self.import_channel(db, &mut registry, &mut counts, channel_id, language)
                .await?;
        }

        Ok(counts)
    }
}
