//! Global Listings: FTP-delivered schedule files, one channel per document.
//!
//! The same schema is served by PawaDiscovery over HTTP; the parser is
//! shared and only the origin-id prefix differs.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{GlobalListingsConfig, ImportConfig};
use crate::database::Database;
use crate::errors::ParseError;
use crate::ingestor::ftp::FtpDownloader;
use crate::ingestor::registry::ChannelRegistry;
use crate::models::{CoverageWindow, ImportCounts, ImportedProgram};
use crate::sources::{persist_feed, ParsedFeed, Source};
use crate::utils::time::parse_flexible_datetime;

#[derive(Debug, Deserialize)]
struct ScheduleDocument {
    #[serde(rename = "@CHANNEL_ID")]
    channel_id: Option<String>,
    #[serde(rename = "CHANNEL_NAME")]
    channel_name: Option<String>,
    #[serde(rename = "BROADCAST", default)]
    broadcasts: Vec<Broadcast>,
}

#[derive(Debug, Deserialize)]
struct Broadcast {
    #[serde(rename = "BROADCAST_START_DATETIME")]
    start: Option<String>,
    #[serde(rename = "BROADCAST_END_TIME")]
    end: Option<String>,
    #[serde(rename = "BROADCAST_TITLE")]
    title: Option<String>,
    #[serde(rename = "BROADCAST_SUBTITLE")]
    subtitle: Option<String>,
    #[serde(rename = "PROGRAMME")]
    programme: Option<Programme>,
}

#[derive(Debug, Deserialize)]
struct Programme {
    #[serde(rename = "TEXT")]
    text: Option<ProgrammeText>,
    #[serde(rename = "SERIES_NUMBER")]
    series_number: Option<String>,
    #[serde(rename = "EPISODE_NUMBER")]
    episode_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProgrammeText {
    #[serde(rename = "TEXT_TEXT")]
    text: Option<String>,
}

/// Typed view over one schedule document. Construction fails when the
/// channel identity or the coverage window cannot be established.
pub struct ScheduleParser {
    origin_id: String,
    channel_name: String,
    window: CoverageWindow,
    broadcasts: Vec<Broadcast>,
}

impl ScheduleParser {
    pub fn parse(xml: &str, origin_prefix: &str) -> Result<Self, ParseError> {
        let document: ScheduleDocument = quick_xml::de::from_str(xml)?;

        let channel_id = document
            .channel_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ParseError::structure("CHANNEL_ID attribute is missing"))?
            .to_string();
        let channel_name = document
            .channel_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ParseError::structure("channel name is missing"))?
            .to_string();

        let first = document
            .broadcasts
            .first()
            .and_then(|b| b.start.as_deref())
            .ok_or_else(|| ParseError::structure("could not get schedule start time"))?;
        let last = document
            .broadcasts
            .last()
            .and_then(|b| b.end.as_deref())
            .ok_or_else(|| ParseError::structure("could not get schedule end time"))?;

        let window = CoverageWindow::new(
            parse_flexible_datetime(first).map_err(ParseError::structure)?,
            parse_flexible_datetime(last).map_err(ParseError::structure)?,
        );

        Ok(Self {
            origin_id: format!("{origin_prefix}.{channel_id}"),
            channel_name,
            window,
            broadcasts: document.broadcasts,
        })
    }

    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn window(&self) -> CoverageWindow {
        self.window
    }

    /// Normalized program entries; malformed broadcasts are logged and
    /// dropped without affecting their siblings.
    pub fn programs(&self) -> Vec<ImportedProgram> {
        let mut programs = Vec::with_capacity(self.broadcasts.len());

        for broadcast in &self.broadcasts {
            match parse_broadcast(broadcast) {
                Ok(program) => programs.push(program),
                Err(e) => warn!("Invalid program: {}", e),
            }
        }

        programs
    }

    pub(crate) fn into_feed(self) -> ParsedFeed {
        let programs = self.programs();
        ParsedFeed {
            origin_id: self.origin_id,
            channel_name: self.channel_name,
            window: self.window,
            programs,
        }
    }
}

fn parse_broadcast(broadcast: &Broadcast) -> Result<ImportedProgram, ParseError> {
    let start = broadcast
        .start
        .as_deref()
        .ok_or_else(|| ParseError::entry("program start time missing"))?;
    let end = broadcast
        .end
        .as_deref()
        .ok_or_else(|| ParseError::entry("program end time missing"))?;

    let start = parse_flexible_datetime(start).map_err(ParseError::entry)?;
    let end = parse_flexible_datetime(end).map_err(ParseError::entry)?;

    let title = broadcast
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ParseError::entry("program title not found"))?
        .to_string();

    let mut program = ImportedProgram::new(title, parse_description(broadcast), start, end);
    program.season = parse_number(broadcast.programme.as_ref().and_then(|p| p.series_number.as_deref()));
    program.episode = parse_number(broadcast.programme.as_ref().and_then(|p| p.episode_number.as_deref()));

    Ok(program)
}

fn parse_description(broadcast: &Broadcast) -> String {
    let description = match broadcast
        .programme
        .as_ref()
        .and_then(|p| p.text.as_ref())
        .and_then(|t| t.text.as_deref())
    {
        Some(text) => text.trim().to_string(),
        None => return String::new(),
    };

    match broadcast.subtitle.as_deref().map(str::trim) {
        Some(subtitle) if !subtitle.is_empty() => format!("{subtitle}: {description}"),
        _ => description,
    }
}

fn parse_number(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse().ok()).unwrap_or(0)
}

pub struct GlobalListingsSource<'a> {
    config: &'a GlobalListingsConfig,
    import: &'a ImportConfig,
}

impl<'a> GlobalListingsSource<'a> {
    pub fn new(config: &'a GlobalListingsConfig, import: &'a ImportConfig) -> Self {
        Self { config, import }
    }
}

#[async_trait]
impl Source for GlobalListingsSource<'_> {
    fn name(&self) -> &'static str {
        "Global Listings"
    }

    async fn import(&self, db: &Database) -> Result<ImportCounts> {
        let mut counts = ImportCounts::default();
        let mut registry = ChannelRegistry::load(db).await?;

        if self.config.ftp_server.is_empty() {
            info!("Source disabled...");
            return Ok(counts);
        }

        let ftp = FtpDownloader::new(
            &self.config.ftp_server,
            &self.config.ftp_username,
            &self.config.ftp_password,
        );
        let files = ftp.download_folder(
            &self.import.temp_path,
            self.config.delete_source_files,
            ".xml",
        )?;

        for file in files {
            info!("Importing file '{}'...", file.display());

            let xml = match std::fs::read_to_string(&file) {
                Ok(xml) => xml,
                Err(e) => {
                    warn!("Failed to read file '{}': {}", file.display(), e);
                    continue;
                }
            };

            let parser = match ScheduleParser::parse(&xml, "globallistings") {
                Ok(parser) => parser,
                Err(e) => {
                    warn!("Failed to parse file: {}", e);
                    continue;
                }
            };

            persist_feed(db, &mut registry, &mut counts, parser.into_feed()).await?;
            let _ = std::fs::remove_file(&file);
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SCHEDULE CHANNEL_ID="BBCN">
  <CHANNEL_NAME>BBC Nordic</CHANNEL_NAME>
  <BROADCAST>
    <BROADCAST_START_DATETIME>2023-05-01 06:00:00</BROADCAST_START_DATETIME>
    <BROADCAST_END_TIME>2023-05-01 06:30:00</BROADCAST_END_TIME>
    <BROADCAST_TITLE>Morning News</BROADCAST_TITLE>
    <BROADCAST_SUBTITLE>Live</BROADCAST_SUBTITLE>
    <PROGRAMME>
      <TEXT>
        <TEXT_TEXT>Headlines from around the world.</TEXT_TEXT>
      </TEXT>
      <SERIES_NUMBER>2</SERIES_NUMBER>
      <EPISODE_NUMBER>14</EPISODE_NUMBER>
    </PROGRAMME>
  </BROADCAST>
  <BROADCAST>
    <BROADCAST_START_DATETIME>2023-05-01 06:30:00</BROADCAST_START_DATETIME>
    <BROADCAST_END_TIME>2023-05-01 07:00:00</BROADCAST_END_TIME>
    <BROADCAST_TITLE>Weather</BROADCAST_TITLE>
  </BROADCAST>
</SCHEDULE>"#;

    #[test]
    fn parses_channel_and_window() {
        let parser = ScheduleParser::parse(FIXTURE, "globallistings").unwrap();
        assert_eq!(parser.origin_id(), "globallistings.BBCN");
        assert_eq!(parser.channel_name(), "BBC Nordic");
        assert_eq!(
            parser.window().start.to_rfc3339(),
            "2023-05-01T06:00:00+00:00"
        );
        assert_eq!(
            parser.window().end.to_rfc3339(),
            "2023-05-01T07:00:00+00:00"
        );
    }

    #[test]
    fn subtitle_prefixes_description() {
        let parser = ScheduleParser::parse(FIXTURE, "globallistings").unwrap();
        let programs = parser.programs();
        assert_eq!(programs.len(), 2);
        assert_eq!(
            programs[0].description,
            "Live: Headlines from around the world."
        );
        assert_eq!(programs[0].season, 2);
        assert_eq!(programs[0].episode, 14);
        // No programme text at all: empty description.
        assert_eq!(programs[1].description, "");
    }

    #[test]
    fn pawa_prefix_changes_origin_id() {
        let parser = ScheduleParser::parse(FIXTURE, "pawadiscovery").unwrap();
        assert_eq!(parser.origin_id(), "pawadiscovery.BBCN");
    }

    #[test]
    fn missing_channel_id_is_structural() {
        let xml = FIXTURE.replace(r#" CHANNEL_ID="BBCN""#, "");
        assert!(matches!(
            ScheduleParser::parse(&xml, "globallistings"),
            Err(ParseError::Structure { .. })
        ));
    }

    #[test]
    fn bad_entry_does_not_abort_siblings() {
        let xml = FIXTURE.replace("<BROADCAST_TITLE>Weather</BROADCAST_TITLE>", "");
        let parser = ScheduleParser::parse(&xml, "globallistings").unwrap();
        let programs = parser.programs();
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].title, "Morning News");
    }
}
