//! Clipsource: HTTP API returning per-day schedules where broadcast events
//! and editorial content are separate lists joined by content id.
//!
//! Channels are named in configuration, not in the feed, and are created
//! up front. An in-body status of "404" marks the end of the published
//! schedule for a channel.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::ClipsourceConfig;
use crate::database::Database;
use crate::errors::ParseError;
use crate::ingestor::registry::ChannelRegistry;
use crate::models::{CoverageWindow, ImportCounts, ImportedProgram};
use crate::sources::{http_client, http_get_text, persist_feed, ParsedFeed, Source};
use crate::utils::text::compose_title;
use crate::utils::time::parse_flexible_datetime;

const FETCH_HORIZON_DAYS: i64 = 91;

#[derive(Debug, Deserialize)]
pub struct ScheduleResponse {
    status: Option<String>,
    message: Option<String>,
    from: Option<String>,
    to: Option<String>,
    #[serde(rename = "eventList")]
    event_list: Option<EventList>,
    #[serde(rename = "contentList")]
    content_list: Option<ContentList>,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(rename = "event", default)]
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "contentIdRef")]
    content_id_ref: Option<String>,
    #[serde(rename = "timeList")]
    time_list: Option<TimeList>,
}

#[derive(Debug, Deserialize)]
struct TimeList {
    time: Option<TimeEntry>,
}

#[derive(Debug, Deserialize)]
struct TimeEntry {
    #[serde(rename = "startTime")]
    start: Option<String>,
    #[serde(rename = "endTime")]
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentList {
    #[serde(rename = "content", default)]
    contents: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(rename = "contentId")]
    content_id: Option<String>,
    #[serde(rename = "titleList")]
    title_list: Option<TitleList>,
    #[serde(rename = "descriptionList")]
    description_list: Option<DescriptionList>,
    #[serde(rename = "genreList", default)]
    genre_lists: Vec<GenreList>,
    #[serde(rename = "seasonNumber")]
    season: Option<String>,
    #[serde(rename = "episodeNumber")]
    episode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TitleList {
    #[serde(rename = "title", default)]
    titles: Vec<Title>,
}

#[derive(Debug, Deserialize)]
struct Title {
    #[serde(rename = "@type")]
    kind: Option<String>,
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescriptionList {
    #[serde(rename = "description", default)]
    descriptions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenreList {
    genre: Option<Genre>,
}

#[derive(Debug, Deserialize)]
struct Genre {
    #[serde(rename = "mainGenre")]
    main: Option<String>,
    #[serde(rename = "subGenreList")]
    sub_list: Option<SubGenreList>,
}

#[derive(Debug, Deserialize)]
struct SubGenreList {
    #[serde(rename = "subGenre", default)]
    subs: Vec<String>,
}

impl ScheduleResponse {
    pub fn decode(xml: &str) -> Result<Self, ParseError> {
        Ok(quick_xml::de::from_str(xml)?)
    }

    pub fn status(&self) -> &str {
        self.status.as_deref().map(str::trim).unwrap_or("")
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().map(str::trim).unwrap_or("")
    }
}

pub struct ScheduleParser {
    window: CoverageWindow,
    response: ScheduleResponse,
}

impl ScheduleParser {
    pub fn new(response: ScheduleResponse) -> Result<Self, ParseError> {
        let from = response
            .from
            .as_deref()
            .ok_or_else(|| ParseError::structure("schedule interval missing"))?;
        let to = response
            .to
            .as_deref()
            .ok_or_else(|| ParseError::structure("schedule interval missing"))?;

        let window = CoverageWindow::new(
            parse_flexible_datetime(from).map_err(ParseError::structure)?,
            parse_flexible_datetime(to).map_err(ParseError::structure)?,
        );

        Ok(Self { window, response })
    }

    pub fn window(&self) -> CoverageWindow {
        self.window
    }

    /// Joins every event to its content entry and normalizes the pair.
    /// Events without a matching content entry produce nothing.
    pub fn programs(&self) -> Vec<ImportedProgram> {
        let events = match &self.response.event_list {
            Some(list) => &list.events,
            None => return Vec::new(),
        };
        let contents: &[Content] = match &self.response.content_list {
            Some(list) => &list.contents,
            None => &[],
        };

        let mut programs = Vec::with_capacity(events.len());
        for event in events {
            let id = event.content_id_ref.as_deref().unwrap_or("");
            for content in contents {
                if content.content_id.as_deref().unwrap_or("") != id {
                    continue;
                }
                match parse_program(event, content) {
                    Ok(program) => programs.push(program),
                    Err(e) => warn!("Invalid program: {}", e),
                }
            }
        }

        programs
    }
}

fn parse_program(event: &Event, content: &Content) -> Result<ImportedProgram, ParseError> {
    let time = event
        .time_list
        .as_ref()
        .and_then(|list| list.time.as_ref())
        .ok_or_else(|| ParseError::entry("could not parse program start or end times"))?;

    let start = time
        .start
        .as_deref()
        .ok_or_else(|| ParseError::entry("could not parse program start or end times"))?;
    let end = time
        .end
        .as_deref()
        .ok_or_else(|| ParseError::entry("could not parse program start or end times"))?;

    let start = parse_flexible_datetime(start).map_err(ParseError::entry)?;
    let end = parse_flexible_datetime(end).map_err(ParseError::entry)?;

    let mut program = ImportedProgram::new(
        parse_title(content)?,
        parse_description(content),
        start,
        end,
    );
    program.season = parse_number(content.season.as_deref());
    program.episode = parse_number(content.episode.as_deref());

    Ok(program)
}

fn parse_title(content: &Content) -> Result<String, ParseError> {
    let titles = &content
        .title_list
        .as_ref()
        .ok_or_else(|| ParseError::entry("could not parse program title"))?
        .titles;

    let first_of = |kind: &str| {
        titles
            .iter()
            .filter(|t| t.kind.as_deref() == Some(kind))
            .find_map(|t| t.value.as_deref().map(str::trim).filter(|v| !v.is_empty()))
    };

    Ok(compose_title(
        first_of("series").unwrap_or(""),
        first_of("content").unwrap_or(""),
    ))
}

fn parse_description(content: &Content) -> String {
    let mut description = content
        .description_list
        .as_ref()
        .and_then(|list| list.descriptions.first())
        .map(|d| d.trim().to_string())
        .unwrap_or_default();

    for genre_list in &content.genre_lists {
        let Some(genre) = &genre_list.genre else {
            continue;
        };

        if let Some(main) = genre.main.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
            description.push_str(&format!(" ({main})"));
        }

        let Some(sub_list) = &genre.sub_list else {
            continue;
        };
        for sub in &sub_list.subs {
            let sub = sub.trim();
            if !sub.is_empty() {
                description.push_str(&format!(" ({sub})"));
            }
        }
    }

    description
}

fn parse_number(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse().ok()).unwrap_or(0)
}

pub struct ClipsourceSource<'a> {
    config: &'a ClipsourceConfig,
}

impl<'a> ClipsourceSource<'a> {
    pub fn new(config: &'a ClipsourceConfig) -> Self {
        Self { config }
    }

    async fn import_channel(
        &self,
        db: &Database,
        registry: &mut ChannelRegistry,
        counts: &mut ImportCounts,
        channel_id: &str,
        channel_name: &str,
    ) -> Result<()> {
        let client = http_client();
        let today = Utc::now().date_naive();
        let max_date = today + Duration::days(FETCH_HORIZON_DAYS);
        let mut date = today;

        loop {
            info!(
                "Downloading data for '{}', date '{}'",
                channel_id,
                date.format("%Y-%m-%d")
            );
            let url = format!(
                "{}?key={}&channelId={}&date={}",
                self.config.api_url,
                self.config.api_key,
                channel_id,
                date.format("%Y-%m-%d")
            );

            let (status, body) = match http_get_text(&client, &url).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Failed to download '{}': {}", url, e);
                    break;
                }
            };
            if status != 200 {
                warn!("Failed to download '{}' ({})", url, status);
                break;
            }

            let response = match ScheduleResponse::decode(&body) {
                Ok(response) => response,
                Err(e) => {
                    warn!("Invalid XML received from '{}': {}", url, e);
                    break;
                }
            };

            if response.status() == "404" {
                info!("No data for date, continuing...");
                break;
            }
            if !response.status().is_empty() {
                warn!(
                    "Response status: '{}', '{}'",
                    response.status(),
                    response.message()
                );
            }

            info!("Importing file...");
            match ScheduleParser::new(response) {
                Ok(parser) => {
                    let feed = ParsedFeed {
                        origin_id: format!("clipsource.{channel_id}"),
                        channel_name: channel_name.to_string(),
                        window: parser.window(),
                        programs: parser.programs(),
                    };
                    persist_feed(db, registry, counts, feed).await?;
                }
                Err(e) => {
                    warn!("Failed to parse file: {}", e);
                }
            }

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
impl Source for ClipsourceSource<'_> {
    fn name(&self) -> &'static str {
        "Clipsource"
    }

    async fn import(&self, db: &Database) -> Result<ImportCounts> {
        let mut counts = ImportCounts::default();
        let mut registry = ChannelRegistry::load(db).await?;

        if self.config.api_url.is_empty() {
            info!("Source disabled...");
            return Ok(counts);
        }

        for (channel_id, channel_name) in &self.config.channels {
            // Channel names come from configuration; register before any
            // fetch so an empty schedule still creates the channel.
            let origin_id = format!("clipsource.{channel_id}");
            let (_, created) = registry.ensure(db, &origin_id, channel_name).await?;
            if created {
                counts.new_channels += 1;
            }

            self.import_channel(db, &mut registry, &mut counts, channel_id, channel_name)
                .await?;
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<schedule>
  <from>2023-06-01T00:00:00Z</from>
  <to>2023-06-02T00:00:00Z</to>
  <eventList>
    <event>
      <contentIdRef>c-1</contentIdRef>
      <timeList>
        <time>
          <startTime>2023-06-01T08:00:00Z</startTime>
          <endTime>2023-06-01T09:00:00Z</endTime>
        </time>
      </timeList>
    </event>
    <event>
      <contentIdRef>c-missing</contentIdRef>
      <timeList>
        <time>
          <startTime>2023-06-01T09:00:00Z</startTime>
          <endTime>2023-06-01T10:00:00Z</endTime>
        </time>
      </timeList>
    </event>
  </eventList>
  <contentList>
    <content>
      <contentId>c-1</contentId>
      <titleList>
        <title type="series">Huvila ja huussi</title>
        <title type="content">Keittiöremontti</title>
      </titleList>
      <descriptionList>
        <description>Remontti jatkuu.</description>
      </descriptionList>
      <genreList>
        <genre>
          <mainGenre>Lifestyle</mainGenre>
          <subGenreList>
            <subGenre>Home</subGenre>
          </subGenreList>
        </genre>
      </genreList>
      <seasonNumber>8</seasonNumber>
      <episodeNumber>3</episodeNumber>
    </content>
  </contentList>
</schedule>"#;

    #[test]
    fn joins_events_to_content() {
        let response = ScheduleResponse::decode(FIXTURE).unwrap();
        let parser = ScheduleParser::new(response).unwrap();
        let programs = parser.programs();

        // The unmatched event is silently skipped.
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].title, "Huvila ja huussi: Keittiöremontti");
        assert_eq!(
            programs[0].description,
            "Remontti jatkuu. (Lifestyle) (Home)"
        );
        assert_eq!(programs[0].season, 8);
        assert_eq!(programs[0].episode, 3);
    }

    #[test]
    fn window_comes_from_interval_elements() {
        let response = ScheduleResponse::decode(FIXTURE).unwrap();
        let parser = ScheduleParser::new(response).unwrap();
        assert_eq!(
            parser.window().start.to_rfc3339(),
            "2023-06-01T00:00:00+00:00"
        );
        assert_eq!(
            parser.window().end.to_rfc3339(),
            "2023-06-02T00:00:00+00:00"
        );
    }

    #[test]
    fn status_sentinel_is_exposed() {
        let xml = r#"<schedule><status>404</status><message>no data</message></schedule>"#;
        let response = ScheduleResponse::decode(xml).unwrap();
        assert_eq!(response.status(), "404");
        assert_eq!(response.message(), "no data");
        // No interval to parse once the body is a status envelope.
        assert!(ScheduleParser::new(response).is_err());
    }
}
