//! Eurosport: FTP-delivered files where programs are grouped under GMT
//! broadcast days and carry bare HH:MM clocks.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{EurosportConfig, ImportConfig};
use crate::database::Database;
use crate::errors::ParseError;
use crate::ingestor::ftp::FtpDownloader;
use crate::ingestor::registry::ChannelRegistry;
use crate::models::{CoverageWindow, ImportCounts, ImportedProgram};
use crate::sources::{persist_feed, ParsedFeed, Source};
use crate::utils::time::{parse_clock_on_day, parse_day_month_year};

#[derive(Debug, Deserialize)]
struct EurosportDocument {
    #[serde(rename = "BroadcastDate_GMT", default)]
    days: Vec<BroadcastDay>,
}

#[derive(Debug, Deserialize)]
struct BroadcastDay {
    #[serde(rename = "@Day")]
    day: Option<String>,
    #[serde(rename = "Emission", default)]
    emissions: Vec<Emission>,
}

#[derive(Debug, Deserialize)]
struct Emission {
    #[serde(rename = "StartTimeGMT")]
    start: Option<String>,
    #[serde(rename = "EndTimeGMT")]
    end: Option<String>,
    #[serde(rename = "Sport")]
    sport: Option<String>,
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "Feature")]
    feature: Option<String>,
    #[serde(rename = "DateFirstBroadcast")]
    first_broadcast: Option<String>,
}

pub struct EurosportParser {
    window: CoverageWindow,
    days: Vec<BroadcastDay>,
}

impl EurosportParser {
    pub fn parse(xml: &str) -> Result<Self, ParseError> {
        let document: EurosportDocument = quick_xml::de::from_str(xml)?;

        if document.days.is_empty() {
            return Err(ParseError::structure("broadcast day list missing"));
        }

        let first = parse_day(document.days.first())?;
        let last = parse_day(document.days.last())?;

        // The window spans whole days: midnight on the first day through
        // the last second of the last day.
        let window = CoverageWindow::new(
            parse_clock_on_day(first, "00:00").map_err(ParseError::structure)?,
            parse_clock_on_day(last, "23:59").map_err(ParseError::structure)?
                + Duration::seconds(59),
        );

        Ok(Self {
            window,
            days: document.days,
        })
    }

    pub fn window(&self) -> CoverageWindow {
        self.window
    }

    pub fn programs(&self) -> Vec<ImportedProgram> {
        let mut programs = Vec::new();

        for day in &self.days {
            let date = match parse_day(Some(day)) {
                Ok(date) => date,
                Err(e) => {
                    warn!("Skipping broadcast day: {}", e);
                    continue;
                }
            };

            for emission in &day.emissions {
                match parse_emission(date, emission) {
                    Ok(program) => programs.push(program),
                    Err(e) => warn!("Invalid program: {}", e),
                }
            }
        }

        programs
    }
}

fn parse_day(day: Option<&BroadcastDay>) -> Result<NaiveDate, ParseError> {
    let raw = day
        .and_then(|d| d.day.as_deref())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ParseError::structure("broadcast day attribute missing"))?;

    parse_day_month_year(raw).map_err(ParseError::structure)
}

fn parse_emission(date: NaiveDate, emission: &Emission) -> Result<ImportedProgram, ParseError> {
    let start = clock(date, emission.start.as_deref())?;
    let mut end = clock(date, emission.end.as_deref())?;

    // Clocks carry no date; an end at or before the start means the
    // program runs past midnight into the next day.
    if end <= start {
        end += Duration::days(1);
    }

    Ok(ImportedProgram::new(
        parse_title(emission)?,
        parse_description(emission),
        start,
        end,
    ))
}

fn clock(date: NaiveDate, raw: Option<&str>) -> Result<DateTime<Utc>, ParseError> {
    let raw = raw
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ParseError::entry("could not parse program start or end times"))?;

    parse_clock_on_day(date, raw).map_err(ParseError::entry)
}

fn parse_title(emission: &Emission) -> Result<String, ParseError> {
    let title = emission
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ParseError::entry("program title not found"))?;
    let sport = emission.sport.as_deref().map(str::trim).unwrap_or("");

    if title.starts_with(sport) {
        Ok(title.to_string())
    } else {
        Ok(format!("{sport}: {title}"))
    }
}

fn parse_description(emission: &Emission) -> String {
    let feature = match emission.feature.as_deref().map(str::trim) {
        Some(feature) => feature,
        None => return String::new(),
    };

    match emission.first_broadcast.as_deref().map(str::trim) {
        Some(first) if !first.is_empty() => format!("{feature} ({first})"),
        _ => feature.to_string(),
    }
}

pub struct EurosportSource<'a> {
    config: &'a EurosportConfig,
    import: &'a ImportConfig,
}

impl<'a> EurosportSource<'a> {
    pub fn new(config: &'a EurosportConfig, import: &'a ImportConfig) -> Self {
        Self { config, import }
    }
}

#[async_trait]
impl Source for EurosportSource<'_> {
    fn name(&self) -> &'static str {
        "Eurosport"
    }

    async fn import(&self, db: &Database) -> Result<ImportCounts> {
        let mut counts = ImportCounts::default();
        let mut registry = ChannelRegistry::load(db).await?;

        if self.config.ftp_server.is_empty() {
            info!("Source disabled...");
            return Ok(counts);
        }

        // Channel names are fixed by convention; register before the
        // downloads so a failed file still leaves the channel in place.
        for channel_id in self.config.files.keys() {
            let origin_id = format!("eurosport.{channel_id}");
            let (_, created) = registry
                .ensure(db, &origin_id, &format!("Eurosport {channel_id}"))
                .await?;
            if created {
                counts.new_channels += 1;
            }
        }

        let ftp = FtpDownloader::new(
            &self.config.ftp_server,
            &self.config.ftp_username,
            &self.config.ftp_password,
        );
        let files: Vec<(String, String)> = self
            .config
            .files
            .iter()
            .map(|(channel, file)| (channel.clone(), file.clone()))
            .collect();
        let downloaded = ftp.download_named(
            &self.import.temp_path,
            self.config.delete_source_files,
            &files,
        )?;

        for (channel_id, file) in downloaded {
            info!("Importing file '{}'...", file.display());

            let xml = match std::fs::read_to_string(&file) {
                Ok(xml) => xml,
                Err(e) => {
                    warn!("Failed to read file '{}': {}", file.display(), e);
                    continue;
                }
            };

            let parser = match EurosportParser::parse(&xml) {
                Ok(parser) => parser,
                Err(e) => {
                    warn!("Failed to parse file: {}", e);
                    continue;
                }
            };

            let feed = ParsedFeed {
                origin_id: format!("eurosport.{channel_id}"),
                channel_name: format!("Eurosport {channel_id}"),
                window: parser.window(),
                programs: parser.programs(),
            };
            persist_feed(db, &mut registry, &mut counts, feed).await?;
            let _ = std::fs::remove_file(&file);
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<BroadcastWeek>
  <BroadcastDate_GMT Day="03/06/2023">
    <Emission>
      <StartTimeGMT>09:00</StartTimeGMT>
      <EndTimeGMT>10:30</EndTimeGMT>
      <Sport>Cycling</Sport>
      <Title>Cycling: Giro d'Italia</Title>
      <Feature>Stage 18 highlights</Feature>
      <DateFirstBroadcast>02/06/2023</DateFirstBroadcast>
    </Emission>
    <Emission>
      <StartTimeGMT>23:30</StartTimeGMT>
      <EndTimeGMT>01:00</EndTimeGMT>
      <Sport>Tennis</Sport>
      <Title>Roland-Garros</Title>
    </Emission>
  </BroadcastDate_GMT>
  <BroadcastDate_GMT Day="04/06/2023">
    <Emission>
      <StartTimeGMT>08:00</StartTimeGMT>
      <EndTimeGMT>09:00</EndTimeGMT>
      <Sport>Snooker</Sport>
      <Title>Snooker Classics</Title>
    </Emission>
  </BroadcastDate_GMT>
</BroadcastWeek>"#;

    #[test]
    fn window_spans_whole_days() {
        let parser = EurosportParser::parse(FIXTURE).unwrap();
        assert_eq!(
            parser.window().start.to_rfc3339(),
            "2023-06-03T00:00:00+00:00"
        );
        assert_eq!(
            parser.window().end.to_rfc3339(),
            "2023-06-04T23:59:59+00:00"
        );
    }

    #[test]
    fn sport_prefix_only_when_missing() {
        let parser = EurosportParser::parse(FIXTURE).unwrap();
        let programs = parser.programs();
        assert_eq!(programs.len(), 3);
        // Title already starts with the sport name.
        assert_eq!(programs[0].title, "Cycling: Giro d'Italia");
        assert_eq!(programs[1].title, "Tennis: Roland-Garros");
    }

    #[test]
    fn description_appends_first_broadcast() {
        let parser = EurosportParser::parse(FIXTURE).unwrap();
        let programs = parser.programs();
        assert_eq!(programs[0].description, "Stage 18 highlights (02/06/2023)");
        assert_eq!(programs[1].description, "");
    }

    #[test]
    fn midnight_crossing_extends_into_next_day() {
        let parser = EurosportParser::parse(FIXTURE).unwrap();
        let programs = parser.programs();
        assert_eq!(programs[1].start.to_rfc3339(), "2023-06-03T23:30:00+00:00");
        assert_eq!(programs[1].end.to_rfc3339(), "2023-06-04T01:00:00+00:00");
    }

    #[test]
    fn missing_days_are_structural() {
        assert!(matches!(
            EurosportParser::parse("<BroadcastWeek></BroadcastWeek>"),
            Err(ParseError::Structure { .. })
        ));
    }
}
