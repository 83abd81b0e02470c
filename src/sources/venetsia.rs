//! Venetsia: tar archives of TV-Anytime documents delivered over FTP, one
//! document per channel per day.
//!
//! The feed needs the most repair of all providers. Timestamps carry a
//! wrong offset suffix during DST, end times regularly precede start times,
//! consecutive items overlap or duplicate each other, and two channels emit
//! placeholder items that are not programs at all. The parser normalizes
//! all of that before anything is persisted.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Days, Utc};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{ImportConfig, VenetsiaConfig};
use crate::database::Database;
use crate::errors::{ParseError, SourceError};
use crate::ingestor::episode::EpisodeInfo;
use crate::ingestor::ftp::FtpDownloader;
use crate::ingestor::registry::ChannelRegistry;
use crate::models::{CoverageWindow, ImportCounts, ImportedProgram};
use crate::sources::{persist_feed, ParsedFeed, Source};
use crate::utils::time::{
    helsinki_naive_to_utc, parse_helsinki_datetime, parse_helsinki_naive, VENETSIA_ZONE,
};

#[derive(Debug, Deserialize)]
struct VenetsiaDocument {
    #[serde(rename = "ProgramTable")]
    table: Option<ProgramTable>,
}

#[derive(Debug, Deserialize)]
struct ProgramTable {
    #[serde(rename = "ProgramTableInformation")]
    information: Option<TableInformation>,
    #[serde(rename = "ProgramItem", default)]
    items: Vec<ProgramItem>,
}

#[derive(Debug, Deserialize)]
struct TableInformation {
    #[serde(rename = "Station")]
    station: Option<Station>,
    #[serde(rename = "StartDate")]
    start_date: Option<String>,
    #[serde(rename = "EndDate")]
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Station {
    #[serde(rename = "@serviceId")]
    service_id: Option<String>,
    #[serde(rename = "Name")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProgramItem {
    #[serde(rename = "ProgramInformation")]
    information: Option<ItemInformation>,
}

#[derive(Debug, Deserialize)]
struct ItemInformation {
    #[serde(rename = "tva.ProgramDescription")]
    description: Option<TvaProgramDescription>,
}

#[derive(Debug, Deserialize)]
struct TvaProgramDescription {
    #[serde(rename = "ProgramInformationTable")]
    information_table: Option<TvaInformationTable>,
    #[serde(rename = "ProgramLocationTable")]
    location_table: Option<TvaLocationTable>,
}

#[derive(Debug, Deserialize)]
struct TvaInformationTable {
    #[serde(rename = "ProgramInformation")]
    information: Option<TvaProgramInformation>,
}

#[derive(Debug, Deserialize)]
struct TvaProgramInformation {
    #[serde(rename = "BasicDescription")]
    basic: Option<TvaBasicDescription>,
}

#[derive(Debug, Deserialize)]
struct TvaBasicDescription {
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "Synopsis")]
    synopsis: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TvaLocationTable {
    #[serde(rename = "BroadcastEvent")]
    event: Option<TvaBroadcastEvent>,
}

#[derive(Debug, Deserialize)]
struct TvaBroadcastEvent {
    #[serde(rename = "PublishedStartTime")]
    start: Option<String>,
    #[serde(rename = "PublishedEndTime")]
    end: Option<String>,
}

pub struct VenetsiaParser {
    service_id: String,
    channel_name: String,
    window: CoverageWindow,
    items: Vec<ProgramItem>,
}

impl VenetsiaParser {
    pub fn parse(xml: &str) -> Result<Self, ParseError> {
        let document: VenetsiaDocument = quick_xml::de::from_str(xml)?;

        let table = document
            .table
            .ok_or_else(|| ParseError::structure("document does not contain a program table"))?;
        let information = table
            .information
            .ok_or_else(|| ParseError::structure("program table information missing"))?;

        let station = information
            .station
            .ok_or_else(|| ParseError::structure("station element not found"))?;
        let service_id = station
            .service_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ParseError::structure("station service id not found"))?
            .to_string();
        let channel_name = station
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ParseError::structure("channel name not found"))?
            .to_string();

        let start_date = information
            .start_date
            .as_deref()
            .ok_or_else(|| ParseError::structure("start date missing"))?;
        let end_date = information
            .end_date
            .as_deref()
            .ok_or_else(|| ParseError::structure("end date missing"))?;

        let window = CoverageWindow::new(
            parse_helsinki_datetime(start_date).map_err(ParseError::structure)?,
            parse_helsinki_datetime(end_date).map_err(ParseError::structure)?,
        );

        Ok(Self {
            service_id,
            channel_name,
            window,
            items: table.items,
        })
    }

    pub fn origin_id(&self) -> String {
        format!("venetsia.{}", self.service_id)
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn window(&self) -> CoverageWindow {
        self.window
    }

    pub fn programs(&self) -> Vec<ImportedProgram> {
        let mut programs = Vec::with_capacity(self.items.len());

        for (index, item) in self.items.iter().enumerate() {
            // The following item is parsed without its own lookahead; it is
            // only needed for the overlap and duplicate checks.
            let next = self
                .items
                .get(index + 1)
                .and_then(|n| self.parse_item(n, None).ok());

            match self.parse_item(item, next.as_ref()) {
                Ok(program) => programs.push(program),
                Err(e) if e.is_intentional_skip() => info!("Ignoring program: {}", e),
                Err(e) => warn!("Invalid program: {}", e),
            }
        }

        programs
    }

    fn parse_item(
        &self,
        item: &ProgramItem,
        next: Option<&ImportedProgram>,
    ) -> Result<ImportedProgram, ParseError> {
        let description = item
            .information
            .as_ref()
            .and_then(|i| i.description.as_ref())
            .ok_or_else(|| ParseError::entry("no program info found"))?;

        let basic = description
            .information_table
            .as_ref()
            .and_then(|t| t.information.as_ref())
            .and_then(|i| i.basic.as_ref());

        let title = basic
            .and_then(|b| b.title.as_deref())
            .map(strip_rating_suffix)
            .unwrap_or_default();
        let synopsis = basic
            .and_then(|b| b.synopsis.as_deref())
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        // Two YLE channels publish placeholder items carrying only the
        // channel name.
        if self.service_id == "fsd"
            && (title == "YLE TEEMA" || title == "YLE FEM")
            && synopsis.is_empty()
        {
            return Err(ParseError::NonProgram { title });
        }

        let event = description
            .location_table
            .as_ref()
            .and_then(|t| t.event.as_ref());
        let start_raw = event
            .and_then(|e| e.start.as_deref())
            .ok_or_else(|| ParseError::entry("start time for program not found"))?;
        let end_raw = event
            .and_then(|e| e.end.as_deref())
            .ok_or_else(|| ParseError::entry("end time for program not found"))?;

        let start = parse_helsinki_datetime(start_raw).map_err(ParseError::entry)?;
        let mut end = fixed_end_time(start, end_raw).map_err(ParseError::entry)?;

        if let Some(next) = next {
            if end > next.start {
                info!("Program '{}' ends after the next one starts.", title);
                end = next.start;
            }
        }

        let start = if start < self.window.start {
            info!("Program '{}' begins before the schedule start time.", title);
            self.window.start
        } else {
            start
        };
        if end > self.window.end {
            info!("Program '{}' ends after the schedule end time.", title);
            end = self.window.end;
        }

        if let Some(next) = next {
            if title == next.title && synopsis == next.description && start == next.start {
                return Err(ParseError::Duplicate { title });
            }
        }

        let episode = EpisodeInfo::from_description(&synopsis);
        let mut program = ImportedProgram::new(title, synopsis, start, end);
        program.season = episode.season;
        program.episode = episode.episode;
        program.episode_count = episode.episode_count;

        Ok(program)
    }
}

/// Most titles carry a trailing PEGI age rating such as `(12)` or `(S)`.
fn strip_rating_suffix(title: &str) -> String {
    let title = title.trim();
    match Regex::new(r" \([S0-9]{1,2}\)$") {
        Ok(re) => re.replace(title, "").into_owned(),
        Err(_) => title.to_string(),
    }
}

/// End times regularly precede their start time in this feed. When that
/// happens the printed end date is discarded and the end's wall-clock time
/// is re-anchored to the start's local day, rolling to the next day when
/// the clock is not after the start's.
fn fixed_end_time(start: DateTime<Utc>, end_raw: &str) -> Result<DateTime<Utc>, String> {
    let end = parse_helsinki_datetime(end_raw)?;
    if end >= start {
        return Ok(end);
    }

    let end_clock = parse_helsinki_naive(end_raw)?.time();
    let start_local = start.with_timezone(&VENETSIA_ZONE);
    let date = if end_clock > start_local.time() {
        start_local.date_naive()
    } else {
        start_local
            .date_naive()
            .checked_add_days(Days::new(1))
            .ok_or_else(|| "end date out of range".to_string())?
    };

    helsinki_naive_to_utc(date.and_time(end_clock))
}

pub struct VenetsiaSource<'a> {
    config: &'a VenetsiaConfig,
    import: &'a ImportConfig,
}

impl<'a> VenetsiaSource<'a> {
    pub fn new(config: &'a VenetsiaConfig, import: &'a ImportConfig) -> Self {
        Self { config, import }
    }

    async fn import_document(
        &self,
        db: &Database,
        registry: &mut ChannelRegistry,
        counts: &mut ImportCounts,
        file: &Path,
    ) -> Result<()> {
        info!("Importing file '{}'...", file.display());

        let xml = match fs::read_to_string(file) {
            Ok(xml) => xml,
            Err(e) => {
                warn!("Failed to read file '{}': {}", file.display(), e);
                return Ok(());
            }
        };

        let parser = match VenetsiaParser::parse(&xml) {
            Ok(parser) => parser,
            Err(e) => {
                warn!("Failed to parse file: {}", e);
                return Ok(());
            }
        };

        let feed = ParsedFeed {
            origin_id: parser.origin_id(),
            channel_name: parser.channel_name().to_string(),
            window: parser.window(),
            programs: parser.programs(),
        };
        persist_feed(db, registry, counts, feed).await?;
        let _ = fs::remove_file(file);

        Ok(())
    }
}

#[async_trait]
impl Source for VenetsiaSource<'_> {
    fn name(&self) -> &'static str {
        "Venetsia"
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
        let archives = ftp.download_folder(
            &self.import.temp_path,
            self.config.delete_source_files,
            ".tar",
        )?;

        for archive in archives {
            info!("Unpacking file '{}'...", archive.display());

            let (staging, documents) = match unpack_documents(&archive) {
                Ok(unpacked) => unpacked,
                Err(e) => {
                    warn!("Failed to unpack '{}': {}", archive.display(), e);
                    continue;
                }
            };
            let _ = fs::remove_file(&archive);

            for document in &documents {
                self.import_document(db, &mut registry, &mut counts, document)
                    .await?;
            }

            let _ = fs::remove_dir_all(&staging);
        }

        Ok(counts)
    }
}

/// Extract the XML members of a tar archive into a directory named after
/// the archive, returning the staging directory and the extracted paths.
fn unpack_documents(archive: &Path) -> Result<(PathBuf, Vec<PathBuf>), SourceError> {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let target = archive
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
        .join(stem);
    fs::create_dir_all(&target).map_err(|e| SourceError::io(target.display().to_string(), e))?;

    let reader =
        fs::File::open(archive).map_err(|e| SourceError::io(archive.display().to_string(), e))?;
    let mut tar = tar::Archive::new(reader);

    let mut documents = Vec::new();
    let entries = tar
        .entries()
        .map_err(|e| SourceError::io(archive.display().to_string(), e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| SourceError::io(archive.display().to_string(), e))?;

        let name = match entry.path() {
            Ok(path) => path.into_owned(),
            Err(_) => continue,
        };
        let is_xml = name
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("xml"))
            .unwrap_or(false);
        let file_name = match name.file_name() {
            Some(file_name) if is_xml => file_name.to_owned(),
            _ => continue,
        };

        let destination = target.join(file_name);
        entry
            .unpack(&destination)
            .map_err(|e| SourceError::io(destination.display().to_string(), e))?;
        documents.push(destination);
    }

    documents.sort();
    Ok((target, documents))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(service_id: &str, items: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Transmission>
  <ProgramTable>
    <ProgramTableInformation>
      <Station serviceId="{service_id}">
        <tva:Name>Testikanava</tva:Name>
      </Station>
      <StartDate>2023-07-01</StartDate>
      <EndDate>2023-07-02</EndDate>
    </ProgramTableInformation>
    {items}
  </ProgramTable>
</Transmission>"#
        )
    }

    fn item(title: &str, synopsis: &str, start: &str, end: &str) -> String {
        format!(
            r#"<ProgramItem>
  <ProgramInformation>
    <tva.ProgramDescription>
      <tva:ProgramInformationTable>
        <tva:ProgramInformation>
          <tva:BasicDescription>
            <tva:Title>{title}</tva:Title>
            <tva:Synopsis>{synopsis}</tva:Synopsis>
          </tva:BasicDescription>
        </tva:ProgramInformation>
      </tva:ProgramInformationTable>
      <tva:ProgramLocationTable>
        <tva:BroadcastEvent>
          <tva:PublishedStartTime>{start}</tva:PublishedStartTime>
          <tva:PublishedEndTime>{end}</tva:PublishedEndTime>
        </tva:BroadcastEvent>
      </tva:ProgramLocationTable>
    </tva.ProgramDescription>
  </ProgramInformation>
</ProgramItem>"#
        )
    }

    #[test]
    fn parses_station_and_window() {
        let xml = document(
            "yle1",
            &item(
                "Uutiset (7)",
                "Puolen päivän uutiset.",
                "2023-07-01T12:00:00+02:00",
                "2023-07-01T12:30:00+02:00",
            ),
        );
        let parser = VenetsiaParser::parse(&xml).unwrap();

        assert_eq!(parser.origin_id(), "venetsia.yle1");
        assert_eq!(parser.channel_name(), "Testikanava");
        // Bare dates are Helsinki midnights; July is +03:00.
        assert_eq!(
            parser.window().start.to_rfc3339(),
            "2023-06-30T21:00:00+00:00"
        );
    }

    #[test]
    fn printed_offset_is_discarded() {
        let xml = document(
            "yle1",
            &item(
                "Uutiset",
                "",
                "2023-07-01T12:00:00+02:00",
                "2023-07-01T12:30:00+02:00",
            ),
        );
        let programs = VenetsiaParser::parse(&xml).unwrap().programs();

        assert_eq!(programs.len(), 1);
        // 12:00 Helsinki in July is 09:00 UTC regardless of the +02:00.
        assert_eq!(programs[0].start.to_rfc3339(), "2023-07-01T09:00:00+00:00");
        assert_eq!(programs[0].end.to_rfc3339(), "2023-07-01T09:30:00+00:00");
    }

    #[test]
    fn rating_suffix_is_stripped() {
        let xml = document(
            "yle1",
            &item(
                "Elokuva: Tuntematon sotilas (16)",
                "Sotaelokuva.",
                "2023-07-01T21:00:00+02:00",
                "2023-07-01T23:00:00+02:00",
            ),
        );
        let programs = VenetsiaParser::parse(&xml).unwrap().programs();
        assert_eq!(programs[0].title, "Elokuva: Tuntematon sotilas");
    }

    #[test]
    fn end_before_start_is_reanchored() {
        // End clock 01:00 with start clock 23:30: the printed end date is
        // wrong, the program runs into the next day.
        let xml = document(
            "yle1",
            &item(
                "Yöleffa",
                "",
                "2023-07-01T23:30:00+02:00",
                "2023-06-30T01:00:00+02:00",
            ),
        );
        let programs = VenetsiaParser::parse(&xml).unwrap().programs();

        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].start.to_rfc3339(), "2023-07-01T20:30:00+00:00");
        assert_eq!(programs[0].end.to_rfc3339(), "2023-07-01T22:00:00+00:00");
    }

    #[test]
    fn overlap_is_clamped_to_next_start() {
        let items = format!(
            "{}{}",
            item(
                "Pitkä ohjelma",
                "",
                "2023-07-01T12:00:00+02:00",
                "2023-07-01T14:00:00+02:00",
            ),
            item(
                "Seuraava",
                "",
                "2023-07-01T13:00:00+02:00",
                "2023-07-01T13:30:00+02:00",
            )
        );
        let programs = VenetsiaParser::parse(&document("yle1", &items))
            .unwrap()
            .programs();

        assert_eq!(programs.len(), 2);
        assert_eq!(programs[0].end, programs[1].start);
    }

    #[test]
    fn consecutive_duplicates_are_skipped() {
        let duplicated = item(
            "Uusinta",
            "Sama ohjelma.",
            "2023-07-01T15:00:00+02:00",
            "2023-07-01T16:00:00+02:00",
        );
        let items = format!("{duplicated}{duplicated}");
        let programs = VenetsiaParser::parse(&document("yle1", &items))
            .unwrap()
            .programs();

        assert_eq!(programs.len(), 1);
    }

    #[test]
    fn placeholder_items_are_skipped() {
        let items = format!(
            "{}{}",
            item(
                "YLE TEEMA",
                "",
                "2023-07-01T06:00:00+02:00",
                "2023-07-01T06:00:00+02:00",
            ),
            item(
                "Dokumentti",
                "Luontodokumentti.",
                "2023-07-01T18:00:00+02:00",
                "2023-07-01T19:00:00+02:00",
            )
        );
        let programs = VenetsiaParser::parse(&document("fsd", &items))
            .unwrap()
            .programs();

        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].title, "Dokumentti");
    }

    #[test]
    fn placeholder_title_is_real_on_other_channels() {
        let xml = document(
            "yle1",
            &item(
                "YLE TEEMA",
                "",
                "2023-07-01T06:00:00+02:00",
                "2023-07-01T07:00:00+02:00",
            ),
        );
        let programs = VenetsiaParser::parse(&xml).unwrap().programs();
        assert_eq!(programs.len(), 1);
    }

    #[test]
    fn episode_info_is_extracted_from_synopsis() {
        let xml = document(
            "yle1",
            &item(
                "Sarja",
                "Kausi 2, jakso 5/12. Jotain tapahtuu.",
                "2023-07-01T18:00:00+02:00",
                "2023-07-01T19:00:00+02:00",
            ),
        );
        let programs = VenetsiaParser::parse(&xml).unwrap().programs();

        assert_eq!(programs[0].season, 2);
        assert_eq!(programs[0].episode, 5);
        assert_eq!(programs[0].episode_count, 12);
    }

    #[test]
    fn unpack_extracts_only_xml_members() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("schedules.tar");

        let file = fs::File::create(&archive_path).unwrap();
        let mut builder = tar::Builder::new(file);

        let xml = b"<doc/>";
        let mut header = tar::Header::new_gnu();
        header.set_size(xml.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "day1.xml", &xml[..]).unwrap();

        let other = b"skip";
        let mut header = tar::Header::new_gnu();
        header.set_size(other.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "readme.txt", &other[..])
            .unwrap();
        builder.finish().unwrap();
        drop(builder);

        let (staging, documents) = unpack_documents(&archive_path).unwrap();
        assert_eq!(documents.len(), 1);
        assert!(staging.ends_with("schedules"));
        assert_eq!(fs::read_to_string(&documents[0]).unwrap(), "<doc/>");
    }

    #[test]
    fn missing_station_is_structural() {
        let xml = r#"<Transmission><ProgramTable><ProgramTableInformation>
            <StartDate>2023-07-01</StartDate><EndDate>2023-07-02</EndDate>
            </ProgramTableInformation></ProgramTable></Transmission>"#;
        assert!(matches!(
            VenetsiaParser::parse(xml),
            Err(ParseError::Structure { .. })
        ));
    }
}
