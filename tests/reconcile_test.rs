//! Integration tests for the persistence path: channel registry, window
//! deletes and chunked duplicate-tolerant inserts.

use chrono::{DateTime, Duration, Utc};

use epg_importer::config::DatabaseConfig;
use epg_importer::database::Database;
use epg_importer::ingestor::persist::Reconciler;
use epg_importer::ingestor::registry::ChannelRegistry;
use epg_importer::models::{CoverageWindow, ImportedProgram};

async fn test_db() -> Database {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
    };
    let db = Database::new(&config).await.unwrap();
    db.migrate().await.unwrap();
    db
}

fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .unwrap()
        .with_timezone(&Utc)
}

fn program(title: &str, start: &str, end: &str) -> ImportedProgram {
    ImportedProgram::new(
        title.to_string(),
        format!("{title} description"),
        at(start),
        at(end),
    )
}

#[tokio::test]
async fn registry_creates_channel_once() {
    let db = test_db().await;
    let mut registry = ChannelRegistry::load(&db).await.unwrap();

    let (id, created) = registry
        .ensure(&db, "venetsia.yle1", "Yle TV1")
        .await
        .unwrap();
    assert!(created);

    let (again, created) = registry
        .ensure(&db, "venetsia.yle1", "Yle TV1")
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(id, again);

    // A freshly loaded registry sees the stored row.
    let reloaded = ChannelRegistry::load(&db).await.unwrap();
    assert!(reloaded.contains("venetsia.yle1"));
}

#[tokio::test]
async fn new_channels_start_hidden() {
    let db = test_db().await;
    let mut registry = ChannelRegistry::load(&db).await.unwrap();
    registry
        .ensure(&db, "eurosport.1", "Eurosport 1")
        .await
        .unwrap();

    let channels = db.channels().all_by_origin_id().await.unwrap();
    let channel = channels.get("eurosport.1").unwrap();
    assert!(!channel.is_visible);
    assert_eq!(channel.position, 255);
    assert_eq!(channel.slug, "eurosport-1");
}

#[tokio::test]
async fn reimporting_same_window_is_idempotent() {
    let db = test_db().await;
    let mut registry = ChannelRegistry::load(&db).await.unwrap();
    let (channel_id, _) = registry.ensure(&db, "test.ch", "Test").await.unwrap();

    let window = CoverageWindow::new(
        at("2023-06-01T00:00:00Z"),
        at("2023-06-02T00:00:00Z"),
    );
    let programs = vec![
        program("Morning Show", "2023-06-01T06:00:00Z", "2023-06-01T08:00:00Z"),
        program("News", "2023-06-01T08:00:00Z", "2023-06-01T08:30:00Z"),
    ];

    let reconciler = Reconciler::new(&db);
    let first = reconciler
        .reconcile(channel_id, &window, &programs)
        .await
        .unwrap();
    assert_eq!(first, 2);

    let second = reconciler
        .reconcile(channel_id, &window, &programs)
        .await
        .unwrap();
    assert_eq!(second, 2);

    let stored = db.programs().by_channel(channel_id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].title, "Morning Show");
}

#[tokio::test]
async fn reconcile_only_touches_the_window() {
    let db = test_db().await;
    let mut registry = ChannelRegistry::load(&db).await.unwrap();
    let (channel_id, _) = registry.ensure(&db, "test.ch", "Test").await.unwrap();
    let reconciler = Reconciler::new(&db);

    let day1 = CoverageWindow::new(at("2023-06-01T00:00:00Z"), at("2023-06-01T23:59:59Z"));
    let day2 = CoverageWindow::new(at("2023-06-02T00:00:00Z"), at("2023-06-02T23:59:59Z"));

    reconciler
        .reconcile(
            channel_id,
            &day1,
            &[program("Day One", "2023-06-01T10:00:00Z", "2023-06-01T11:00:00Z")],
        )
        .await
        .unwrap();
    reconciler
        .reconcile(
            channel_id,
            &day2,
            &[program("Day Two", "2023-06-02T10:00:00Z", "2023-06-02T11:00:00Z")],
        )
        .await
        .unwrap();

    // Re-import day two with different content; day one must survive.
    reconciler
        .reconcile(
            channel_id,
            &day2,
            &[program("Day Two Revised", "2023-06-02T12:00:00Z", "2023-06-02T13:00:00Z")],
        )
        .await
        .unwrap();

    let stored = db.programs().by_channel(channel_id).await.unwrap();
    let titles: Vec<&str> = stored.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Day One", "Day Two Revised"]);
}

#[tokio::test]
async fn duplicate_rows_are_ignored_and_not_counted() {
    let db = test_db().await;
    let mut registry = ChannelRegistry::load(&db).await.unwrap();
    let (channel_id, _) = registry.ensure(&db, "test.ch", "Test").await.unwrap();

    let duplicated = program("Rerun", "2023-06-01T10:00:00Z", "2023-06-01T11:00:00Z");
    let inserted = db
        .programs()
        .add_from_import(channel_id, &[duplicated.clone(), duplicated])
        .await
        .unwrap();

    assert_eq!(inserted, 1);
    assert_eq!(db.programs().by_channel(channel_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn inverted_intervals_are_dropped() {
    let db = test_db().await;
    let mut registry = ChannelRegistry::load(&db).await.unwrap();
    let (channel_id, _) = registry.ensure(&db, "test.ch", "Test").await.unwrap();

    let window = CoverageWindow::new(at("2023-06-01T00:00:00Z"), at("2023-06-02T00:00:00Z"));
    let programs = vec![
        program("Valid", "2023-06-01T10:00:00Z", "2023-06-01T11:00:00Z"),
        // End precedes start; the reconciler must not persist it.
        program("Broken", "2023-06-01T12:00:00Z", "2023-06-01T11:30:00Z"),
        // Zero duration is dropped too.
        program("Empty", "2023-06-01T13:00:00Z", "2023-06-01T13:00:00Z"),
    ];

    let inserted = Reconciler::new(&db)
        .reconcile(channel_id, &window, &programs)
        .await
        .unwrap();

    assert_eq!(inserted, 1);
    let stored = db.programs().by_channel(channel_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].title, "Valid");
}

#[tokio::test]
async fn bulk_insert_survives_chunking() {
    let db = test_db().await;
    let mut registry = ChannelRegistry::load(&db).await.unwrap();
    let (channel_id, _) = registry.ensure(&db, "test.ch", "Test").await.unwrap();

    // Enough rows to span several insert chunks.
    let base = at("2023-06-01T00:00:00Z");
    let programs: Vec<ImportedProgram> = (0..10_000)
        .map(|i| {
            let start = base + Duration::minutes(i);
            ImportedProgram::new(
                format!("Program {i}"),
                String::new(),
                start,
                start + Duration::minutes(1),
            )
        })
        .collect();

    let inserted = db
        .programs()
        .add_from_import(channel_id, &programs)
        .await
        .unwrap();

    assert_eq!(inserted, 10_000);
    assert_eq!(
        db.programs().by_channel(channel_id).await.unwrap().len(),
        10_000
    );
}

#[tokio::test]
async fn stored_times_round_trip_as_utc() {
    let db = test_db().await;
    let mut registry = ChannelRegistry::load(&db).await.unwrap();
    let (channel_id, _) = registry.ensure(&db, "test.ch", "Test").await.unwrap();

    let mut entry = program("Timed", "2023-06-01T10:00:00Z", "2023-06-01T11:00:00Z");
    entry.season = 2;
    entry.episode = 5;
    entry.episode_count = 12;

    db.programs()
        .add_from_import(channel_id, &[entry])
        .await
        .unwrap();

    let stored = db.programs().by_channel(channel_id).await.unwrap();
    assert_eq!(stored[0].start_time, at("2023-06-01T10:00:00Z"));
    assert_eq!(stored[0].end_time, at("2023-06-01T11:00:00Z"));
    assert_eq!(stored[0].season, 2);
    assert_eq!(stored[0].episode, 5);
    assert_eq!(stored[0].episodes, 12);
}
