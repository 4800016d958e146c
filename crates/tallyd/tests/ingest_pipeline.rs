//! Ingestion pipeline: JSONL feed through normalization to the store.

use tempfile::tempdir;

use tally_common::config::{GuildSettings, SettingsStore};
use tally_common::snowflake::{timestamp_ms_to_id, DEFAULT_EPOCH_MS};
use tallyd::store::{EventFilter, EventStore};
use tallyd::{ingest, store::GroupBy};

fn raw_line(id: u64, guild: u64, channel: u64, extra: &str) -> String {
    format!(
        r#"{{"id":{id},"guild_id":{guild},"channel_id":{channel},"content":"hi there"{extra}}}"#
    )
}

#[tokio::test]
async fn feed_lands_in_the_store() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("events.db");

    let mut settings = SettingsStore::load(dir.path().join("settings.json")).unwrap();
    settings
        .update(|s| {
            s.database = db_path.clone();
            s.guilds.insert(
                1,
                GuildSettings {
                    demographics_roles: vec![100],
                    not_a_bot_role: Some(55),
                    logs: None,
                },
            );
        })
        .unwrap();

    let base = timestamp_ms_to_id(1_700_000_000_000, DEFAULT_EPOCH_MS);
    let feed = [
        raw_line(base, 1, 42, ""),
        // Thread message: recorded under the parent channel.
        raw_line(base + 1, 1, 900, r#","parent_channel_id":42"#),
        // Bot without the exemption role: dropped.
        raw_line(base + 2, 1, 42, r#","author_is_bot":true"#),
        // Exempt bot: kept.
        raw_line(
            base + 3,
            1,
            42,
            r#","author_is_bot":true,"author_role_ids":[55]"#,
        ),
        // Unconfigured guild: dropped.
        raw_line(base + 4, 99, 42, ""),
        "not json at all".to_string(),
        raw_line(base + 5, 1, 43, ""),
    ]
    .join("\n");

    let writer_store = EventStore::open_at(&db_path, DEFAULT_EPOCH_MS).unwrap();
    let (tx, writer) = ingest::spawn_writer(writer_store);
    let reader = tokio::io::BufReader::new(feed.as_bytes());
    let forwarded = ingest::run(reader, &settings, tx).await.unwrap();
    writer.await.unwrap();

    assert_eq!(forwarded, 4);

    let store = EventStore::open_readonly(&db_path, DEFAULT_EPOCH_MS).unwrap();
    assert_eq!(store.total_events().unwrap(), 4);
    // The thread message counts under its parent, not the thread id.
    assert_eq!(store.count_since(0, &EventFilter::channel(42)).unwrap(), 3);
    assert_eq!(store.count_since(0, &EventFilter::channel(900)).unwrap(), 0);

    let groups = store
        .count_grouped_since(0, GroupBy::Channel, &EventFilter::default())
        .unwrap();
    assert_eq!(groups.len(), 2);
}

#[tokio::test]
async fn duplicate_append_does_not_stop_the_loop() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("events.db");

    let mut settings = SettingsStore::load(dir.path().join("settings.json")).unwrap();
    settings
        .update(|s| {
            s.database = db_path.clone();
            s.guilds.insert(1, GuildSettings::default());
        })
        .unwrap();

    let base = timestamp_ms_to_id(1_700_000_000_000, DEFAULT_EPOCH_MS);
    // Same id twice: the second append fails and is dropped, the
    // third event still lands.
    let feed = [
        raw_line(base, 1, 42, ""),
        raw_line(base, 1, 42, ""),
        raw_line(base + 1, 1, 42, ""),
    ]
    .join("\n");

    let writer_store = EventStore::open_at(&db_path, DEFAULT_EPOCH_MS).unwrap();
    let (tx, writer) = ingest::spawn_writer(writer_store);
    let reader = tokio::io::BufReader::new(feed.as_bytes());
    ingest::run(reader, &settings, tx).await.unwrap();
    writer.await.unwrap();

    let store = EventStore::open_readonly(&db_path, DEFAULT_EPOCH_MS).unwrap();
    assert_eq!(store.total_events().unwrap(), 2);
}
