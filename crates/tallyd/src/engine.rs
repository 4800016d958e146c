//! Aggregation engine.
//!
//! Orchestration only: parse the window expression, run the matching
//! store query, format result lines. Rendering and transport stay
//! with the caller.

use chrono::{DateTime, NaiveDate, Utc};

use tally_common::error::Result;
use tally_common::window::WindowParser;

use crate::store::{EventFilter, EventStore, GroupBy, GroupKey};

/// Window the daily series always covers, independent of any
/// caller-supplied expression.
const SERIES_WINDOW: &str = "1 month";

/// An entity to rank: id plus the label to print for it.
#[derive(Debug, Clone)]
pub struct ChannelRef {
    pub id: u64,
    pub label: String,
}

/// Outcome of a ranked group query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankReport {
    /// No entities matched the selection; no store query was run.
    Empty,
    /// Report lines, descending by count. Ties keep input order.
    Ranked(Vec<String>),
}

pub struct AggregationEngine<'a> {
    store: &'a EventStore,
    parser: WindowParser,
}

impl<'a> AggregationEngine<'a> {
    pub fn new(store: &'a EventStore) -> Self {
        Self {
            store,
            parser: WindowParser::new(store.epoch_ms()),
        }
    }

    /// Scalar guild activity: `<label>: <count> messages`.
    pub fn guild_total(
        &self,
        window: &str,
        now: DateTime<Utc>,
        guild_id: u64,
        label: &str,
    ) -> Result<String> {
        let boundary = self.parser.parse(window, now)?;
        let count = self.store.count_since(boundary, &EventFilter::guild(guild_id))?;
        Ok(format!("{label}: {count} messages"))
    }

    /// Rank a supplied set of channels by message volume.
    pub fn rank_channels(
        &self,
        window: &str,
        now: DateTime<Utc>,
        channels: &[ChannelRef],
    ) -> Result<RankReport> {
        if channels.is_empty() {
            return Ok(RankReport::Empty);
        }

        let boundary = self.parser.parse(window, now)?;
        let mut counts = Vec::with_capacity(channels.len());
        for channel in channels {
            let count = self
                .store
                .count_since(boundary, &EventFilter::channel(channel.id))?;
            counts.push((channel.label.clone(), count));
        }

        Ok(RankReport::Ranked(render_ranked(counts)))
    }

    /// Rank the channels that have activity under one category.
    pub fn rank_category(
        &self,
        window: &str,
        now: DateTime<Utc>,
        category_id: u64,
    ) -> Result<RankReport> {
        let boundary = self.parser.parse(window, now)?;
        let groups = self.store.count_grouped_since(
            boundary,
            GroupBy::Channel,
            &EventFilter::category(category_id),
        )?;

        if groups.is_empty() {
            return Ok(RankReport::Empty);
        }

        let counts = groups
            .into_iter()
            .map(|(key, count)| {
                let label = match key {
                    GroupKey::Entity(id) => format!("<#{id}>"),
                    GroupKey::Day(day) => day.to_string(),
                };
                (label, count)
            })
            .collect();

        Ok(RankReport::Ranked(render_ranked(counts)))
    }

    /// Daily (date, count) series for one channel over the fixed
    /// recent window. The caller renders; this only produces data.
    pub fn daily_series(
        &self,
        now: DateTime<Utc>,
        channel_id: u64,
    ) -> Result<Vec<(NaiveDate, u64)>> {
        let boundary = self.parser.parse(SERIES_WINDOW, now)?;
        self.store.daily_series_since(boundary, channel_id)
    }
}

/// Sort descending by count and render report lines. `sort_by` is
/// stable, so tied entities keep their incoming order.
fn render_ranked(mut counts: Vec<(String, u64)>) -> Vec<String> {
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .map(|(label, count)| format!("{label}: {count} messages"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tally_common::snowflake::{timestamp_ms_to_id, DEFAULT_EPOCH_MS};
    use tally_common::Event;
    use tempfile::NamedTempFile;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 11, 20, 12, 0, 0).unwrap()
    }

    fn seed_channel(store: &EventStore, channel: u64, count: u64, ts_ms: u64) {
        let events: Vec<Event> = (0..count)
            .map(|seq| Event {
                id: timestamp_ms_to_id(ts_ms, DEFAULT_EPOCH_MS) + (channel << 8) + seq,
                guild_id: 1,
                channel_id: channel,
                category_id: None,
                thread_id: None,
                content_length: 1,
                content_word_count: 1,
                has_attachment: false,
                actor_tenure_hours: None,
                actor_demographic_mask: 0,
            })
            .collect();
        store.append_batch(&events).unwrap();
    }

    #[test]
    fn test_scalar_count_format() {
        let tmp = NamedTempFile::new().unwrap();
        let store = EventStore::open_at(tmp.path(), DEFAULT_EPOCH_MS).unwrap();
        seed_channel(&store, 42, 3, 1_700_000_000_000);

        let engine = AggregationEngine::new(&store);
        let line = engine.guild_total("all", now(), 1, "testguild").unwrap();
        assert_eq!(line, "testguild: 3 messages");
    }

    #[test]
    fn test_ranked_ties_keep_input_order() {
        let tmp = NamedTempFile::new().unwrap();
        let store = EventStore::open_at(tmp.path(), DEFAULT_EPOCH_MS).unwrap();
        seed_channel(&store, 1, 5, 1_700_000_000_000);
        seed_channel(&store, 2, 9, 1_700_000_000_000);
        seed_channel(&store, 3, 9, 1_700_000_000_000);

        let channels: Vec<ChannelRef> = [(1, "A"), (2, "B"), (3, "C")]
            .into_iter()
            .map(|(id, label)| ChannelRef {
                id,
                label: label.to_string(),
            })
            .collect();

        let engine = AggregationEngine::new(&store);
        let report = engine.rank_channels("all", now(), &channels).unwrap();
        assert_eq!(
            report,
            RankReport::Ranked(vec![
                "B: 9 messages".to_string(),
                "C: 9 messages".to_string(),
                "A: 5 messages".to_string(),
            ])
        );
    }

    #[test]
    fn test_empty_selection_short_circuits() {
        let tmp = NamedTempFile::new().unwrap();
        let store = EventStore::open_at(tmp.path(), DEFAULT_EPOCH_MS).unwrap();
        let engine = AggregationEngine::new(&store);

        // A window that would not even parse against an empty store
        // is irrelevant: no store query runs for an empty selection.
        let report = engine.rank_channels("all", now(), &[]).unwrap();
        assert_eq!(report, RankReport::Empty);
    }

    #[test]
    fn test_category_rank_empty_when_nothing_matches() {
        let tmp = NamedTempFile::new().unwrap();
        let store = EventStore::open_at(tmp.path(), DEFAULT_EPOCH_MS).unwrap();
        seed_channel(&store, 42, 2, 1_700_000_000_000);

        let engine = AggregationEngine::new(&store);
        let report = engine.rank_category("all", now(), 999).unwrap();
        assert_eq!(report, RankReport::Empty);
    }

    #[test]
    fn test_window_excludes_old_events() {
        let tmp = NamedTempFile::new().unwrap();
        let store = EventStore::open_at(tmp.path(), DEFAULT_EPOCH_MS).unwrap();
        // Ten days before `now`, then one hour before `now`.
        seed_channel(&store, 42, 4, 1_699_600_000_000);
        seed_channel(&store, 43, 2, now().timestamp_millis() as u64 - 3_600_000);

        let engine = AggregationEngine::new(&store);
        let line = engine.guild_total("2d", now(), 1, "g").unwrap();
        assert_eq!(line, "g: 2 messages");
    }
}
