//! SQLite-backed event store.
//!
//! Append-only log of activity events. The event id is the primary
//! key and embeds the event timestamp, so every time-windowed query
//! is an `event_id >= boundary` range scan over the primary index --
//! no separate time column needed.
//!
//! WAL mode gives append-while-reading consistency: reads see a
//! snapshot including every append that completed before the query
//! started.

use std::path::Path;
use std::time::Instant;

use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use tracing::debug;

use tally_common::error::{Result, TallyError};
use tally_common::Event;

/// Equality filter over event dimensions; `None` means unfiltered.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFilter {
    pub guild_id: Option<u64>,
    pub channel_id: Option<u64>,
    pub category_id: Option<u64>,
}

impl EventFilter {
    pub fn guild(guild_id: u64) -> Self {
        Self {
            guild_id: Some(guild_id),
            ..Self::default()
        }
    }

    pub fn channel(channel_id: u64) -> Self {
        Self {
            channel_id: Some(channel_id),
            ..Self::default()
        }
    }

    pub fn category(category_id: u64) -> Self {
        Self {
            category_id: Some(category_id),
            ..Self::default()
        }
    }
}

/// Grouping dimension for `count_grouped_since`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Channel,
    Category,
    /// UTC calendar day derived from the event id.
    Day,
}

/// Key of one group in a grouped count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    Entity(u64),
    Day(NaiveDate),
}

/// SQLite-backed append-only event log.
pub struct EventStore {
    conn: Connection,
    epoch_ms: u64,
}

impl EventStore {
    /// Open or create the store at `path` (for the ingestion daemon).
    pub fn open_at<P: AsRef<Path>>(path: P, epoch_ms: u64) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(TallyError::StoreOpen)?;

        // WAL so queries never block the single writer.
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(TallyError::StoreOpen)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                event_id INTEGER PRIMARY KEY,
                guild_id INTEGER NOT NULL,
                channel_id INTEGER NOT NULL,
                category_id INTEGER,
                thread_id INTEGER,
                content_length INTEGER NOT NULL,
                content_words INTEGER NOT NULL,
                has_attachment INTEGER NOT NULL,
                actor_tenure_hours INTEGER,
                actor_demographic INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_guild ON events(guild_id, event_id);
            CREATE INDEX IF NOT EXISTS idx_events_channel ON events(channel_id, event_id);
            CREATE INDEX IF NOT EXISTS idx_events_category ON events(category_id, event_id);
            "#,
        )
        .map_err(TallyError::StoreOpen)?;

        Ok(Self { conn, epoch_ms })
    }

    /// Open read-only (for query runs against a live daemon's store).
    pub fn open_readonly<P: AsRef<Path>>(path: P, epoch_ms: u64) -> Result<Self> {
        let conn = Connection::open_with_flags(path.as_ref(), OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(TallyError::StoreOpen)?;
        Ok(Self { conn, epoch_ms })
    }

    pub fn epoch_ms(&self) -> u64 {
        self.epoch_ms
    }

    /// Durably persist one event. A failure loses only this event;
    /// retry is the event source's concern.
    pub fn append(&self, event: &Event) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO events
                 (event_id, guild_id, channel_id, category_id, thread_id, content_length,
                  content_words, has_attachment, actor_tenure_hours, actor_demographic)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    event.id as i64,
                    event.guild_id as i64,
                    event.channel_id as i64,
                    event.category_id.map(|v| v as i64),
                    event.thread_id.map(|v| v as i64),
                    event.content_length,
                    event.content_word_count,
                    event.has_attachment,
                    event.actor_tenure_hours,
                    event.actor_demographic_mask as i64,
                ],
            )
            .map_err(TallyError::StoreWrite)?;
        Ok(())
    }

    /// Append many events in one transaction (fixtures, backfill).
    pub fn append_batch(&self, events: &[Event]) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(TallyError::StoreWrite)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO events
                     (event_id, guild_id, channel_id, category_id, thread_id, content_length,
                      content_words, has_attachment, actor_tenure_hours, actor_demographic)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )
                .map_err(TallyError::StoreWrite)?;
            for event in events {
                stmt.execute(params![
                    event.id as i64,
                    event.guild_id as i64,
                    event.channel_id as i64,
                    event.category_id.map(|v| v as i64),
                    event.thread_id.map(|v| v as i64),
                    event.content_length,
                    event.content_word_count,
                    event.has_attachment,
                    event.actor_tenure_hours,
                    event.actor_demographic_mask as i64,
                ])
                .map_err(TallyError::StoreWrite)?;
            }
        }
        tx.commit().map_err(TallyError::StoreWrite)?;
        Ok(())
    }

    /// Count events with `id >= boundary` matching `filter`.
    pub fn count_since(&self, boundary: u64, filter: &EventFilter) -> Result<u64> {
        let (clause, mut args) = Self::filter_sql(filter);
        let sql = format!("SELECT COUNT(*) FROM events WHERE event_id >= ?1{clause}");
        args.insert(0, boundary as i64);

        let started = Instant::now();
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(args), |row| row.get(0))
            .map_err(TallyError::StoreRead)?;
        debug!(elapsed = ?started.elapsed(), %sql, "count_since");

        Ok(count as u64)
    }

    /// Count events per group for one dimension. Key order is
    /// whatever SQLite returns; callers sort.
    pub fn count_grouped_since(
        &self,
        boundary: u64,
        group_by: GroupBy,
        filter: &EventFilter,
    ) -> Result<Vec<(GroupKey, u64)>> {
        let key_expr = match group_by {
            GroupBy::Channel => "channel_id".to_string(),
            GroupBy::Category => "category_id".to_string(),
            GroupBy::Day => self.day_expr(),
        };
        // Events without a category do not form a NULL group.
        let null_guard = match group_by {
            GroupBy::Category => " AND category_id IS NOT NULL",
            _ => "",
        };
        let (clause, mut args) = Self::filter_sql(filter);
        let sql = format!(
            "SELECT {key_expr} AS grp, COUNT(*) FROM events
             WHERE event_id >= ?1{null_guard}{clause}
             GROUP BY grp"
        );
        args.insert(0, boundary as i64);

        let started = Instant::now();
        let mut stmt = self.conn.prepare(&sql).map_err(TallyError::StoreRead)?;
        let rows = stmt
            .query_map(params_from_iter(args), |row| {
                let key = match group_by {
                    GroupBy::Channel | GroupBy::Category => {
                        GroupKey::Entity(row.get::<_, i64>(0)? as u64)
                    }
                    GroupBy::Day => GroupKey::Day(row.get(0)?),
                };
                Ok((key, row.get::<_, i64>(1)? as u64))
            })
            .map_err(TallyError::StoreRead)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(TallyError::StoreRead)?);
        }
        debug!(elapsed = ?started.elapsed(), %sql, "count_grouped_since");

        Ok(results)
    }

    /// Per-UTC-day counts for one channel, ascending by event id and
    /// therefore by date.
    pub fn daily_series_since(
        &self,
        boundary: u64,
        channel_id: u64,
    ) -> Result<Vec<(NaiveDate, u64)>> {
        let sql = format!(
            "SELECT {day} AS day, COUNT(event_id) FROM events
             WHERE channel_id = ?1 AND event_id >= ?2
             GROUP BY day
             ORDER BY MIN(event_id)",
            day = self.day_expr()
        );

        let started = Instant::now();
        let mut stmt = self.conn.prepare(&sql).map_err(TallyError::StoreRead)?;
        let rows = stmt
            .query_map(params![channel_id as i64, boundary as i64], |row| {
                Ok((row.get::<_, NaiveDate>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(TallyError::StoreRead)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(TallyError::StoreRead)?);
        }
        debug!(elapsed = ?started.elapsed(), %sql, "daily_series_since");

        Ok(results)
    }

    /// Total events ever appended.
    pub fn total_events(&self) -> Result<u64> {
        self.count_since(0, &EventFilter::default())
    }

    /// SQL expression decoding an event id to its UTC calendar day.
    fn day_expr(&self) -> String {
        format!(
            "date((event_id >> 22) / 1000 + {}, 'unixepoch')",
            self.epoch_ms / 1000
        )
    }

    /// WHERE-clause tail and arguments for an equality filter.
    /// Placeholders continue from ?2 (?1 is the boundary).
    fn filter_sql(filter: &EventFilter) -> (String, Vec<i64>) {
        let mut clause = String::new();
        let mut args = Vec::new();
        for (column, value) in [
            ("guild_id", filter.guild_id),
            ("channel_id", filter.channel_id),
            ("category_id", filter.category_id),
        ] {
            if let Some(value) = value {
                args.push(value as i64);
                clause.push_str(&format!(" AND {} = ?{}", column, args.len() + 1));
            }
        }
        (clause, args)
    }
}
