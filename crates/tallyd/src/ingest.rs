//! Ingestion pipeline.
//!
//! Normalizes raw messages into event records and feeds them to a
//! single writer task that owns the store. One failed append drops
//! that event only; the loop keeps going.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tally_common::config::{GuildSettings, SettingsStore};
use tally_common::snowflake;
use tally_common::{Event, RawMessage};

use crate::store::EventStore;

/// Normalize one raw message, or drop it per the guild's rules.
///
/// Thread messages are recorded under their parent channel with the
/// thread id kept alongside. Bot authors are dropped unless they hold
/// the guild's exemption role.
pub fn normalize(msg: &RawMessage, guild: &GuildSettings, epoch_ms: u64) -> Option<Event> {
    if msg.author_is_bot {
        let exempt = guild
            .not_a_bot_role
            .is_some_and(|role| msg.author_role_ids.contains(&role));
        if !exempt {
            return None;
        }
    }

    let (channel_id, thread_id) = match msg.parent_channel_id {
        Some(parent) => (parent, Some(msg.channel_id)),
        None => (msg.channel_id, None),
    };

    let event_ms = snowflake::id_to_timestamp_ms(msg.id, epoch_ms);
    let actor_tenure_hours = msg
        .author_joined_at_ms
        .map(|joined| (event_ms.saturating_sub(joined) / 3_600_000) as u32);

    let mut mask: u64 = 0;
    for (i, role) in guild.demographics_roles.iter().enumerate() {
        if msg.author_role_ids.contains(role) {
            mask |= 1 << i;
        }
    }

    Some(Event {
        id: msg.id,
        guild_id: msg.guild_id,
        channel_id,
        category_id: msg.category_id,
        thread_id,
        content_length: msg.content.chars().count() as u32,
        content_word_count: msg.content.split_whitespace().count() as u32,
        has_attachment: msg.attachment_count > 0,
        actor_tenure_hours,
        actor_demographic_mask: mask,
    })
}

/// Spawn the writer task owning the store. Appends run on a blocking
/// thread so a slow disk write never stalls the async side.
pub fn spawn_writer(store: EventStore) -> (mpsc::Sender<Event>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Event>(1024);
    let handle = tokio::task::spawn_blocking(move || {
        while let Some(event) = rx.blocking_recv() {
            if let Err(err) = store.append(&event) {
                warn!(event_id = event.id, error = %err, "append failed, event dropped");
            }
        }
    });
    (tx, handle)
}

/// Read JSONL raw messages from `input`, normalize and forward them
/// to the writer. Malformed lines and unconfigured guilds are skipped.
pub async fn run<R>(
    input: R,
    settings: &SettingsStore,
    tx: mpsc::Sender<Event>,
) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let epoch_ms = settings.settings().epoch_ms;
    let mut lines = input.lines();
    let mut forwarded = 0u64;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let msg: RawMessage = match serde_json::from_str(&line) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(error = %err, "malformed event line skipped");
                continue;
            }
        };

        let Some(guild) = settings.guild(msg.guild_id) else {
            debug!(guild_id = msg.guild_id, "unconfigured guild, event dropped");
            continue;
        };

        if let Some(event) = normalize(&msg, guild, epoch_ms) {
            if tx.send(event).await.is_err() {
                // Writer gone; nothing more to do.
                break;
            }
            forwarded += 1;
        }
    }

    Ok(forwarded)
}
