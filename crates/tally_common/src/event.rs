//! Activity event records.
//!
//! `RawMessage` is the shape delivered by the external event source;
//! `Event` is the normalized, immutable record the store persists.

use serde::{Deserialize, Serialize};

/// One normalized activity event. Created once at ingestion, never
/// mutated or deleted by this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Snowflake-style id; strictly increasing with creation time.
    pub id: u64,
    /// Owning community.
    pub guild_id: u64,
    /// Top-level channel. For thread events this is the parent.
    pub channel_id: u64,
    /// Optional grouping above channel level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<u64>,
    /// Present only for events inside a threaded sub-conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<u64>,
    /// Characters in the payload.
    pub content_length: u32,
    /// Whitespace-delimited tokens; 0 for empty content.
    pub content_word_count: u32,
    /// True if the event carried at least one attachment.
    pub has_attachment: bool,
    /// Hours between the actor's join time and the event; absent if
    /// the join time is unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_tenure_hours: Option<u32>,
    /// Bit i set when the actor held the guild's i-th configured
    /// demographic role at event time.
    pub actor_demographic_mask: u64,
}

/// Raw message as delivered by the event source, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: u64,
    pub guild_id: u64,
    /// Channel (or thread) the message was posted in.
    pub channel_id: u64,
    /// Set when `channel_id` is a thread; holds the thread's parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_channel_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<u64>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachment_count: u32,
    #[serde(default)]
    pub author_is_bot: bool,
    #[serde(default)]
    pub author_role_ids: Vec<u64>,
    /// Unix ms the author joined the guild, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_joined_at_ms: Option<u64>,
}
