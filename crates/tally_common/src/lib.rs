//! Tally Common - Shared types for the activity stats daemon.
//!
//! Pure core: the id/timestamp mapping, the time-window expression
//! parser, the report chunker, the event record and per-guild settings.
//! Storage and aggregation live in `tallyd`.

pub mod chunker;
pub mod config;
pub mod error;
pub mod event;
pub mod snowflake;
pub mod window;

pub use error::TallyError;
pub use event::{Event, RawMessage};
