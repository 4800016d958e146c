//! Time-window expression parser.
//!
//! Turns text like `3d12h` or `all` into an id boundary: the minimal
//! event id such that every event with `id >= boundary` falls inside
//! the requested window. Each unit is matched independently against
//! the whole expression and at most one match per unit is honored;
//! unrecognized text contributes nothing, so a typo yields an empty
//! window (boundary == now) rather than an error.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, TallyError};
use crate::snowflake;

// Unit patterns. The minutes and seconds alternations also match a
// bare `m`/`s` after digits, so `3mo` adds 3 minutes on top of the
// months match. Compatibility behavior, kept as-is.
static MONTHS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) ?mo(nths?)?").unwrap());
static WEEKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) ?w(eeks?)?").unwrap());
static DAYS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) ?d(ays?)?").unwrap());
static HOURS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) ?h(ours?)?").unwrap());
static MINUTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) ?m((inutes?)?|(ins?)?)?").unwrap());
static SECONDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) ?s((econds?)?|(ecs?)?)?").unwrap());

/// Parses window expressions against a configured id epoch.
#[derive(Debug, Clone, Copy)]
pub struct WindowParser {
    epoch_ms: u64,
}

impl WindowParser {
    pub fn new(epoch_ms: u64) -> Self {
        Self { epoch_ms }
    }

    /// Parse `expr` into an id boundary relative to `now`.
    ///
    /// `all` is unbounded (boundary 0). Fails only if the window
    /// would start after `now`.
    pub fn parse(&self, expr: &str, now: DateTime<Utc>) -> Result<u64> {
        if expr == "all" {
            return Ok(0);
        }

        let total_ms = Self::total_duration_ms(expr);
        let now_ms = now.timestamp_millis().max(0) as u64;
        let start_ms = now_ms.saturating_sub(total_ms);
        if start_ms > now_ms {
            return Err(TallyError::InvalidWindow(expr.to_string()));
        }

        Ok(snowflake::timestamp_ms_to_id(start_ms, self.epoch_ms))
    }

    /// Sum every matched unit into one duration. Months are a flat
    /// 28 days, not calendar months.
    fn total_duration_ms(expr: &str) -> u64 {
        let units: [(&Regex, u64); 6] = [
            (&*MONTHS, 28 * 24 * 3600),
            (&*WEEKS, 7 * 24 * 3600),
            (&*DAYS, 24 * 3600),
            (&*HOURS, 3600),
            (&*MINUTES, 60),
            (&*SECONDS, 1),
        ];

        let mut secs: u64 = 0;
        for (re, unit_secs) in units {
            let magnitude = re
                .captures(expr)
                .and_then(|c| c[1].parse::<u64>().ok())
                .unwrap_or(0);
            secs = secs.saturating_add(magnitude.saturating_mul(unit_secs));
        }
        secs.saturating_mul(1000)
    }
}
