//! Per-guild settings.
//!
//! JSON settings file mapping guild id -> demographic role list, bot
//! exemption role and log target. Mutation goes through
//! `SettingsStore::update` so every change is persisted on the way
//! out; nothing holds the settings as process-wide mutable state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::snowflake::DEFAULT_EPOCH_MS;

/// Log target for operational notices (consumed by the presentation
/// layer, opaque here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogTarget {
    pub channel: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_role: Option<u64>,
}

/// Settings for one guild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    /// Ordered demographic classification roles; position i maps to
    /// bit i of the event demographic mask.
    #[serde(default)]
    pub demographics_roles: Vec<u64>,
    /// Bot authors holding this role are ingested anyway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_a_bot_role: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<LogTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Event store path.
    pub database: PathBuf,
    /// Id epoch offset (ms since unix epoch).
    #[serde(default = "default_epoch_ms")]
    pub epoch_ms: u64,
    /// Guild id -> settings. Events from guilds missing here are
    /// dropped at ingestion.
    #[serde(default)]
    pub guilds: HashMap<u64, GuildSettings>,
}

fn default_epoch_ms() -> u64 {
    DEFAULT_EPOCH_MS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: PathBuf::from("tally.db"),
            epoch_ms: DEFAULT_EPOCH_MS,
            guilds: HashMap::new(),
        }
    }
}

/// Settings plus the file they live in.
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Load settings from `path`, or start from defaults if the file
    /// does not exist yet.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let settings = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            Settings::default()
        };
        Ok(Self { path, settings })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn guild(&self, guild_id: u64) -> Option<&GuildSettings> {
        self.settings.guilds.get(&guild_id)
    }

    /// Apply a change and persist it before returning. The write
    /// happens whether or not the closure touched anything, so every
    /// exit path of a read-modify-write ends on disk.
    pub fn update<T>(&mut self, apply: impl FnOnce(&mut Settings) -> T) -> Result<T> {
        let out = apply(&mut self.settings);
        self.save()?;
        Ok(out)
    }

    fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.settings)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_starts_from_defaults() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::load(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.settings().epoch_ms, DEFAULT_EPOCH_MS);
        assert!(store.settings().guilds.is_empty());
    }

    #[test]
    fn test_update_persists_on_exit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut store = SettingsStore::load(&path).unwrap();
        store
            .update(|s| {
                s.guilds.insert(
                    7,
                    GuildSettings {
                        demographics_roles: vec![100, 101],
                        not_a_bot_role: Some(55),
                        logs: None,
                    },
                );
            })
            .unwrap();

        let reloaded = SettingsStore::load(&path).unwrap();
        let guild = reloaded.guild(7).unwrap();
        assert_eq!(guild.demographics_roles, vec![100, 101]);
        assert_eq!(guild.not_a_bot_role, Some(55));
    }
}
