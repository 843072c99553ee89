//! Compiled-command records as the bot keeps and persists them.
//!
//! A record is replaced whole on every change, so readers holding an
//! `Arc` keep a consistent view while a compile or toggle lands.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tagscript_lang::{CompileDiagnostic, MessageSnapshot, RunSettings, FORMAT_VERSION};

use crate::protocol::{CompileResponse, RunRequest};

// ─── Record ───────────────────────────────────────────────────────────────────

/// What storage keeps for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledCommand {
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub cst: Option<Vec<u8>>,
    #[serde(default)]
    pub errors: Vec<CompileDiagnostic>,
    pub enabled: bool,
    pub last_modified: DateTime<Utc>,
}

impl CompiledCommand {
    pub fn new(name: impl Into<String>, source: impl Into<String>, compiled: CompileResponse, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            cst: compiled.cst,
            errors: compiled.errors,
            enabled: true,
            last_modified: now,
        }
    }

    pub fn is_runnable(&self) -> bool {
        self.enabled && self.errors.is_empty() && self.cst.is_some()
    }

    /// The stored tree came from another codec version and should be
    /// recompiled from source.
    pub fn is_stale(&self) -> bool {
        self.cst.as_deref().and_then(|b| b.first()) != Some(&FORMAT_VERSION)
    }

    pub fn run_request(&self, message: MessageSnapshot, settings: RunSettings) -> RunRequest {
        let cst = if self.is_stale() { None } else { self.cst.clone() };
        RunRequest { id: self.name.clone(), code: self.source.clone(), cst, message, settings }
    }
}

// ─── Cache ────────────────────────────────────────────────────────────────────

/// Process-wide table of compiled commands, keyed by lowercase name.
#[derive(Default)]
pub struct CommandCache {
    commands: RwLock<HashMap<String, Arc<CompiledCommand>>>,
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

impl CommandCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fresh compile, or a record loaded from storage.
    pub fn insert(&self, command: CompiledCommand) -> Arc<CompiledCommand> {
        let command = Arc::new(command);
        tracing::debug!(name = %command.name, errors = command.errors.len(), "command cached");
        self.commands.write().insert(key(&command.name), command.clone());
        command
    }

    pub fn get(&self, name: &str) -> Option<Arc<CompiledCommand>> {
        self.commands.read().get(&key(name)).cloned()
    }

    /// The record to run for `name`, if it exists and may run.
    pub fn runnable(&self, name: &str) -> Option<Arc<CompiledCommand>> {
        self.get(name).filter(|c| c.is_runnable())
    }

    /// Toggle a command. `None` when there is no such command.
    pub fn set_enabled(&self, name: &str, enabled: bool, now: DateTime<Utc>) -> Option<Arc<CompiledCommand>> {
        let mut commands = self.commands.write();
        let slot = commands.get_mut(&key(name))?;
        if slot.enabled != enabled {
            let mut next = (**slot).clone();
            next.enabled = enabled;
            next.last_modified = now;
            *slot = Arc::new(next);
        }
        Some(slot.clone())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<CompiledCommand>> {
        self.commands.write().remove(&key(name))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.commands.read().values().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn compiled(cst: Option<Vec<u8>>, errors: usize) -> CompileResponse {
        let error = CompileDiagnostic {
            start_line_number: 1,
            start_column: 1,
            end_line_number: 1,
            end_column: 2,
            message: "unexpected token".into(),
        };
        CompileResponse { cst, errors: vec![error; errors] }
    }

    #[test]
    fn names_are_case_insensitive() {
        let cache = CommandCache::new();
        cache.insert(CompiledCommand::new("Ping", "reply 'pong'", compiled(Some(vec![FORMAT_VERSION]), 0), at(0)));
        assert_eq!(cache.get("PING").unwrap().source, "reply 'pong'");
        assert!(cache.runnable("ping").is_some());
        assert_eq!(cache.names(), vec!["Ping"]);
    }

    #[test]
    fn broken_and_disabled_commands_do_not_run() {
        let cache = CommandCache::new();
        cache.insert(CompiledCommand::new("bad", "reply (", compiled(None, 1), at(0)));
        cache.insert(CompiledCommand::new("off", "reply 1", compiled(Some(vec![FORMAT_VERSION]), 0), at(0)));
        cache.set_enabled("off", false, at(5));
        assert!(cache.runnable("bad").is_none());
        assert!(cache.runnable("off").is_none());
        assert!(cache.runnable("missing").is_none());
    }

    #[test]
    fn toggling_replaces_the_record() {
        let cache = CommandCache::new();
        let before = cache.insert(CompiledCommand::new("a", "reply 1", compiled(Some(vec![FORMAT_VERSION]), 0), at(0)));
        let after = cache.set_enabled("a", false, at(10)).unwrap();
        assert!(before.enabled);
        assert!(!after.enabled);
        assert_eq!(after.last_modified, at(10));

        let same = cache.set_enabled("a", false, at(20)).unwrap();
        assert_eq!(same.last_modified, at(10));
        assert!(cache.set_enabled("b", true, at(0)).is_none());
    }

    #[test]
    fn stale_trees_are_not_sent() {
        let old = CompiledCommand::new("a", "reply 1", compiled(Some(vec![0, 1, 2]), 0), at(0));
        assert!(old.is_stale());
        let request = old.run_request(MessageSnapshot::default(), RunSettings::default());
        assert!(request.cst.is_none());
        assert_eq!(request.code, "reply 1");
    }

    #[test]
    fn records_persist_as_camel_case() {
        let cmd = CompiledCommand::new("a", "reply 1", compiled(None, 0), at(0));
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["lastModified"], "1970-01-01T00:00:00Z");
        assert_eq!(json["enabled"], true);
        let back: CompiledCommand = serde_json::from_value(json).unwrap();
        assert_eq!(back, cmd);
    }
}
