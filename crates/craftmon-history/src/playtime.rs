//! Accumulated playtime per player, fed by session events.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use craftmon_core::types::{SessionEvent, SessionEventKind};
use craftmon_core::{MonitorError, write_atomic};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaytimeRecord {
    pub uuid: String,
    pub name: String,
    /// Seconds across all completed sessions.
    #[serde(default)]
    pub total_playtime: i64,
    #[serde(default)]
    pub session_count: u64,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_session_duration: Option<i64>,
    #[serde(default)]
    pub last_session_end: Option<DateTime<Utc>>,
}

impl PlaytimeRecord {
    fn new(uuid: &str, name: &str) -> Self {
        Self {
            uuid: uuid.to_owned(),
            name: name.to_owned(),
            total_playtime: 0,
            session_count: 0,
            first_seen: None,
            last_seen: None,
            last_session_duration: None,
            last_session_end: None,
        }
    }
}

#[derive(Debug)]
pub struct PlaytimeLedger {
    path: PathBuf,
    records: BTreeMap<String, PlaytimeRecord>,
}

impl PlaytimeLedger {
    /// Load the ledger at `path`; unreadable or malformed files start empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(records) => records,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed playtime ledger, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read playtime ledger, starting empty");
                BTreeMap::new()
            }
        };
        if !records.is_empty() {
            info!(path = %path.display(), players = records.len(), "loaded playtime ledger");
        }
        Self { path, records }
    }

    /// Fold events in order and persist once if anything changed.
    pub fn record_all(&mut self, events: &[SessionEvent]) -> Result<(), MonitorError> {
        let mut changed = false;
        for event in events {
            changed |= self.apply(event);
        }
        if changed { self.save() } else { Ok(()) }
    }

    /// Apply one event. Returns whether the ledger changed.
    pub fn apply(&mut self, event: &SessionEvent) -> bool {
        let record = self
            .records
            .entry(event.id.clone())
            .or_insert_with(|| PlaytimeRecord::new(&event.id, &event.display_name));
        record.name.clone_from(&event.display_name);
        record.first_seen.get_or_insert(event.timestamp);

        match event.kind {
            SessionEventKind::Join => {
                record.last_seen = Some(event.timestamp);
                true
            }
            SessionEventKind::Leave => {
                let Some(start) = event.session_start else {
                    return true;
                };
                if record
                    .last_session_end
                    .is_some_and(|end| event.timestamp <= end)
                {
                    // Already counted.
                    return true;
                }
                let duration = (event.timestamp - start).num_seconds().max(0);
                record.total_playtime += duration;
                record.session_count += 1;
                record.last_session_duration = Some(duration);
                record.last_session_end = Some(event.timestamp);
                record.last_seen = Some(event.timestamp);
                true
            }
        }
    }

    pub fn get(&self, uuid: &str) -> Option<&PlaytimeRecord> {
        self.records.get(uuid)
    }

    /// All records, most playtime first.
    pub fn records(&self) -> Vec<PlaytimeRecord> {
        let mut all: Vec<PlaytimeRecord> = self.records.values().cloned().collect();
        all.sort_by(|a, b| b.total_playtime.cmp(&a.total_playtime).then_with(|| a.name.cmp(&b.name)));
        all
    }

    fn save(&self) -> Result<(), MonitorError> {
        let bytes = serde_json::to_vec_pretty(&self.records)?;
        write_atomic(&self.path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ALICE: &str = "11111111-1111-1111-1111-111111111111";

    fn at(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 13, 22, min, 0).single().expect("test")
    }

    fn join(min: u32) -> SessionEvent {
        SessionEvent {
            kind: SessionEventKind::Join,
            id: ALICE.into(),
            display_name: "Alice".into(),
            timestamp: at(min),
            session_start: None,
        }
    }

    fn leave(start: u32, min: u32) -> SessionEvent {
        SessionEvent {
            kind: SessionEventKind::Leave,
            id: ALICE.into(),
            display_name: "Alice".into(),
            timestamp: at(min),
            session_start: Some(at(start)),
        }
    }

    #[test]
    fn accumulates_sessions() {
        let dir = tempfile::tempdir().expect("test");
        let mut ledger = PlaytimeLedger::load(dir.path().join("player_playtime.json"));
        ledger
            .record_all(&[join(0), leave(0, 10), join(20), leave(20, 25)])
            .expect("test");

        let alice = ledger.get(ALICE).expect("recorded");
        assert_eq!(alice.total_playtime, 15 * 60);
        assert_eq!(alice.session_count, 2);
        assert_eq!(alice.last_session_duration, Some(5 * 60));
        assert_eq!(alice.first_seen, Some(at(0)));
        assert_eq!(alice.last_session_end, Some(at(25)));
    }

    #[test]
    fn duplicate_leave_is_counted_once() {
        let dir = tempfile::tempdir().expect("test");
        let mut ledger = PlaytimeLedger::load(dir.path().join("player_playtime.json"));
        ledger.record_all(&[join(0), leave(0, 10)]).expect("test");
        ledger.record_all(&[leave(0, 10)]).expect("test");
        assert_eq!(ledger.get(ALICE).expect("test").session_count, 1);
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().expect("test");
        let path = dir.path().join("player_playtime.json");
        {
            let mut ledger = PlaytimeLedger::load(&path);
            ledger.record_all(&[join(0), leave(0, 30)]).expect("test");
        }
        let ledger = PlaytimeLedger::load(&path);
        assert_eq!(ledger.get(ALICE).expect("test").total_playtime, 30 * 60);
        assert_eq!(ledger.records().len(), 1);
    }

    #[test]
    fn malformed_file_starts_empty() {
        let dir = tempfile::tempdir().expect("test");
        let path = dir.path().join("player_playtime.json");
        fs::write(&path, "{oops").expect("test");
        assert!(PlaytimeLedger::load(&path).records().is_empty());
    }

    #[test]
    fn no_events_writes_nothing() {
        let dir = tempfile::tempdir().expect("test");
        let path = dir.path().join("player_playtime.json");
        PlaytimeLedger::load(&path).record_all(&[]).expect("test");
        assert!(!path.exists());
    }
}
