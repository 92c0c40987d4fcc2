//! Player session tracking over the server log.
//!
//! Each refresh tails the log, classifies new lines and applies them in
//! log order to a per-identifier state machine
//! (`Unknown → Online ⇄ Offline`). The full session map is restored from a
//! JSON snapshot at construction. It is written back by [`SessionTracker::commit`]
//! once the caller has recorded the refresh output, so a crash in between
//! replays those events instead of losing them.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use craftmon_core::types::{
    ClassifiedEvent, EntityDeath, EventKind, PlayerSession, SessionEvent, SessionEventKind,
};
use craftmon_core::{MonitorError, is_uuid, write_atomic};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::classify::{classify, entity_death, identity_hint};
use crate::resolver::UsernameResolver;
use crate::tail::LogTailReader;
use crate::timestamp::parse_log_timestamp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub log_file: PathBuf,
    pub state_file: PathBuf,
    /// How long a loaded identity cache is trusted before re-reading it.
    pub usercache_max_age: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("/minecraft/logs/latest.log"),
            state_file: PathBuf::from("/data/player_tracker_state.json"),
            usercache_max_age: Duration::from_secs(300),
        }
    }
}

/// Snapshot record as found on disk. Every field is optional so one bad
/// entry does not discard the rest.
#[derive(Debug, Default, Deserialize)]
struct StoredSession {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    joined_at: Option<String>,
    #[serde(default)]
    last_activity: Option<String>,
    #[serde(default)]
    left_at: Option<String>,
    #[serde(default)]
    is_online: bool,
}

/// What one refresh produced, in log order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Refresh {
    pub events: Vec<SessionEvent>,
    pub deaths: Vec<EntityDeath>,
}

impl Refresh {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.deaths.is_empty()
    }
}

pub struct SessionTracker {
    config: TrackerConfig,
    resolver: UsernameResolver,
    tail: LogTailReader,
    sessions: HashMap<String, PlayerSession>,
    /// Newest activity restored from the snapshot. Events at or before it
    /// are re-applied but not emitted again.
    replay_horizon: Option<DateTime<Utc>>,
    /// True until the first batch after a restore has been read. Lines in
    /// that batch without a parseable timestamp are applied silently.
    replaying: bool,
    /// State changed since the last successful commit.
    dirty: bool,
}

impl SessionTracker {
    /// Build a tracker and restore the previous snapshot, if any.
    pub fn new(config: TrackerConfig, resolver: UsernameResolver, tail: LogTailReader) -> Self {
        let mut tracker = Self {
            config,
            resolver,
            tail,
            sessions: HashMap::new(),
            replay_horizon: None,
            replaying: false,
            dirty: false,
        };
        tracker.load_state();
        tracker.replaying = tracker.replay_horizon.is_some();
        tracker
    }

    /// Read newly appended log lines and apply them.
    ///
    /// Returns the join/leave transitions and entity deaths in log order.
    /// Call [`commit`](Self::commit) after recording them.
    pub fn refresh(&mut self) -> Refresh {
        self.refresh_at(Utc::now(), Instant::now())
    }

    /// [`refresh`](Self::refresh) with explicit wall and monotonic clocks.
    pub fn refresh_at(&mut self, now: DateTime<Utc>, clock: Instant) -> Refresh {
        self.resolver
            .reload_if_stale(self.config.usercache_max_age, clock);

        let lines = self.tail.read_new_lines(&self.config.log_file);
        if lines.is_empty() {
            return Refresh::default();
        }

        let replaying = std::mem::take(&mut self.replaying);
        let mut out = Refresh::default();
        for line in &lines {
            let stamped = parse_log_timestamp(line).is_some();
            if let Some(event) = classify(line, now) {
                let (applied, emitted) = self.apply(event);
                self.dirty |= applied;
                if replaying && !stamped {
                    continue;
                }
                out.events.extend(emitted);
            } else if let Some(mut death) = entity_death(line, now) {
                let old = self
                    .replay_horizon
                    .is_some_and(|horizon| death.timestamp <= horizon);
                if replaying && (!stamped || old) {
                    continue;
                }
                death.entity_uuid = self.known_id(&death.entity_name);
                death.killer_uuid = self.known_id(&death.killer);
                out.deaths.push(death);
            } else if let Some((name, id)) = identity_hint(line) {
                self.resolver.remember(name, id);
            }
        }

        debug!(
            lines = lines.len(),
            events = out.events.len(),
            deaths = out.deaths.len(),
            replaying,
            "applied log lines"
        );
        out
    }

    /// Identifier of a player the cache, the log or the session table
    /// knows; empty for anything else (mobs, unnamed killers).
    fn known_id(&mut self, name: &str) -> String {
        if let Some(id) = self.resolver.lookup(name) {
            return id;
        }
        let id = self.resolver.resolve(name);
        if self.sessions.contains_key(&id) {
            id
        } else {
            String::new()
        }
    }

    /// Persist the session map if the last refreshes changed it.
    pub fn commit(&mut self) {
        if !self.dirty {
            return;
        }
        match self.write_state() {
            Ok(()) => self.dirty = false,
            Err(e) => warn!(error = %e, "failed to save session state"),
        }
    }

    /// Apply one classified event. Returns whether state changed and the
    /// session event to publish, if any.
    pub fn apply(&mut self, event: ClassifiedEvent) -> (bool, Option<SessionEvent>) {
        let id = match event.embedded_id.as_deref() {
            Some(id) => {
                self.resolver.remember(&event.display_name, id);
                id.to_owned()
            }
            None => self.resolver.resolve(&event.display_name),
        };
        let ts = event.timestamp;

        let published = match event.kind {
            EventKind::Join => {
                let session = self
                    .sessions
                    .entry(id.clone())
                    .or_insert_with(|| PlayerSession::new(id.clone(), event.display_name.clone()));
                session.display_name.clone_from(&event.display_name);
                session.is_online = true;
                session.joined_at = Some(ts);
                session.last_activity = Some(ts);
                SessionEvent {
                    kind: SessionEventKind::Join,
                    id,
                    display_name: event.display_name,
                    timestamp: ts,
                    session_start: None,
                }
            }
            EventKind::Leave => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return (false, None);
                };
                let session_start = session.joined_at;
                session.is_online = false;
                session.left_at = Some(ts);
                session.last_activity = Some(ts);
                SessionEvent {
                    kind: SessionEventKind::Leave,
                    id,
                    display_name: session.display_name.clone(),
                    timestamp: ts,
                    session_start,
                }
            }
            EventKind::Activity => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return (false, None);
                };
                session.display_name = event.display_name;
                session.last_activity = Some(ts);
                return (true, None);
            }
        };

        let fresh = self.replay_horizon.is_none_or(|horizon| ts > horizon);
        (true, fresh.then_some(published))
    }

    /// All tracked sessions, most recently active first; sessions with no
    /// activity sort last.
    pub fn list_players(&self) -> Vec<PlayerSession> {
        let mut players: Vec<PlayerSession> = self.sessions.values().cloned().collect();
        players.sort_by(|a, b| {
            b.last_activity
                .unwrap_or(DateTime::UNIX_EPOCH)
                .cmp(&a.last_activity.unwrap_or(DateTime::UNIX_EPOCH))
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        players
    }

    pub fn online_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_online).count()
    }

    pub fn total_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn get(&self, id: &str) -> Option<&PlayerSession> {
        self.sessions.get(id)
    }

    // ─── Persistence ─────────────────────────────────────────────

    fn load_state(&mut self) {
        let path = &self.config.state_file;
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read session state, starting empty");
                return;
            }
        };

        let entries: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed session state, starting empty");
                return;
            }
        };

        let mut sessions = HashMap::new();
        for (key, value) in entries {
            let stored: StoredSession = match serde_json::from_value(value) {
                Ok(s) => s,
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping malformed session entry");
                    continue;
                }
            };
            // Older snapshots were keyed by player name.
            let id = if is_uuid(&key) {
                key.clone()
            } else {
                self.resolver.resolve(&key)
            };
            let display_name = match stored.name {
                Some(name) if !name.is_empty() => name,
                _ if is_uuid(&key) => self.resolver.reverse(&id),
                _ => key,
            };
            sessions.insert(
                id.clone(),
                PlayerSession {
                    id,
                    display_name,
                    joined_at: parse_stored_time(stored.joined_at.as_deref()),
                    last_activity: parse_stored_time(stored.last_activity.as_deref()),
                    left_at: parse_stored_time(stored.left_at.as_deref()),
                    is_online: stored.is_online,
                },
            );
        }

        self.replay_horizon = sessions.values().filter_map(|s| s.last_activity).max();
        info!(path = %path.display(), sessions = sessions.len(), "restored session state");
        self.sessions = sessions;
    }

    fn write_state(&self) -> Result<(), MonitorError> {
        // An empty tracker must not clobber an existing snapshot.
        if self.sessions.is_empty() {
            return Ok(());
        }
        let ordered: BTreeMap<&str, &PlayerSession> =
            self.sessions.iter().map(|(k, v)| (k.as_str(), v)).collect();
        let bytes = serde_json::to_vec_pretty(&ordered)?;
        write_atomic(&self.config.state_file, &bytes)
    }
}

fn parse_stored_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{ResolverConfig, synthetic_id};
    use std::io::Write;
    use std::path::Path;

    const ALICE: &str = "11111111-1111-1111-1111-111111111111";

    struct Fixture {
        _dir: tempfile::TempDir,
        log: PathBuf,
        state: PathBuf,
        root: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("test");
        let root = dir.path().to_path_buf();
        Fixture {
            log: root.join("latest.log"),
            state: root.join("player_tracker_state.json"),
            root,
            _dir: dir,
        }
    }

    fn tracker(fx: &Fixture) -> SessionTracker {
        let resolver = UsernameResolver::new(ResolverConfig {
            primary: fx.root.join("usercache.json"),
            fallback: fx.root.join("missing.json"),
        });
        SessionTracker::new(
            TrackerConfig {
                log_file: fx.log.clone(),
                state_file: fx.state.clone(),
                usercache_max_age: Duration::from_secs(300),
            },
            resolver,
            LogTailReader::new(),
        )
    }

    fn append(path: &Path, lines: &[&str]) {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("test");
        for l in lines {
            writeln!(f, "[13Nov2025 22:{l}").expect("test");
        }
    }

    #[test]
    fn join_then_leave_goes_offline() {
        let fx = fixture();
        let mut t = tracker(&fx);
        append(
            &fx.log,
            &[
                "00:00.000] [Server thread/INFO] [x/]: Alice joined the game",
                "05:00.000] [Server thread/INFO] [x/]: Alice left the game",
            ],
        );
        let events = t.refresh().events;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, SessionEventKind::Join);
        assert_eq!(events[1].kind, SessionEventKind::Leave);
        assert_eq!(events[1].session_start, Some(events[0].timestamp));

        let alice = t.get(&synthetic_id("Alice")).expect("tracked");
        assert!(!alice.is_online);
        assert!(alice.left_at.is_some());
        assert_eq!(t.online_count(), 0);
        assert_eq!(t.total_count(), 1);
    }

    #[test]
    fn leave_for_unknown_player_is_noop() {
        let fx = fixture();
        let mut t = tracker(&fx);
        append(&fx.log, &["00:00.000] [Server thread/INFO] [x/]: Ghost left the game"]);
        assert!(t.refresh().is_empty());
        t.commit();
        assert_eq!(t.total_count(), 0);
        assert!(!fx.state.exists(), "no change, no snapshot");
    }

    #[test]
    fn activity_before_join_is_noop() {
        let fx = fixture();
        let mut t = tracker(&fx);
        append(
            &fx.log,
            &[
                "00:00.000] [Server thread/INFO] [x/]: <Alice> hi",
                "00:01.000] [Server thread/INFO] [x/]: Alice issued server command: /spawn",
            ],
        );
        assert!(t.refresh().is_empty());
        assert_eq!(t.total_count(), 0);
    }

    #[test]
    fn activity_updates_last_activity_only() {
        let fx = fixture();
        let mut t = tracker(&fx);
        append(&fx.log, &["00:00.000] [Server thread/INFO] [x/]: Alice joined the game"]);
        t.refresh();
        let id = synthetic_id("Alice");
        let joined = t.get(&id).and_then(|s| s.joined_at).expect("joined");

        append(&fx.log, &["03:00.000] [Server thread/INFO] [x/]: <alice> brb"]);
        assert!(t.refresh().is_empty(), "activity is not published");
        let alice = t.get(&id).expect("tracked");
        assert!(alice.is_online);
        assert_eq!(alice.joined_at, Some(joined));
        assert!(alice.last_activity > Some(joined));
        assert_eq!(alice.display_name, "alice");
    }

    #[test]
    fn embedded_id_is_learned_for_later_lines() {
        let fx = fixture();
        let mut t = tracker(&fx);
        append(
            &fx.log,
            &[
                "00:00.000] [Server thread/INFO] [x/]: Alice[/11111111-1111-1111-1111-111111111111] joined the game",
                "09:00.000] [Server thread/INFO] [x/]: Alice left the game",
            ],
        );
        t.refresh();
        let alice = t.get(ALICE).expect("tracked by embedded id");
        assert!(!alice.is_online);
        assert_eq!(t.total_count(), 1);
    }

    #[test]
    fn auth_line_teaches_resolver() {
        let fx = fixture();
        let mut t = tracker(&fx);
        append(
            &fx.log,
            &[
                "00:00.000] [User Authenticator #1/INFO] [x/]: UUID of player Bob is 22222222-2222-2222-2222-222222222222",
                "00:01.000] [Server thread/INFO] [x/]: Bob joined the game",
            ],
        );
        t.refresh();
        assert!(t.get("22222222-2222-2222-2222-222222222222").is_some());
    }

    #[test]
    fn list_players_most_recent_first() {
        let fx = fixture();
        let mut t = tracker(&fx);
        append(
            &fx.log,
            &[
                "00:00.000] [Server thread/INFO] [x/]: Alice joined the game",
                "01:00.000] [Server thread/INFO] [x/]: Bob joined the game",
                "02:00.000] [Server thread/INFO] [x/]: <Alice> still here",
            ],
        );
        t.refresh();
        let names: Vec<String> = t.list_players().into_iter().map(|p| p.display_name).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert_eq!(t.online_count(), 2);
    }

    #[test]
    fn state_survives_restart_without_republishing() {
        let fx = fixture();
        append(
            &fx.log,
            &[
                "00:00.000] [Server thread/INFO] [x/]: Alice joined the game",
                "05:00.000] [Server thread/INFO] [x/]: Alice left the game",
            ],
        );
        {
            let mut t = tracker(&fx);
            assert_eq!(t.refresh().events.len(), 2);
            t.commit();
        }
        assert!(fx.state.exists());

        // A new process re-reads the same log from offset 0.
        let mut t = tracker(&fx);
        assert_eq!(t.total_count(), 1);
        assert!(t.refresh().is_empty(), "replayed events are not published twice");
        assert!(!t.get(&synthetic_id("Alice")).expect("tracked").is_online);

        append(&fx.log, &["10:00.000] [Server thread/INFO] [x/]: Alice joined the game"]);
        let events = t.refresh().events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, SessionEventKind::Join);
    }

    #[test]
    fn legacy_name_keys_are_resolved() {
        let fx = fixture();
        fs::write(
            &fx.state,
            r#"{"Alice":{"name":"Alice","last_activity":"2025-11-13T22:00:00Z","is_online":true},
               "11111111-1111-1111-1111-111111111111":{"uuid":"11111111-1111-1111-1111-111111111111","name":"Carol","joined_at":"not a time"}}"#,
        )
        .expect("test");
        let t = tracker(&fx);
        let alice = t.get(&synthetic_id("Alice")).expect("legacy key resolved");
        assert!(alice.is_online);
        assert!(alice.last_activity.is_some());
        let carol = t.get(ALICE).expect("uuid key kept");
        assert_eq!(carol.display_name, "Carol");
        assert!(carol.joined_at.is_none(), "bad timestamps become null");
    }

    #[test]
    fn malformed_state_is_cold_start() {
        let fx = fixture();
        fs::write(&fx.state, "[[[").expect("test");
        let t = tracker(&fx);
        assert_eq!(t.total_count(), 0);
    }

    #[test]
    fn empty_tracker_does_not_clobber_snapshot() {
        let fx = fixture();
        let t = tracker(&fx);
        t.write_state().expect("test");
        assert!(!fx.state.exists());
    }

    #[test]
    fn snapshot_is_keyed_by_identifier() {
        let fx = fixture();
        let mut t = tracker(&fx);
        append(&fx.log, &["00:00.000] [Server thread/INFO] [x/]: Alice joined the game"]);
        t.refresh();
        t.commit();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&fx.state).expect("test")).expect("test");
        let entry = &json[synthetic_id("Alice")];
        assert_eq!(entry["name"], "Alice");
        assert_eq!(entry["is_online"], true);
        assert!(entry["joined_at"].is_string());
    }

    #[test]
    fn chat_quoting_an_auth_line_cannot_remap_a_player() {
        let fx = fixture();
        let mut t = tracker(&fx);
        append(
            &fx.log,
            &[
                "00:00.000] [Server thread/INFO] [x/]: Alice joined the game",
                "00:01.000] [Server thread/INFO] [x/]: Bob joined the game",
                "00:02.000] [Server thread/INFO] [x/]: <Bob> UUID of player Alice is 22222222-2222-2222-2222-222222222222",
                "00:03.000] [Server thread/INFO] [x/]: Alice left the game",
            ],
        );
        let events = t.refresh().events;
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].kind, SessionEventKind::Leave);
        assert_eq!(events[2].id, synthetic_id("Alice"));

        assert!(!t.get(&synthetic_id("Alice")).expect("tracked").is_online);
        assert!(t.get("22222222-2222-2222-2222-222222222222").is_none());
        let bob = t.get(&synthetic_id("Bob")).expect("tracked");
        let joined = bob.joined_at.expect("joined");
        assert!(bob.last_activity > Some(joined), "chat counted as activity");
    }

    #[test]
    fn uncommitted_refresh_is_replayed_after_restart() {
        let fx = fixture();
        append(&fx.log, &["00:00.000] [Server thread/INFO] [x/]: Alice joined the game"]);
        {
            let mut t = tracker(&fx);
            t.refresh();
            t.commit();
        }
        append(&fx.log, &["05:00.000] [Server thread/INFO] [x/]: Alice left the game"]);
        {
            // Dies before the leave is recorded anywhere.
            let mut t = tracker(&fx);
            let events = t.refresh().events;
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].kind, SessionEventKind::Leave);
        }

        let mut t = tracker(&fx);
        let events = t.refresh().events;
        assert_eq!(events.len(), 1, "the leave is emitted again");
        assert_eq!(events[0].kind, SessionEventKind::Leave);
        assert!(events[0].session_start.is_some());
    }

    #[test]
    fn unstamped_lines_are_not_republished_on_restart() {
        let fx = fixture();
        append(&fx.log, &["00:00.000] [Server thread/INFO] [x/]: Alice joined the game"]);
        let mut f = fs::OpenOptions::new().append(true).open(&fx.log).expect("test");
        writeln!(f, "[--] [Server thread/INFO] [x/]: Bob joined the game").expect("test");
        drop(f);
        {
            let mut t = tracker(&fx);
            assert_eq!(t.refresh().events.len(), 2);
            t.commit();
        }

        let mut t = tracker(&fx);
        assert!(t.refresh().is_empty());
        assert!(t.get(&synthetic_id("Bob")).expect("tracked").is_online);

        // Once caught up, unstamped lines are live again.
        let mut f = fs::OpenOptions::new().append(true).open(&fx.log).expect("test");
        writeln!(f, "[--] [Server thread/INFO] [x/]: Bob left the game").expect("test");
        drop(f);
        assert_eq!(t.refresh().events.len(), 1);
    }

    #[test]
    fn entity_deaths_resolve_known_names() {
        let fx = fixture();
        let mut t = tracker(&fx);
        append(
            &fx.log,
            &[
                "00:00.000] [Server thread/INFO] [x/]: Alice[/11111111-1111-1111-1111-111111111111] joined the game",
                "01:00.000] [Server thread/INFO] [x/]: Named entity Wolf['Rex'/9, l='ServerLevel[world]', x=1.0, y=64.0, z=2.0] died: Rex was slain by Alice",
            ],
        );
        let out = t.refresh();
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.deaths.len(), 1);
        let death = &out.deaths[0];
        assert_eq!(death.entity_name, "Rex");
        assert_eq!(death.entity_uuid, "");
        assert_eq!(death.killer_uuid, ALICE);
    }
}
