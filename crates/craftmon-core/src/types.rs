use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Log Events ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Join,
    Leave,
    Activity,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Activity => "activity",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A player event recognised in one log line. Produced per line and
/// consumed immediately by the session tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEvent {
    pub kind: EventKind,
    pub display_name: String,
    /// Identifier printed in the line itself (`Name[/<uuid>] joined the game`).
    pub embedded_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ─── Sessions ─────────────────────────────────────────────────────

/// Per-player session record. Field names on the wire (`uuid`, `name`)
/// match the persisted state file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSession {
    #[serde(rename = "uuid")]
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub left_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_online: bool,
}

impl PlayerSession {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            joined_at: None,
            last_activity: None,
            left_at: None,
            is_online: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionEventKind {
    Join,
    Leave,
}

impl SessionEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
        }
    }
}

impl fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join/leave transition emitted by a tracker refresh, in log order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub id: String,
    pub display_name: String,
    pub timestamp: DateTime<Utc>,
    /// `joined_at` of the session being closed (leave events only).
    pub session_start: Option<DateTime<Utc>>,
}

/// A named entity (pet, tagged mob) slain in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDeath {
    pub entity_type: String,
    pub entity_name: String,
    /// Known identifier of `entity_name`, empty when it is not a player.
    pub entity_uuid: String,
    pub killer: String,
    /// Known identifier of `killer`, empty when it is not a player.
    pub killer_uuid: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: DateTime<Utc>,
}

// ─── Host Utilization ─────────────────────────────────────────────

/// Which branch produced a CPU reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuMethod {
    /// Difference of two counter snapshots.
    Delta,
    /// 1-minute load average divided by core count.
    LoadAverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuUsage {
    /// 0..=100, two decimals.
    pub percent: f64,
    pub core_count: usize,
    pub method: CpuMethod,
}

/// Memory figures in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub available: u64,
    pub usage_percent: f64,
}

// ─── Server Readiness ─────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    #[default]
    Unknown,
    Initializing,
    Ready,
}

impl ServerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    #[serde(rename = "status")]
    pub state: ServerState,
    pub message: String,
}

impl ServerStatus {
    pub fn new(state: ServerState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }
}

/// Round to two decimal places, the precision of every reported percentage.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_serializes_with_state_file_names() {
        let session = PlayerSession::new("11111111-1111-1111-1111-111111111111", "Alice");
        let json = serde_json::to_value(&session).expect("serialize");
        assert_eq!(json["uuid"], "11111111-1111-1111-1111-111111111111");
        assert_eq!(json["name"], "Alice");
        assert_eq!(json["is_online"], false);
        assert!(json["left_at"].is_null());
    }

    #[test]
    fn session_tolerates_missing_optional_fields() {
        let json = r#"{"uuid":"u","name":"Bob"}"#;
        let session: PlayerSession = serde_json::from_str(json).expect("deserialize");
        assert_eq!(session.display_name, "Bob");
        assert!(!session.is_online);
        assert!(session.joined_at.is_none());
    }

    #[test]
    fn server_status_wire_shape() {
        let status = ServerStatus::new(ServerState::Ready, "ok");
        let json = serde_json::to_value(&status).expect("serialize");
        assert_eq!(json["status"], "ready");
        assert_eq!(json["message"], "ok");
    }

    #[test]
    fn server_state_default_is_unknown() {
        assert_eq!(ServerState::default(), ServerState::Unknown);
    }

    #[test]
    fn round2_rounds_half_away() {
        assert!((round2(33.333_33) - 33.33).abs() < f64::EPSILON);
        assert!((round2(66.666_66) - 66.67).abs() < f64::EPSILON);
        assert!((round2(50.0) - 50.0).abs() < f64::EPSILON);
    }
}
