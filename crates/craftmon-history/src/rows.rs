//! The history datasets.

use chrono::{DateTime, SecondsFormat, Utc};
use craftmon_core::types::{CpuUsage, EntityDeath, MemoryUsage, SessionEvent};
use serde::{Deserialize, Serialize};

use crate::history::HistoryRow;

fn format_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuRow {
    pub timestamp: DateTime<Utc>,
    pub usage_percent: f64,
    pub cores: usize,
}

impl CpuRow {
    pub fn new(timestamp: DateTime<Utc>, usage: &CpuUsage) -> Self {
        Self {
            timestamp,
            usage_percent: usage.percent,
            cores: usage.core_count,
        }
    }
}

impl HistoryRow for CpuRow {
    const DATASET: &'static str = "cpu_stats";
    const HEADER: &'static [&'static str] = &["timestamp", "usage_percent", "cores"];

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            format_time(self.timestamp),
            self.usage_percent.to_string(),
            self.cores.to_string(),
        ]
    }

    fn from_record(record: &[String]) -> Option<Self> {
        let [timestamp, usage_percent, cores] = record else {
            return None;
        };
        Some(Self {
            timestamp: parse_time(timestamp)?,
            usage_percent: usage_percent.parse().ok()?,
            cores: cores.parse().ok()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRow {
    pub timestamp: DateTime<Utc>,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub available: u64,
    pub usage_percent: f64,
}

impl MemoryRow {
    pub fn new(timestamp: DateTime<Utc>, usage: &MemoryUsage) -> Self {
        Self {
            timestamp,
            total: usage.total,
            used: usage.used,
            free: usage.free,
            available: usage.available,
            usage_percent: usage.usage_percent,
        }
    }
}

impl HistoryRow for MemoryRow {
    const DATASET: &'static str = "memory_stats";
    const HEADER: &'static [&'static str] =
        &["timestamp", "total", "used", "free", "available", "usage_percent"];

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            format_time(self.timestamp),
            self.total.to_string(),
            self.used.to_string(),
            self.free.to_string(),
            self.available.to_string(),
            self.usage_percent.to_string(),
        ]
    }

    fn from_record(record: &[String]) -> Option<Self> {
        let [timestamp, total, used, free, available, usage_percent] = record else {
            return None;
        };
        Some(Self {
            timestamp: parse_time(timestamp)?,
            total: total.parse().ok()?,
            used: used.parse().ok()?,
            free: free.parse().ok()?,
            available: available.parse().ok()?,
            usage_percent: usage_percent.parse().ok()?,
        })
    }
}

/// Identifier written on the row marking a monitor start.
pub const SERVER_ID: &str = "00000000-0000-0000-0000-000000000000";

/// A join or leave, as logged for the activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEventRow {
    pub timestamp: DateTime<Utc>,
    /// `join`, `leave`, or `startup` for the monitor start marker.
    pub event_type: String,
    pub player_uuid: String,
    pub player_name: String,
}

impl PlayerEventRow {
    /// Marker row separating one monitor run from the next.
    pub fn startup(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            event_type: "startup".to_owned(),
            player_uuid: SERVER_ID.to_owned(),
            player_name: "SERVER".to_owned(),
        }
    }
}

impl From<&SessionEvent> for PlayerEventRow {
    fn from(event: &SessionEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            event_type: event.kind.as_str().to_owned(),
            player_uuid: event.id.clone(),
            player_name: event.display_name.clone(),
        }
    }
}

impl HistoryRow for PlayerEventRow {
    const DATASET: &'static str = "player_sessions";
    const HEADER: &'static [&'static str] =
        &["timestamp", "event_type", "player_uuid", "player_name"];

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            format_time(self.timestamp),
            self.event_type.clone(),
            self.player_uuid.clone(),
            self.player_name.clone(),
        ]
    }

    fn from_record(record: &[String]) -> Option<Self> {
        let [timestamp, event_type, player_uuid, player_name] = record else {
            return None;
        };
        Some(Self {
            timestamp: parse_time(timestamp)?,
            event_type: event_type.clone(),
            player_uuid: player_uuid.clone(),
            player_name: player_name.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDeathRow {
    pub timestamp: DateTime<Utc>,
    pub entity_type: String,
    pub entity_name: String,
    pub entity_uuid: String,
    pub killer: String,
    pub killer_uuid: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<&EntityDeath> for EntityDeathRow {
    fn from(death: &EntityDeath) -> Self {
        Self {
            timestamp: death.timestamp,
            entity_type: death.entity_type.clone(),
            entity_name: death.entity_name.clone(),
            entity_uuid: death.entity_uuid.clone(),
            killer: death.killer.clone(),
            killer_uuid: death.killer_uuid.clone(),
            x: death.x,
            y: death.y,
            z: death.z,
        }
    }
}

impl HistoryRow for EntityDeathRow {
    const DATASET: &'static str = "entity_deaths";
    const HEADER: &'static [&'static str] = &[
        "timestamp",
        "entity_type",
        "entity_name",
        "entity_uuid",
        "killer",
        "killer_uuid",
        "x",
        "y",
        "z",
    ];

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            format_time(self.timestamp),
            self.entity_type.clone(),
            self.entity_name.clone(),
            self.entity_uuid.clone(),
            self.killer.clone(),
            self.killer_uuid.clone(),
            self.x.to_string(),
            self.y.to_string(),
            self.z.to_string(),
        ]
    }

    fn from_record(record: &[String]) -> Option<Self> {
        let [timestamp, entity_type, entity_name, entity_uuid, killer, killer_uuid, x, y, z] =
            record
        else {
            return None;
        };
        Some(Self {
            timestamp: parse_time(timestamp)?,
            entity_type: entity_type.clone(),
            entity_name: entity_name.clone(),
            entity_uuid: entity_uuid.clone(),
            killer: killer.clone(),
            killer_uuid: killer_uuid.clone(),
            x: x.parse().ok()?,
            y: y.parse().ok()?,
            z: z.parse().ok()?,
        })
    }
}
