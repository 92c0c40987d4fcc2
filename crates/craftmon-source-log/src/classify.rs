//! Log line classification into player events.
//!
//! Lines are expected in the three-bracket shape
//! `[time] [thread/LEVEL] [logger/]: message`. The message is tried against
//! an ordered list of independent matchers; the first match wins and
//! everything else is ignored. Authentication lines and named-entity
//! deaths are recognised separately since they are not session events.

use chrono::{DateTime, Utc};
use craftmon_core::is_uuid;
use craftmon_core::types::{ClassifiedEvent, EntityDeath, EventKind};

use crate::timestamp::extract_timestamp;

const JOINED: &str = " joined the game";
const LEFT: &str = " left the game";
const ISSUED_COMMAND: &str = " issued server command:";
const UUID_OF_PLAYER: &str = "uuid of player ";
const AUTH_THREAD: &str = "User Authenticator";
const NAMED_ENTITY: &str = "Named entity ";
const SLAIN_BY: &str = " was slain by ";

/// What a single matcher extracted from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Match<'a> {
    kind: EventKind,
    name: &'a str,
    embedded_id: Option<&'a str>,
}

type Matcher = for<'a> fn(&'a str) -> Option<Match<'a>>;

/// Matchers in priority order.
const MATCHERS: [(&str, Matcher); 5] = [
    ("join_with_id", match_join_with_id),
    ("join", match_join),
    ("leave", match_leave),
    ("chat", match_chat),
    ("command", match_command),
];

/// Classify one log line. `now` is used when the line carries no
/// parseable timestamp.
pub fn classify(line: &str, now: DateTime<Utc>) -> Option<ClassifiedEvent> {
    let message = log_message(line)?;
    let m = MATCHERS.iter().find_map(|(_, matcher)| matcher(message))?;
    Some(ClassifiedEvent {
        kind: m.kind,
        display_name: m.name.to_owned(),
        embedded_id: m.embedded_id.map(str::to_owned),
        timestamp: extract_timestamp(line, now),
    })
}

/// Name of the matcher that would classify `line`, for diagnostics.
pub fn matcher_name(line: &str) -> Option<&'static str> {
    let message = log_message(line)?;
    MATCHERS
        .iter()
        .find(|(_, matcher)| matcher(message).is_some())
        .map(|(name, _)| *name)
}

/// Name → identifier pair announced by the authentication thread:
/// `[..] [User Authenticator #1/INFO] [..]: UUID of player Alice is 11111111-...`.
///
/// Only the message head counts, and only on the authenticator thread, so
/// chat quoting the phrase cannot remap a name.
pub fn identity_hint(line: &str) -> Option<(&str, &str)> {
    let (thread, message) = split_line(line)?;
    if !thread.starts_with(AUTH_THREAD) {
        return None;
    }
    let head = message.get(..UUID_OF_PLAYER.len())?;
    if !head.eq_ignore_ascii_case(UUID_OF_PLAYER) {
        return None;
    }
    let rest = &message[UUID_OF_PLAYER.len()..];
    let sep = rest.find(" is ")?;
    let name = rest[..sep].trim();
    let id = rest[sep + 4..].get(..36)?;
    (is_single_token(name) && is_uuid(id)).then_some((name, id))
}

/// A named entity's death:
/// `Named entity Wolf['Rex'/123, l='ServerLevel[world]', x=1.5, y=64.0, z=-3.2] died: Rex was slain by Zombie`.
///
/// Identifiers are left empty; the caller resolves them.
pub fn entity_death(line: &str, now: DateTime<Utc>) -> Option<EntityDeath> {
    let rest = log_message(line)?.strip_prefix(NAMED_ENTITY)?;

    let open = rest.find("['")?;
    let entity_type = &rest[..open];
    if entity_type.is_empty() || !entity_type.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let rest = &rest[open + 2..];
    let name_end = rest.find("'/")?;
    let entity_name = rest[..name_end].trim();
    let rest = &rest[name_end + 2..];

    let (x, rest) = coordinate(rest, ", x=", ", y=")?;
    let (y, rest) = coordinate(rest, ", y=", ", z=")?;
    let (z, rest) = coordinate(rest, ", z=", "] died: ")?;

    let killer = rest[rest.find(SLAIN_BY)? + SLAIN_BY.len()..].trim();
    if entity_name.is_empty() || killer.is_empty() {
        return None;
    }
    Some(EntityDeath {
        entity_type: entity_type.to_owned(),
        entity_name: entity_name.to_owned(),
        entity_uuid: String::new(),
        killer: killer.to_owned(),
        killer_uuid: String::new(),
        x,
        y,
        z,
        timestamp: extract_timestamp(line, now),
    })
}

/// The message part after the `[..] [..] [..]: ` prefix.
pub fn log_message(line: &str) -> Option<&str> {
    split_line(line).map(|(_, message)| message)
}

/// Thread bracket contents and message of a three-bracket line.
fn split_line(line: &str) -> Option<(&str, &str)> {
    let mut rest = line;
    let mut thread = "";
    for i in 0..3 {
        if i > 0 {
            rest = rest.strip_prefix(' ')?;
        }
        rest = rest.strip_prefix('[')?;
        let close = rest.find(']')?;
        if i == 1 {
            thread = &rest[..close];
        }
        rest = &rest[close + 1..];
    }
    Some((thread, rest.strip_prefix(": ")?))
}

/// Number between `key` and `end`, and the rest starting at `end`.
fn coordinate<'a>(rest: &'a str, key: &str, end: &str) -> Option<(f64, &'a str)> {
    let start = rest.find(key)? + key.len();
    let len = rest[start..].find(end)?;
    let value = rest[start..start + len].trim().parse::<f64>().ok()?;
    Some((value, &rest[start + len..]))
}

// ─── Matchers ────────────────────────────────────────────────────

/// `Name[/<uuid>] joined the game`
fn match_join_with_id(message: &str) -> Option<Match<'_>> {
    let head = message[..message.find(JOINED)?].strip_suffix(']')?;
    let open = head.rfind("[/")?;
    let name = head[..open].trim();
    let id = &head[open + 2..];
    (is_single_token(name) && is_uuid(id)).then_some(Match {
        kind: EventKind::Join,
        name,
        embedded_id: Some(id),
    })
}

/// `Name joined the game` (a non-UUID `[/...]` suffix is dropped)
fn match_join(message: &str) -> Option<Match<'_>> {
    let head = message[..message.find(JOINED)?].trim();
    let name = match head.rfind("[/") {
        Some(open) if head.ends_with(']') => head[..open].trim(),
        _ => head,
    };
    player(EventKind::Join, name)
}

/// `Name left the game`
fn match_leave(message: &str) -> Option<Match<'_>> {
    player(EventKind::Leave, message[..message.find(LEFT)?].trim())
}

/// `<Name> message`
fn match_chat(message: &str) -> Option<Match<'_>> {
    let rest = message.strip_prefix('<')?;
    let name = rest[..rest.find('>')?].trim();
    (!name.is_empty()).then_some(Match {
        kind: EventKind::Activity,
        name,
        embedded_id: None,
    })
}

/// `Name issued server command: /cmd`
fn match_command(message: &str) -> Option<Match<'_>> {
    player(
        EventKind::Activity,
        message[..message.find(ISSUED_COMMAND)?].trim(),
    )
}

fn player(kind: EventKind, name: &str) -> Option<Match<'_>> {
    is_single_token(name).then_some(Match {
        kind,
        name,
        embedded_id: None,
    })
}

fn is_single_token(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_whitespace)
}
