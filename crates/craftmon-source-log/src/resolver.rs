//! Player name → identifier resolution.
//!
//! Backed by the server's `usercache.json` (an array of `{name, uuid}`
//! records), looked up case-insensitively. Names the cache does not know
//! get a deterministic version-5 UUID derived from the lower-cased name,
//! so a player keeps the same identifier across restarts even before the
//! real cache exists.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Prefix hashed together with the lower-cased name for synthetic ids.
const SYNTHETIC_NAME_PREFIX: &str = "minecraft:";

/// One record of `usercache.json`. Extra fields (`expiresOn`) are ignored.
#[derive(Debug, Clone, Deserialize)]
struct UserCacheEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Mapping {
    name: String,
    id: String,
}

/// Locations of the identity cache file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Preferred location (shared data volume).
    pub primary: PathBuf,
    /// Used only when `primary` does not exist.
    pub fallback: PathBuf,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            primary: PathBuf::from("/data/usercache.json"),
            fallback: PathBuf::from("/minecraft/usercache.json"),
        }
    }
}

#[derive(Debug)]
pub struct UsernameResolver {
    config: ResolverConfig,
    /// Lower-cased name → mapping, replaced wholesale on reload.
    cache: HashMap<String, Mapping>,
    /// Mappings observed in the log itself; kept across reloads.
    learned: HashMap<String, Mapping>,
    loaded: bool,
    last_successful_load: Option<Instant>,
}

impl UsernameResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            cache: HashMap::new(),
            learned: HashMap::new(),
            loaded: false,
            last_successful_load: None,
        }
    }

    /// Identifier for `name`. Never fails: falls back to a synthetic id.
    pub fn resolve(&mut self, name: &str) -> String {
        self.ensure_loaded();
        let key = name.to_lowercase();
        self.cache
            .get(&key)
            .or_else(|| self.learned.get(&key))
            .map(|m| m.id.clone())
            .unwrap_or_else(|| synthetic_id(name))
    }

    /// Identifier for `name` only when the cache or the log knows it.
    pub fn lookup(&mut self, name: &str) -> Option<String> {
        self.ensure_loaded();
        let key = name.to_lowercase();
        self.cache
            .get(&key)
            .or_else(|| self.learned.get(&key))
            .map(|m| m.id.clone())
    }

    /// Name for `id`, or the identifier itself when nothing maps to it.
    pub fn reverse(&mut self, id: &str) -> String {
        self.ensure_loaded();
        self.cache
            .values()
            .chain(self.learned.values())
            .find(|m| m.id.eq_ignore_ascii_case(id))
            .map(|m| m.name.clone())
            .unwrap_or_else(|| id.to_owned())
    }

    /// Record a mapping seen in the log (embedded join id, auth line).
    pub fn remember(&mut self, name: &str, id: &str) {
        self.learned.insert(
            name.to_lowercase(),
            Mapping {
                name: name.to_owned(),
                id: id.to_owned(),
            },
        );
    }

    /// Re-read the identity cache file, replacing the file mapping wholesale.
    pub fn reload(&mut self) {
        self.reload_at(Instant::now());
    }

    /// Reload only if the last successful load is older than `max_age`
    /// (or never happened).
    pub fn reload_if_stale(&mut self, max_age: Duration, now: Instant) {
        let stale = match self.last_successful_load {
            None => true,
            Some(at) => now.saturating_duration_since(at) > max_age,
        };
        if stale {
            self.reload_at(now);
        }
    }

    /// Number of entries loaded from the cache file.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn ensure_loaded(&mut self) {
        if !self.loaded {
            self.reload_at(Instant::now());
        }
    }

    fn reload_at(&mut self, now: Instant) {
        self.cache.clear();
        // Marked loaded even on failure so lookups don't retry the
        // filesystem on every call; the next explicit reload tries again.
        self.loaded = true;

        let path = self.cache_path().to_path_buf();
        if !path.exists() {
            return;
        }

        match read_user_cache(&path) {
            Ok(cache) => {
                info!(path = %path.display(), entries = cache.len(), "loaded identity cache");
                self.cache = cache;
                self.last_successful_load = Some(now);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load identity cache");
            }
        }
    }

    fn cache_path(&self) -> &Path {
        if self.config.primary.exists() {
            &self.config.primary
        } else {
            &self.config.fallback
        }
    }
}

fn read_user_cache(path: &Path) -> Result<HashMap<String, Mapping>, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let entries: Vec<UserCacheEntry> = serde_json::from_str(&content).map_err(|e| e.to_string())?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| match (entry.name, entry.uuid) {
            (Some(name), Some(id)) if !name.is_empty() && !id.is_empty() => {
                Some((name.to_lowercase(), Mapping { name, id }))
            }
            _ => None,
        })
        .collect())
}

/// Deterministic stand-in identifier: UUIDv5 in the DNS namespace over
/// `"minecraft:" + lowercase(name)`, formatted 8-4-4-4-12.
pub fn synthetic_id(name: &str) -> String {
    let seed = format!("{SYNTHETIC_NAME_PREFIX}{}", name.to_lowercase());
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, seed.as_bytes())
        .hyphenated()
        .to_string()
}
