//! Memory usage from `meminfo`.

use std::collections::HashMap;

use craftmon_core::MonitorError;
use craftmon_core::types::{MemoryUsage, round2};

use crate::sources::HostSources;

/// Read `meminfo` under `sources` and compute usage in bytes.
pub fn memory_usage(sources: &HostSources) -> Result<MemoryUsage, MonitorError> {
    let content = sources.read("meminfo", &sources.meminfo())?;
    parse_meminfo(&content)
}

/// `Key:   123 kB` lines to usage. `MemTotal` and `MemFree` are required;
/// without `MemAvailable`, available is approximated as
/// free + buffers + cached.
pub fn parse_meminfo(content: &str) -> Result<MemoryUsage, MonitorError> {
    let fields: HashMap<&str, u64> = content
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let kb = rest.split_whitespace().next()?.parse().ok()?;
            Some((key.trim(), kb))
        })
        .collect();

    let required = |key: &str| {
        fields
            .get(key)
            .copied()
            .ok_or_else(|| MonitorError::parse("meminfo", format!("missing {key}")))
    };
    let total = required("MemTotal")?;
    let free = required("MemFree")?;
    let available = fields.get("MemAvailable").copied().unwrap_or_else(|| {
        let buffers = fields.get("Buffers").copied().unwrap_or(0);
        let cached = fields.get("Cached").copied().unwrap_or(0);
        free.saturating_add(buffers).saturating_add(cached)
    });
    if total == 0 {
        return Err(MonitorError::parse("meminfo", "MemTotal is 0"));
    }
    let used = total.saturating_sub(available);

    let bytes = |kb: u64| kb.saturating_mul(1024);
    Ok(MemoryUsage {
        total: bytes(total),
        used: bytes(used),
        free: bytes(free),
        available: bytes(available),
        usage_percent: round2(100.0 * used as f64 / total as f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn approximates_available_without_field() {
        let m = parse_meminfo(
            "MemTotal:  1000 kB\nMemFree:  200 kB\nBuffers:  50 kB\nCached:  50 kB\nSwapCached:  999 kB\n",
        )
        .expect("test");
        assert_eq!(m.available, 300 * 1024);
        assert_eq!(m.used, 700 * 1024);
        assert_eq!(m.free, 200 * 1024);
        assert_eq!(m.total, 1000 * 1024);
        assert_eq!(m.usage_percent, 70.0);
    }

    #[test]
    fn huge_values_saturate() {
        let content = format!(
            "MemTotal: {max} kB\nMemFree: {max} kB\nBuffers: {max} kB\nCached: 1 kB\n",
            max = u64::MAX
        );
        let m = parse_meminfo(&content).expect("test");
        assert_eq!(m.total, u64::MAX);
        assert_eq!(m.available, u64::MAX);
        assert_eq!(m.used, 0);
    }

    #[test]
    fn prefers_reported_available() {
        let m = parse_meminfo(
            "MemTotal:  16000 kB\nMemFree:  1000 kB\nMemAvailable:  12000 kB\nBuffers:  1 kB\nCached:  1 kB\n",
        )
        .expect("test");
        assert_eq!(m.available, 12000 * 1024);
        assert_eq!(m.usage_percent, 25.0);
    }

    #[test]
    fn missing_total_is_parse_error() {
        let err = parse_meminfo("MemFree:  200 kB\n").expect_err("test");
        assert!(err.to_string().contains("MemTotal"));
    }

    #[test]
    fn reads_from_proc_root() {
        let dir = tempfile::tempdir().expect("test");
        fs::write(dir.path().join("meminfo"), "MemTotal: 4 kB\nMemFree: 1 kB\nMemAvailable: 2 kB\n")
            .expect("test");
        let m = memory_usage(&HostSources::new(dir.path())).expect("test");
        assert_eq!(m.usage_percent, 50.0);

        let empty = tempfile::tempdir().expect("test");
        assert!(
            memory_usage(&HostSources::new(empty.path()))
                .expect_err("test")
                .is_source_unavailable()
        );
    }
}
