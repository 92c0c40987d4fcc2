//! One monitor pass: players, host load and readiness in a single
//! snapshot, with history and playtime fed along the way.
//!
//! Session state is committed only after the pass has recorded the
//! tracker's events, so a crash replays them rather than dropping them.

use std::time::{Duration, Instant};

use chrono::{DateTime, SubsecRound, Utc};
use craftmon_core::ProcessProbe;
use craftmon_core::types::{
    CpuUsage, EntityDeath, MemoryUsage, PlayerSession, ServerStatus, SessionEvent,
};
use craftmon_history::{
    CpuRow, CsvHistory, EntityDeathRow, MemoryRow, PlayerEventRow, PlaytimeLedger,
};
use craftmon_host::{CpuEstimator, HostSources, memory_usage};
use craftmon_source_log::{
    LogTailReader, ReadinessInferencer, SessionTracker, UsernameResolver,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayersView {
    pub online_count: usize,
    pub total_count: usize,
    pub list: Vec<PlayerSession>,
}

/// Everything clients read. Host readings that failed are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub memory: Option<MemoryUsage>,
    pub cpu: Option<CpuUsage>,
    pub players: PlayersView,
    pub server_status: ServerStatus,
    pub taken_at: DateTime<Utc>,
}

pub struct Monitor {
    tracker: SessionTracker,
    cpu: CpuEstimator,
    host: HostSources,
    readiness: ReadinessInferencer,
    probe: Box<dyn ProcessProbe>,
    history: CsvHistory,
    playtime: PlaytimeLedger,
    history_interval: Duration,
    last_history_at: Option<Instant>,
    /// Newest death already in the history file when the monitor started.
    /// Rows are stored to the second, so the log is compared the same way.
    recorded_deaths_until: Option<DateTime<Utc>>,
}

impl Monitor {
    pub fn new(config: &MonitorConfig, probe: Box<dyn ProcessProbe>) -> Self {
        let resolver = UsernameResolver::new(config.resolver.clone());
        let history = CsvHistory::new(config.history.clone());
        let recorded_deaths_until = history
            .recent::<EntityDeathRow>(1)
            .inspect_err(|e| warn!(error = %e, "failed to read death history"))
            .ok()
            .and_then(|rows| rows.first().map(|row| row.timestamp));
        Self {
            tracker: SessionTracker::new(config.tracker.clone(), resolver, LogTailReader::new()),
            cpu: CpuEstimator::new(config.host.clone(), config.cpu_window),
            host: config.host.clone(),
            readiness: ReadinessInferencer::new(config.readiness.clone()),
            probe,
            history,
            playtime: PlaytimeLedger::load(config.playtime_file.clone()),
            history_interval: config.history_interval,
            last_history_at: None,
            recorded_deaths_until,
        }
    }

    /// Mark a monitor start in the player-event history.
    pub fn record_startup(&mut self, now: DateTime<Utc>) {
        match self.history.append(&PlayerEventRow::startup(now)) {
            Ok(()) => info!("recorded startup marker"),
            Err(e) => warn!(error = %e, "failed to record startup marker"),
        }
    }

    pub fn pass(&mut self) -> Snapshot {
        self.pass_at(Utc::now(), Instant::now())
    }

    /// Run every component once. No failure aborts the pass.
    pub fn pass_at(&mut self, now: DateTime<Utc>, clock: Instant) -> Snapshot {
        let refresh = self.tracker.refresh_at(now, clock);
        self.record_events(&refresh.events);
        self.record_deaths(&refresh.deaths);
        self.tracker.commit();

        let cpu = self
            .cpu
            .cpu_usage(clock)
            .inspect_err(|e| warn!(error = %e, "cpu usage unavailable"))
            .ok();
        let memory = memory_usage(&self.host)
            .inspect_err(|e| warn!(error = %e, "memory usage unavailable"))
            .ok();
        self.record_host(now, clock, cpu.as_ref(), memory.as_ref());

        let server_status = self.readiness.status(self.probe.as_ref(), now);

        let snapshot = Snapshot {
            memory,
            cpu,
            players: PlayersView {
                online_count: self.tracker.online_count(),
                total_count: self.tracker.total_count(),
                list: self.tracker.list_players(),
            },
            server_status,
            taken_at: now,
        };
        debug!(
            online = snapshot.players.online_count,
            status = %snapshot.server_status.state.as_str(),
            "monitor pass"
        );
        snapshot
    }

    pub fn history(&self) -> &CsvHistory {
        &self.history
    }

    pub fn playtime(&self) -> &PlaytimeLedger {
        &self.playtime
    }

    fn record_events(&mut self, events: &[SessionEvent]) {
        if events.is_empty() {
            return;
        }
        for event in events {
            if let Err(e) = self.history.append(&PlayerEventRow::from(event)) {
                warn!(error = %e, "failed to record player event");
            }
        }
        if let Err(e) = self.playtime.record_all(events) {
            warn!(error = %e, "failed to save playtime ledger");
        }
    }

    fn record_deaths(&mut self, deaths: &[EntityDeath]) {
        for death in deaths {
            if self
                .recorded_deaths_until
                .is_some_and(|until| death.timestamp.trunc_subsecs(0) <= until)
            {
                continue;
            }
            debug!(
                entity = %death.entity_name,
                killer = %death.killer,
                "entity death"
            );
            if let Err(e) = self.history.append(&EntityDeathRow::from(death)) {
                warn!(error = %e, "failed to record entity death");
            }
        }
    }

    fn record_host(
        &mut self,
        now: DateTime<Utc>,
        clock: Instant,
        cpu: Option<&CpuUsage>,
        memory: Option<&MemoryUsage>,
    ) {
        let due = self
            .last_history_at
            .is_none_or(|at| clock.saturating_duration_since(at) >= self.history_interval);
        if !due {
            return;
        }
        self.last_history_at = Some(clock);

        if let Some(cpu) = cpu
            && let Err(e) = self.history.append(&CpuRow::new(now, cpu))
        {
            warn!(error = %e, "failed to record cpu history");
        }
        if let Some(memory) = memory
            && let Err(e) = self.history.append(&MemoryRow::new(now, memory))
        {
            warn!(error = %e, "failed to record memory history");
        }
    }
}
