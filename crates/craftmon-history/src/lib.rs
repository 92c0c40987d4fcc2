//! craftmon-history: what the monitor remembers between passes.
//! Bounded CSV history of host readings, player events and entity deaths, and the
//! per-player playtime ledger fed by session events.

pub mod csv;
pub mod history;
pub mod playtime;
pub mod rows;

pub use history::{CsvHistory, HistoryConfig, HistoryRow};
pub use playtime::{PlaytimeLedger, PlaytimeRecord};
pub use rows::{CpuRow, EntityDeathRow, MemoryRow, PlayerEventRow};
