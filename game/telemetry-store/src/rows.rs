use save_parser::ParsedPlayer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Counters fed by the external log tailer, preserved across save syncs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LogCounters {
    pub deaths: i64,
    pub pvp_kills: i64,
    pub pvp_deaths: i64,
    pub builds: i64,
    pub loots: i64,
    pub damage_taken: i64,
    pub raids_out: i64,
    pub raids_in: i64,
    pub last_event: String,
}

/// One event from the game log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEventKind {
    Death,
    PvpKill,
    PvpDeath,
    Build,
    Loot,
    DamageTaken(i64),
    RaidOut,
    RaidIn,
}

impl LogEventKind {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            LogEventKind::Death => "log_deaths",
            LogEventKind::PvpKill => "log_pvp_kills",
            LogEventKind::PvpDeath => "log_pvp_deaths",
            LogEventKind::Build => "log_builds",
            LogEventKind::Loot => "log_loots",
            LogEventKind::DamageTaken(_) => "log_damage_taken",
            LogEventKind::RaidOut => "log_raids_out",
            LogEventKind::RaidIn => "log_raids_in",
        }
    }

    pub(crate) fn increment(&self) -> i64 {
        match self {
            LogEventKind::DamageTaken(amount) => *amount,
            _ => 1,
        }
    }
}

/// A full player row read back from the store, with JSON columns decoded and
/// integer flags converted to booleans.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub steam_id: String,
    pub name_history: Value,
    pub first_seen: String,
    pub last_seen: String,
    pub online: bool,
    pub log: LogCounters,
    pub playtime_seconds: i64,
    pub session_count: i64,
    pub updated_at: String,
    /// The save-sourced portion of the row.
    #[serde(flatten)]
    pub player: ParsedPlayer,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub steam_id: String,
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerTotals {
    pub total_players: i64,
    pub online_players: i64,
    pub lifetime_kills: i64,
    pub lifetime_headshots: i64,
    pub lifetime_days_survived: i64,
    pub log_deaths: i64,
    pub log_pvp_kills: i64,
    pub log_builds: i64,
    pub log_loots: i64,
    pub fish_caught: i64,
    pub playtime_seconds: i64,
}
