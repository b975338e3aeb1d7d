use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How the save snapshot is acquired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    /// Download the whole binary save and parse in-process.
    Direct,
    /// Run the remote parser on the host and fetch only its JSON cache.
    Agent,
    /// Try `agent` once, fall back to `direct` on any failure.
    #[default]
    Auto,
}

/// How the remote parser is triggered in agent mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentTrigger {
    /// Send a console command through the hosting panel API.
    Panel,
    /// Upload the generated parser script and execute it over SSH.
    Ssh,
    /// The host runs the agent on its own schedule; only read the cache.
    None,
    /// Probe panel, then ssh, then degrade to none.
    #[default]
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSftp {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Private key file, used instead of the password when set.
    pub key_path: String,
    /// Upper bound for one remote command execution, in seconds.
    pub exec_timeout_secs: u64,
}

impl Default for ConfigSftp {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            user: String::new(),
            password: String::new(),
            key_path: String::new(),
            exec_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigRcon {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// TTL for cached status-style commands, in seconds.
    pub status_cache_ttl_secs: u64,
}

impl Default for ConfigRcon {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 27015,
            password: String::new(),
            status_cache_ttl_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSave {
    /// Remote path of the binary save file.
    pub save_path: String,
    /// Remote path of the clan-data save, empty to skip.
    pub clan_path: String,
    pub poll_interval_secs: u64,
    pub mode: SaveMode,
}

impl Default for ConfigSave {
    fn default() -> Self {
        Self {
            save_path: String::new(),
            clan_path: String::new(),
            poll_interval_secs: 60,
            mode: SaveMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigAgent {
    pub trigger: AgentTrigger,
    /// Console command the panel trigger sends.
    pub console_command: String,
    /// Hosting panel endpoint for the console command.
    pub panel_url: String,
    pub panel_token: String,
    /// Seconds to wait after the panel command before re-reading the cache.
    pub panel_delay_secs: u64,
    /// Cache file path override; derived from the save directory when empty.
    pub cache_path: String,
    /// Remote path the generated parser script is deployed to.
    pub script_path: String,
    /// Cache snapshots older than this are considered stale, in seconds.
    pub cache_max_age_secs: u64,
}

impl Default for ConfigAgent {
    fn default() -> Self {
        Self {
            trigger: AgentTrigger::default(),
            console_command: "saveparser run".into(),
            panel_url: String::new(),
            panel_token: String::new(),
            panel_delay_secs: 10,
            cache_path: String::new(),
            script_path: "humanitz-agent.js".into(),
            cache_max_age_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPvp {
    pub enabled: bool,
    /// Window bounds in minutes from midnight, bot time zone.
    pub start_minutes: u32,
    pub end_minutes: u32,
    /// Weekdays (0 = Sunday) the window applies on; empty means every day.
    pub days: Vec<u8>,
    /// Per-weekday window overrides.
    pub day_overrides: HashMap<u8, (u32, u32)>,
    /// Minutes of warning countdown before the toggle.
    pub restart_delay_minutes: u32,
    /// Rewrite the server name with a PvP suffix while the window is on.
    pub rewrite_server_name: bool,
    /// Remote path of the game server settings file.
    pub config_path: String,
}

impl Default for ConfigPvp {
    fn default() -> Self {
        Self {
            enabled: false,
            start_minutes: 1080,
            end_minutes: 1320,
            days: Vec::new(),
            day_overrides: HashMap::new(),
            restart_delay_minutes: 10,
            rewrite_server_name: false,
            config_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigTelemetry {
    /// IANA time zone the schedule math runs in.
    pub time_zone: String,
    /// Path of the sqlite database file.
    pub db_path: String,
    pub sftp: ConfigSftp,
    pub rcon: ConfigRcon,
    pub save: ConfigSave,
    pub agent: ConfigAgent,
    pub pvp: ConfigPvp,
}

impl Default for ConfigTelemetry {
    fn default() -> Self {
        Self {
            time_zone: "UTC".into(),
            db_path: "telemetry.db".into(),
            sftp: Default::default(),
            rcon: Default::default(),
            save: Default::default(),
            agent: Default::default(),
            pvp: Default::default(),
        }
    }
}

impl ConfigTelemetry {
    pub fn to_json_string(&self) -> anyhow::Result<String> {
        let res = serde_json::to_string_pretty(self)?;
        Ok(res)
    }

    pub fn from_json_string(json_str: &str) -> anyhow::Result<Self> {
        let res = serde_json::from_str(json_str)?;
        Ok(res)
    }

    /// Environment values override file values; keys are prefixed `HTZ_`.
    pub fn apply_env_overrides(&mut self) {
        let get = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        if let Some(v) = get("HTZ_TIME_ZONE") {
            self.time_zone = v;
        }
        if let Some(v) = get("HTZ_DB_PATH") {
            self.db_path = v;
        }
        if let Some(v) = get("HTZ_SFTP_HOST") {
            self.sftp.host = v;
        }
        if let Some(v) = get("HTZ_SFTP_PORT").and_then(|v| v.parse().ok()) {
            self.sftp.port = v;
        }
        if let Some(v) = get("HTZ_SFTP_USER") {
            self.sftp.user = v;
        }
        if let Some(v) = get("HTZ_SFTP_PASSWORD") {
            self.sftp.password = v;
        }
        if let Some(v) = get("HTZ_SFTP_KEY_PATH") {
            self.sftp.key_path = v;
        }
        if let Some(v) = get("HTZ_RCON_HOST") {
            self.rcon.host = v;
        }
        if let Some(v) = get("HTZ_RCON_PORT").and_then(|v| v.parse().ok()) {
            self.rcon.port = v;
        }
        if let Some(v) = get("HTZ_RCON_PASSWORD") {
            self.rcon.password = v;
        }
        if let Some(v) = get("HTZ_STATUS_CACHE_TTL").and_then(|v| v.parse().ok()) {
            self.rcon.status_cache_ttl_secs = v;
        }
        if let Some(v) = get("HTZ_SAVE_PATH") {
            self.save.save_path = v;
        }
        if let Some(v) = get("HTZ_CLAN_PATH") {
            self.save.clan_path = v;
        }
        if let Some(v) = get("HTZ_POLL_INTERVAL").and_then(|v| v.parse().ok()) {
            self.save.poll_interval_secs = v;
        }
        if let Some(v) = get("HTZ_SAVE_MODE").and_then(|v| parse_mode(&v)) {
            self.save.mode = v;
        }
        if let Some(v) = get("HTZ_AGENT_TRIGGER").and_then(|v| parse_trigger(&v)) {
            self.agent.trigger = v;
        }
        if let Some(v) = get("HTZ_AGENT_CONSOLE_COMMAND") {
            self.agent.console_command = v;
        }
        if let Some(v) = get("HTZ_AGENT_PANEL_DELAY").and_then(|v| v.parse().ok()) {
            self.agent.panel_delay_secs = v;
        }
        if let Some(v) = get("HTZ_AGENT_CACHE_PATH") {
            self.agent.cache_path = v;
        }
        if let Some(v) = get("HTZ_PVP_ENABLED").and_then(|v| v.parse().ok()) {
            self.pvp.enabled = v;
        }
        if let Some(v) = get("HTZ_PVP_START").and_then(|v| v.parse().ok()) {
            self.pvp.start_minutes = v;
        }
        if let Some(v) = get("HTZ_PVP_END").and_then(|v| v.parse().ok()) {
            self.pvp.end_minutes = v;
        }
        if let Some(v) = get("HTZ_PVP_DAYS") {
            self.pvp.days = v
                .split(',')
                .filter_map(|d| d.trim().parse().ok())
                .collect();
        }
        if let Some(v) = get("HTZ_PVP_RESTART_DELAY").and_then(|v| v.parse().ok()) {
            self.pvp.restart_delay_minutes = v;
        }
        if let Some(v) = get("HTZ_PVP_CONFIG_PATH") {
            self.pvp.config_path = v;
        }
    }
}

fn parse_mode(v: &str) -> Option<SaveMode> {
    match v.to_ascii_lowercase().as_str() {
        "direct" => Some(SaveMode::Direct),
        "agent" => Some(SaveMode::Agent),
        "auto" => Some(SaveMode::Auto),
        _ => None,
    }
}

fn parse_trigger(v: &str) -> Option<AgentTrigger> {
    match v.to_ascii_lowercase().as_str() {
        "panel" => Some(AgentTrigger::Panel),
        "ssh" => Some(AgentTrigger::Ssh),
        "none" => Some(AgentTrigger::None),
        "auto" => Some(AgentTrigger::Auto),
        _ => None,
    }
}
