use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use chrono::Utc;
use save_parser::{parse_clan_save, parse_save, ParsedClan, ParsedSave};
use serde_json::Value;
use telemetry_config::{AgentTrigger, ConfigAgent, ConfigSave, SaveMode};
use telemetry_store::Store;
use tokio::sync::{mpsc, Mutex as TokioMutex, Notify};

use crate::agent::build_agent_script;
use crate::cache::AgentCache;
use crate::panel::PanelApi;
use remote_io::{RemoteTransport, TransportError};

#[derive(Debug, Clone)]
pub enum ServiceEvent {
    Sync {
        mode: &'static str,
        player_count: usize,
        structure_count: usize,
        vehicle_count: usize,
        companion_count: usize,
        clan_count: usize,
        world_state: BTreeMap<String, Value>,
        elapsed: Duration,
        account_ids: Vec<String>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ServiceStats {
    pub sync_count: u64,
    pub last_error: Option<String>,
    pub last_save_mtime: Option<i64>,
    pub syncing: bool,
    pub mode: &'static str,
    pub agent_deployed: bool,
    pub agent_capable: Option<bool>,
    pub panel_capable: Option<bool>,
    pub resolved_trigger: Option<&'static str>,
}

#[derive(Default)]
struct PollState {
    last_save_mtime: Option<i64>,
    last_clan_mtime: Option<i64>,
    last_cache_mtime: Option<i64>,
    clans: Vec<ParsedClan>,
    fell_back_to_direct: bool,
    agent_deployed: bool,
    resolved_trigger: Option<AgentTrigger>,
    panel_capable: Option<bool>,
    agent_capable: Option<bool>,
}

/// Polled save-ingestion pipeline.
///
/// `direct` downloads and parses the whole binary save, `agent` runs the
/// remote parser and fetches its compact cache, `auto` tries `agent` once and
/// then remembers the direct fallback.
pub struct SaveService {
    store: Arc<Store>,
    transport: Arc<dyn RemoteTransport>,
    panel: Option<Arc<dyn PanelApi>>,
    save_cfg: ConfigSave,
    agent_cfg: ConfigAgent,
    name_overrides: parking_lot::Mutex<HashMap<String, String>>,
    state: TokioMutex<PollState>,
    syncing: AtomicBool,
    force: AtomicBool,
    notify: Notify,
    sync_count: AtomicU64,
    last_error: parking_lot::Mutex<Option<String>>,
    events: mpsc::UnboundedSender<ServiceEvent>,
}

impl SaveService {
    pub fn new(
        store: Arc<Store>,
        transport: Arc<dyn RemoteTransport>,
        panel: Option<Arc<dyn PanelApi>>,
        save_cfg: ConfigSave,
        agent_cfg: ConfigAgent,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServiceEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let svc = Arc::new(Self {
            store,
            transport,
            panel,
            save_cfg,
            agent_cfg,
            name_overrides: parking_lot::Mutex::new(HashMap::new()),
            state: TokioMutex::new(PollState::default()),
            syncing: AtomicBool::new(false),
            force: AtomicBool::new(false),
            notify: Notify::new(),
            sync_count: AtomicU64::new(0),
            last_error: parking_lot::Mutex::new(None),
            events,
        });
        (svc, events_rx)
    }

    /// External display-name resolution; overrides parsed names on sync.
    pub fn set_name_overrides(&self, overrides: HashMap<String, String>) {
        *self.name_overrides.lock() = overrides;
    }

    /// Fires an immediate poll, then keeps polling on the configured
    /// interval. A forced sync wakes the loop early.
    pub fn run(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let svc = self.clone();
        tokio::spawn(async move {
            svc.poll().await;
            let interval = Duration::from_secs(svc.save_cfg.poll_interval_secs.max(1));
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = svc.notify.notified() => {}
                }
                svc.poll().await;
            }
        })
    }

    /// Schedules an immediate sync; waits its turn behind an in-flight poll.
    pub fn force_sync(&self) {
        self.force.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub async fn poll(&self) {
        if self.syncing.swap(true, Ordering::SeqCst) {
            // an overlapping tick, the in-flight poll covers it
            return;
        }
        let forced = self.force.swap(false, Ordering::SeqCst);
        if let Err(err) = self.poll_inner(forced).await {
            let message = format!("{err:#}");
            log::warn!("save poll failed: {}", message);
            *self.last_error.lock() = Some(message.clone());
            let _ = self.events.send(ServiceEvent::Error { message });
        }
        self.syncing.store(false, Ordering::SeqCst);
    }

    pub async fn stats(&self) -> ServiceStats {
        let state = self.state.lock().await;
        let mode = match self.save_cfg.mode {
            SaveMode::Direct => "direct",
            SaveMode::Agent => "agent",
            SaveMode::Auto => {
                if state.fell_back_to_direct {
                    "direct"
                } else {
                    "auto"
                }
            }
        };
        ServiceStats {
            sync_count: self.sync_count.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
            last_save_mtime: state.last_save_mtime,
            syncing: self.syncing.load(Ordering::Relaxed),
            mode,
            agent_deployed: state.agent_deployed,
            agent_capable: state.agent_capable,
            panel_capable: state.panel_capable,
            resolved_trigger: state.resolved_trigger.map(trigger_name),
        }
    }

    async fn poll_inner(&self, forced: bool) -> anyhow::Result<()> {
        match self.save_cfg.mode {
            SaveMode::Direct => self.poll_direct(forced).await.map(|_| ()),
            SaveMode::Agent => {
                self.poll_agent(forced).await?;
                Ok(())
            }
            SaveMode::Auto => {
                let fell_back = self.state.lock().await.fell_back_to_direct;
                if fell_back {
                    return self.poll_direct(forced).await.map(|_| ());
                }
                match self.poll_agent(forced).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => {
                        log::info!("agent path unavailable, falling back to direct parse");
                    }
                    Err(err) => {
                        log::warn!("agent poll failed ({:#}), falling back to direct parse", err);
                    }
                }
                self.poll_direct(forced).await?;
                self.state.lock().await.fell_back_to_direct = true;
                Ok(())
            }
        }
    }

    async fn poll_direct(&self, forced: bool) -> anyhow::Result<bool> {
        let save_path = &self.save_cfg.save_path;
        let stat = self
            .transport
            .stat(save_path)
            .await?
            .ok_or_else(|| anyhow!("save file not found: {}", save_path))?;
        {
            let state = self.state.lock().await;
            if !forced && state.last_save_mtime == Some(stat.mtime_ms) {
                return Ok(false);
            }
        }

        let started = Instant::now();
        let data = self.transport.download(save_path).await?;
        let mut save = parse_save(&data)?;
        let clans = self.refresh_clans(forced).await;
        self.apply_name_overrides(&mut save);
        self.store
            .sync_from_save(&save, &clans, &BTreeMap::new())
            .await?;
        self.sync_world_extras(&save).await?;
        self.state.lock().await.last_save_mtime = Some(stat.mtime_ms);
        self.emit_sync("direct", &save, clans.len(), started.elapsed());
        Ok(true)
    }

    /// `Ok(true)` when the cache was synced or is unchanged, `Ok(false)` when
    /// the agent path is unavailable for this poll.
    async fn poll_agent(&self, forced: bool) -> anyhow::Result<bool> {
        let cache_path = self.cache_path();
        let trigger = self.resolve_trigger().await;

        let mut stat = self.transport.stat(&cache_path).await?;
        if let Some(stat) = &stat {
            let state = self.state.lock().await;
            if !forced && state.last_cache_mtime == Some(stat.mtime_ms) {
                return Ok(true);
            }
        }

        let max_age_ms = self.agent_cfg.cache_max_age_secs as i64 * 1000;
        let fresh = stat
            .map(|s| Utc::now().timestamp_millis() - s.mtime_ms < max_age_ms)
            .unwrap_or(false);

        if !fresh {
            stat = match trigger {
                AgentTrigger::Panel => {
                    let panel = self
                        .panel
                        .as_ref()
                        .ok_or_else(|| anyhow!("panel trigger selected but no panel api"))?;
                    panel
                        .send_console_command(&self.agent_cfg.console_command)
                        .await?;
                    tokio::time::sleep(Duration::from_secs(self.agent_cfg.panel_delay_secs))
                        .await;
                    self.transport.stat(&cache_path).await?
                }
                AgentTrigger::Ssh => {
                    self.deploy_agent_if_needed().await?;
                    let command = format!(
                        "node {} --save {} --output {}",
                        self.agent_cfg.script_path, self.save_cfg.save_path, cache_path
                    );
                    let out = self.transport.exec(&command).await?;
                    if out.code != 0 {
                        return Err(TransportError::AgentExited {
                            code: out.code,
                            stderr: out.stderr,
                        }
                        .into());
                    }
                    self.transport.stat(&cache_path).await?
                }
                AgentTrigger::None | AgentTrigger::Auto => return Ok(false),
            };
        }

        let Some(stat) = stat else {
            return Ok(false);
        };

        let started = Instant::now();
        let data = self.transport.download(&cache_path).await?;
        let cache = AgentCache::decode(&data)?;
        let mut save = cache.into_save();
        let clans = self.refresh_clans(forced).await;
        self.apply_name_overrides(&mut save);
        self.store
            .sync_from_save(&save, &clans, &BTreeMap::new())
            .await?;
        self.sync_world_extras(&save).await?;
        self.state.lock().await.last_cache_mtime = Some(stat.mtime_ms);
        self.emit_sync("agent", &save, clans.len(), started.elapsed());
        Ok(true)
    }


    /// The remaining world tables are replaced outside the main sync
    /// transaction, each atomically on its own.
    async fn sync_world_extras(&self, save: &ParsedSave) -> anyhow::Result<()> {
        self.store.replace_dead_bodies(&save.dead_bodies).await?;
        self.store.replace_containers(&save.containers).await?;
        self.store.replace_loot_actors(&save.loot_actors).await?;
        self.store.replace_quests(&save.quests).await?;
        Ok(())
    }

    /// Probes panel then ssh, once; the result sticks for the process
    /// lifetime.
    async fn resolve_trigger(&self) -> AgentTrigger {
        let mut state = self.state.lock().await;
        if let Some(trigger) = state.resolved_trigger {
            return trigger;
        }
        let resolved = match self.agent_cfg.trigger {
            AgentTrigger::Auto => {
                let panel_ok = match &self.panel {
                    Some(panel) => panel.available().await,
                    None => false,
                };
                state.panel_capable = Some(panel_ok);
                if panel_ok {
                    AgentTrigger::Panel
                } else {
                    let node_ok = matches!(
                        self.transport.exec("node --version").await,
                        Ok(out) if out.code == 0
                    );
                    state.agent_capable = Some(node_ok);
                    if node_ok {
                        AgentTrigger::Ssh
                    } else {
                        AgentTrigger::None
                    }
                }
            }
            other => other,
        };
        log::info!("agent trigger resolved to {}", trigger_name(resolved));
        state.resolved_trigger = Some(resolved);
        resolved
    }

    async fn deploy_agent_if_needed(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if state.agent_deployed {
            return Ok(());
        }
        let script = build_agent_script();
        self.transport
            .upload(&self.agent_cfg.script_path, script.as_bytes())
            .await?;
        log::info!(
            "deployed parser agent to {} ({} bytes)",
            self.agent_cfg.script_path,
            script.len()
        );
        state.agent_deployed = true;
        Ok(())
    }

    /// Clan data is optional; failures fall back to the last good parse.
    async fn refresh_clans(&self, forced: bool) -> Vec<ParsedClan> {
        if self.save_cfg.clan_path.is_empty() {
            return Vec::new();
        }
        let mut state = self.state.lock().await;
        let stat = match self.transport.stat(&self.save_cfg.clan_path).await {
            Ok(Some(stat)) => stat,
            Ok(None) => return state.clans.clone(),
            Err(err) => {
                log::warn!("clan file stat failed: {}", err);
                return state.clans.clone();
            }
        };
        if !forced && state.last_clan_mtime == Some(stat.mtime_ms) {
            return state.clans.clone();
        }
        match self.transport.download(&self.save_cfg.clan_path).await {
            Ok(data) => match parse_clan_save(&data) {
                Ok(clans) => {
                    state.last_clan_mtime = Some(stat.mtime_ms);
                    state.clans = clans.clone();
                    clans
                }
                Err(err) => {
                    log::warn!("clan file parse failed: {}", err);
                    state.clans.clone()
                }
            },
            Err(err) => {
                log::warn!("clan file download failed: {}", err);
                state.clans.clone()
            }
        }
    }

    fn cache_path(&self) -> String {
        if !self.agent_cfg.cache_path.is_empty() {
            return self.agent_cfg.cache_path.clone();
        }
        match self.save_cfg.save_path.rsplit_once('/') {
            Some((dir, _)) => format!("{}/humanitz-cache.json", dir),
            None => "humanitz-cache.json".to_string(),
        }
    }

    fn apply_name_overrides(&self, save: &mut ParsedSave) {
        let overrides = self.name_overrides.lock();
        for (account, name) in overrides.iter() {
            if let Some(player) = save.players.get_mut(account) {
                player.name = name.clone();
            }
        }
    }

    fn emit_sync(&self, mode: &'static str, save: &ParsedSave, clan_count: usize, elapsed: Duration) {
        self.sync_count.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "synced {} players, {} structures, {} vehicles in {:?} via {}",
            save.players.len(),
            save.structures.len(),
            save.vehicles.len(),
            elapsed,
            mode
        );
        let _ = self.events.send(ServiceEvent::Sync {
            mode,
            player_count: save.players.len(),
            structure_count: save.structures.len(),
            vehicle_count: save.vehicles.len(),
            companion_count: save.companions.len(),
            clan_count,
            world_state: save.world_state.clone(),
            elapsed,
            account_ids: save.players.keys().cloned().collect(),
        });
    }
}

fn trigger_name(trigger: AgentTrigger) -> &'static str {
    match trigger {
        AgentTrigger::Panel => "panel",
        AgentTrigger::Ssh => "ssh",
        AgentTrigger::None => "none",
        AgentTrigger::Auto => "auto",
    }
}
