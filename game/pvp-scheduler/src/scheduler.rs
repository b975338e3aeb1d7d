use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Datelike, Timelike, Utc};
use chrono_tz::Tz;
use rcon::RconClient;
use remote_io::RemoteTransport;
use telemetry_config::ConfigPvp;
use thiserror::Error;

use crate::config_file;
use crate::window::{warning_ladder, PvpWindow};

#[derive(Debug, Error)]
pub enum ToggleError {
    #[error("expected PVP= line missing from the server config")]
    ConfigFileShape,
}

/// In-game side of the scheduler: broadcasts and console commands.
#[async_trait]
pub trait GameControl: Send + Sync {
    async fn broadcast(&self, message: &str) -> anyhow::Result<()>;
    async fn command(&self, command: &str) -> anyhow::Result<String>;
}

pub struct RconControl {
    client: RconClient,
}

impl RconControl {
    pub fn new(client: RconClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GameControl for RconControl {
    async fn broadcast(&self, message: &str) -> anyhow::Result<()> {
        self.client.send(&format!("broadcast {}", message)).await?;
        Ok(())
    }

    async fn command(&self, command: &str) -> anyhow::Result<String> {
        Ok(self.client.send(command).await?)
    }
}

/// Where operator-facing announcements go (chat channel, log, ...).
#[async_trait]
pub trait OperatorChannel: Send + Sync {
    async fn announce(&self, message: &str);
}

/// Announcement sink that only logs; used when no chat layer is attached.
pub struct LogOperator;

#[async_trait]
impl OperatorChannel for LogOperator {
    async fn announce(&self, message: &str) {
        log::info!("announce: {}", message);
    }
}

/// Minute-tick state machine toggling the `PVP=` flag of the remote server
/// config according to the recurring window, with a staged warning countdown
/// and a restart to apply the change.
pub struct PvpScheduler {
    cfg: ConfigPvp,
    tz: Tz,
    window: PvpWindow,
    transport: Arc<dyn RemoteTransport>,
    game: Arc<dyn GameControl>,
    operator: Arc<dyn OperatorChannel>,
    /// `None` means the config could not be read yet.
    current_pvp: parking_lot::Mutex<Option<bool>>,
    transitioning: AtomicBool,
    cached_base_name: parking_lot::Mutex<Option<String>>,
    /// Countdown time base, shrunk in tests.
    minute: Duration,
}

impl PvpScheduler {
    pub fn new(
        cfg: ConfigPvp,
        tz: Tz,
        transport: Arc<dyn RemoteTransport>,
        game: Arc<dyn GameControl>,
        operator: Arc<dyn OperatorChannel>,
    ) -> anyhow::Result<Arc<Self>> {
        Self::build(cfg, tz, transport, game, operator, Duration::from_secs(60))
    }

    fn build(
        cfg: ConfigPvp,
        tz: Tz,
        transport: Arc<dyn RemoteTransport>,
        game: Arc<dyn GameControl>,
        operator: Arc<dyn OperatorChannel>,
        minute: Duration,
    ) -> anyhow::Result<Arc<Self>> {
        anyhow::ensure!(
            cfg.start_minutes != cfg.end_minutes,
            "PvP window start and end must differ"
        );
        let window = PvpWindow {
            start_minutes: cfg.start_minutes,
            end_minutes: cfg.end_minutes,
            days: cfg.days.clone(),
            day_overrides: cfg.day_overrides.clone(),
        };
        Ok(Arc::new(Self {
            cfg,
            tz,
            window,
            transport,
            game,
            operator,
            current_pvp: parking_lot::Mutex::new(None),
            transitioning: AtomicBool::new(false),
            cached_base_name: parking_lot::Mutex::new(None),
            minute,
        }))
    }

    /// Reads the current flag, then ticks every minute.
    pub async fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.refresh_current_state().await;
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                scheduler.tick().await;
            }
        })
    }

    pub fn current_pvp(&self) -> Option<bool> {
        *self.current_pvp.lock()
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning.load(Ordering::SeqCst)
    }

    pub async fn refresh_current_state(&self) {
        match self.transport.download(&self.cfg.config_path).await {
            Ok(data) => {
                let content = String::from_utf8_lossy(&data);
                let flag = config_file::read_pvp_flag(&content).unwrap_or(false);
                *self.current_pvp.lock() = Some(flag);
                log::info!("PvP flag currently {}", if flag { "on" } else { "off" });
            }
            Err(err) => {
                log::warn!("could not read server config: {}", err);
                *self.current_pvp.lock() = None;
            }
        }
    }

    pub async fn tick(self: &Arc<Self>) {
        let now = Utc::now().with_timezone(&self.tz);
        let weekday = now.weekday().num_days_from_sunday() as u8;
        let minutes = now.hour() * 60 + now.minute();
        self.tick_at(weekday, minutes).await;
    }

    pub async fn tick_at(self: &Arc<Self>, weekday: u8, now_minutes: u32) {
        if self.transitioning.load(Ordering::SeqCst) {
            return;
        }
        let current_pvp = *self.current_pvp.lock();
        let current = match current_pvp {
            Some(current) => current,
            None => {
                self.refresh_current_state().await;
                return;
            }
        };
        let Some((minutes_until, target)) = self.window.next_transition(weekday, now_minutes)
        else {
            return;
        };
        if target == current {
            return;
        }
        if minutes_until <= self.cfg.restart_delay_minutes {
            self.transitioning.store(true, Ordering::SeqCst);
            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.countdown(minutes_until, target).await;
            });
        }
    }

    async fn countdown(self: Arc<Self>, minutes_until: u32, target: bool) {
        let action = if target { "enabled" } else { "disabled" };
        let ladder = warning_ladder(minutes_until);
        log::info!("PvP will be {} in {} min, warnings at {:?}", action, minutes_until, ladder);

        for (i, warn) in ladder.iter().enumerate() {
            if *warn > 0 {
                let message = format!(
                    "PvP will be {} in {} minute{} (server restart)",
                    action,
                    warn,
                    if *warn == 1 { "" } else { "s" }
                );
                self.operator.announce(&message).await;
                if let Err(err) = self.game.broadcast(&message).await {
                    log::warn!("broadcast failed: {:#}", err);
                }
            }
            let next = ladder.get(i + 1).copied().unwrap_or(0);
            let wait = warn.saturating_sub(next);
            tokio::time::sleep(self.minute * wait).await;
        }

        if let Err(err) = self.toggle(target).await {
            log::error!("PvP toggle failed: {:#}", err);
            self.operator
                .announce(&format!("PvP toggle failed: {:#}", err))
                .await;
        }
        self.transitioning.store(false, Ordering::SeqCst);
    }

    async fn toggle(&self, target: bool) -> anyhow::Result<()> {
        let data = self
            .transport
            .download(&self.cfg.config_path)
            .await
            .context("server config download failed")?;
        let original = String::from_utf8_lossy(&data).into_owned();
        let mut updated =
            config_file::set_pvp_flag(&original, target).ok_or(ToggleError::ConfigFileShape)?;

        if self.cfg.rewrite_server_name {
            if let Some(name) = config_file::read_server_name(&updated) {
                let base = {
                    let mut cached = self.cached_base_name.lock();
                    cached
                        .get_or_insert_with(|| config_file::strip_pvp_suffix(&name))
                        .clone()
                };
                let new_name = if target {
                    format!(
                        "{} {}",
                        base,
                        config_file::pvp_suffix(
                            self.cfg.start_minutes,
                            self.cfg.end_minutes,
                            self.tz.name()
                        )
                    )
                } else {
                    base
                };
                if let Some(rewritten) = config_file::set_server_name(&updated, &new_name) {
                    updated = rewritten;
                }
            }
        }

        if updated != original {
            self.transport
                .upload(&self.cfg.config_path, updated.as_bytes())
                .await
                .context("server config upload failed")?;
        }

        let message = format!(
            "PvP is now {}, restarting server to apply",
            if target { "enabled" } else { "disabled" }
        );
        self.operator.announce(&message).await;
        if let Err(err) = self.game.broadcast(&message).await {
            log::warn!("broadcast failed: {:#}", err);
        }

        if let Err(first) = self.game.command("RestartNow").await {
            log::warn!("RestartNow failed ({:#}), trying QuickRestart", first);
            self.game
                .command("QuickRestart")
                .await
                .context("both restart commands failed")?;
        }

        *self.current_pvp.lock() = Some(target);
        Ok(())
    }
}
