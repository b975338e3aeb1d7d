use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{arg, command, Command};
use pvp_scheduler::{LogOperator, PvpScheduler, RconControl};
use rcon::{RconClient, RconConfig, RconEvent};
use remote_io::{SftpOptions, SftpTransport};
use save_service::{HttpPanel, PanelApi, SaveService, ServiceEvent};
use telemetry_config::ConfigTelemetry;
use telemetry_store::Store;

fn load_config(path: Option<&str>) -> anyhow::Result<ConfigTelemetry> {
    let mut cfg = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            ConfigTelemetry::from_json_string(&raw)?
        }
        None => ConfigTelemetry::default(),
    };
    cfg.apply_env_overrides();
    Ok(cfg)
}

fn sftp_options(cfg: &ConfigTelemetry) -> SftpOptions {
    SftpOptions {
        host: cfg.sftp.host.clone(),
        port: cfg.sftp.port,
        user: cfg.sftp.user.clone(),
        password: cfg.sftp.password.clone(),
        key_path: cfg.sftp.key_path.clone(),
        exec_timeout: Duration::from_secs(cfg.sftp.exec_timeout_secs),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = command!()
        .subcommand(Command::new("default_config").about("Print the default config"))
        .arg(arg!(-c --config <cfg> "A relative path to a config file, used instead of env-only configuration."))
        .get_matches();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    if matches
        .subcommand_name()
        .is_some_and(|cmd| cmd == "default_config")
    {
        println!("{}", ConfigTelemetry::default().to_json_string()?);
        return Ok(());
    }

    let cfg = load_config(matches.get_one::<String>("config").map(String::as_str))?;

    let store = Arc::new(Store::open(Path::new(&cfg.db_path)).await?);
    let transport = Arc::new(SftpTransport::new(sftp_options(&cfg)));

    let panel: Option<Arc<dyn PanelApi>> = if cfg.agent.panel_url.is_empty() {
        None
    } else {
        Some(Arc::new(HttpPanel::new(
            cfg.agent.panel_url.clone(),
            cfg.agent.panel_token.clone(),
        )))
    };

    let (service, mut service_events) = SaveService::new(
        store.clone(),
        transport.clone(),
        panel,
        cfg.save.clone(),
        cfg.agent.clone(),
    );
    let _poll_task = service.run();

    tokio::spawn(async move {
        while let Some(event) = service_events.recv().await {
            match event {
                ServiceEvent::Sync {
                    mode,
                    player_count,
                    structure_count,
                    ..
                } => log::info!(
                    "sync via {}: {} players, {} structures",
                    mode,
                    player_count,
                    structure_count
                ),
                ServiceEvent::Error { message } => log::warn!("sync error: {}", message),
            }
        }
    });

    let mut rcon_client = None;
    if !cfg.rcon.host.is_empty() {
        let (client, mut rcon_events) = RconClient::new(RconConfig {
            host: cfg.rcon.host.clone(),
            port: cfg.rcon.port,
            password: cfg.rcon.password.clone(),
            ..Default::default()
        });
        if let Err(err) = client.connect().await {
            log::warn!("initial rcon connect failed: {}", err);
        }
        tokio::spawn(async move {
            while let Some(event) = rcon_events.recv().await {
                match event {
                    RconEvent::Disconnect { reason } => {
                        log::warn!("rcon down: {}", reason);
                    }
                    RconEvent::Reconnect { downtime } => {
                        log::info!("rcon back after {:?}", downtime);
                    }
                }
            }
        });
        rcon_client = Some(client);
    }

    let mut _pvp_task = None;
    if cfg.pvp.enabled {
        let client = rcon_client
            .clone()
            .ok_or_else(|| anyhow::anyhow!("PvP scheduler needs an RCON connection"))?;
        let tz: chrono_tz::Tz = cfg
            .time_zone
            .parse()
            .map_err(|err| anyhow::anyhow!("bad time zone {:?}: {}", cfg.time_zone, err))?;
        let scheduler = PvpScheduler::new(
            cfg.pvp.clone(),
            tz,
            transport.clone(),
            Arc::new(RconControl::new(client)),
            Arc::new(LogOperator),
        )?;
        _pvp_task = Some(scheduler.start().await);
    }

    log::info!("telemetry core running, db at {}", cfg.db_path);
    tokio::signal::ctrl_c().await?;
    log::info!("shutting down");
    Ok(())
}
