use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{SecondsFormat, Utc};
use save_parser::{
    ParsedClan, ParsedCompanion, ParsedContainer, ParsedDeadBody, ParsedLootActor, ParsedPlayer,
    ParsedQuest, ParsedSave, ParsedStructure, ParsedVehicle,
};
use serde_json::{json, Value};
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions, SqliteRow,
};
use sqlx::{query::Query, Row, SqliteConnection};

use crate::rows::{LeaderboardRow, LogCounters, LogEventKind, PlayerRecord, ServerTotals};
use crate::schema::{migrations_after, REFERENCE_TABLES, SCHEMA_V1, SCHEMA_VERSION};

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Bind argument for the looped binder below.
enum Arg {
    I64(i64),
    F64(f64),
    OptF64(Option<f64>),
    Text(String),
}

fn bind_args<'q>(
    mut q: Query<'q, Sqlite, SqliteArguments<'q>>,
    args: Vec<Arg>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for arg in args {
        q = match arg {
            Arg::I64(v) => q.bind(v),
            Arg::F64(v) => q.bind(v),
            Arg::OptF64(v) => q.bind(v),
            Arg::Text(v) => q.bind(v),
        };
    }
    q
}

/// JSON column text; null collapses to an empty array.
fn json_arg(v: &Value) -> String {
    if v.is_null() {
        "[]".to_string()
    } else {
        v.to_string()
    }
}

fn decode_json(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Embedded relational store over sqlite.
///
/// Single-writer topology: the pool holds one connection, so every mutating
/// entry point executes serially and a read after a write sees committed
/// state.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::open_with(opts).await
    }

    pub async fn open_in_memory() -> anyhow::Result<Self> {
        Self::open_with(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn open_with(opts: SqliteConnectOptions) -> anyhow::Result<Self> {
        let opts = opts
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            // hot statements stay prepared on the connection
            .statement_cache_capacity(256);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Creates the schema and walks the migration ladder, all in one
    /// transaction.
    async fn init(&self) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for stmt in SCHEMA_V1 {
            sqlx::query(stmt).execute(&mut tx).await?;
        }
        let version: Option<i64> =
            sqlx::query("SELECT value FROM meta WHERE key = 'schema_version'")
                .fetch_optional(&mut tx)
                .await?
                .and_then(|row| row.try_get::<String, _>(0).ok())
                .and_then(|v| v.parse().ok());
        match version {
            None => {
                sqlx::query("INSERT INTO meta (key, value) VALUES ('schema_version', ?)")
                    .bind(SCHEMA_VERSION.to_string())
                    .execute(&mut tx)
                    .await?;
            }
            Some(v) if v < SCHEMA_VERSION => {
                for (version, stmts) in migrations_after(v) {
                    for stmt in stmts {
                        sqlx::query(stmt).execute(&mut tx).await?;
                    }
                    sqlx::query("UPDATE meta SET value = ? WHERE key = 'schema_version'")
                        .bind(version.to_string())
                        .execute(&mut tx)
                        .await?;
                }
                sqlx::query("UPDATE meta SET value = ? WHERE key = 'schema_version'")
                    .bind(SCHEMA_VERSION.to_string())
                    .execute(&mut tx)
                    .await?;
            }
            Some(_) => {}
        }
        tx.commit().await?;
        Ok(())
    }

    // players

    pub async fn upsert_player(&self, steam_id: &str, player: &ParsedPlayer) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_player_conn(&mut tx, steam_id, player).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_player(&self, steam_id: &str) -> anyhow::Result<Option<PlayerRecord>> {
        let row = sqlx::query("SELECT * FROM players WHERE steam_id = ?")
            .bind(steam_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| player_from_row(&r)).transpose()
    }

    pub async fn get_players_online(&self) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query("SELECT steam_id FROM players WHERE online = 1 ORDER BY steam_id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| Ok(r.try_get::<String, _>(0)?))
            .collect()
    }

    pub async fn get_account_ids(&self) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query("SELECT steam_id FROM players ORDER BY steam_id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| Ok(r.try_get::<String, _>(0)?))
            .collect()
    }

    // log-derived mutations (fed by the external log tailer)

    pub async fn record_log_event(
        &self,
        steam_id: &str,
        kind: LogEventKind,
    ) -> anyhow::Result<()> {
        let now = now_iso();
        let mut tx = self.pool.begin().await?;
        ensure_player(&mut tx, steam_id, &now).await?;
        let sql = format!(
            "UPDATE players SET {col} = {col} + ?, log_last_event = ?, updated_at = ?
             WHERE steam_id = ?",
            col = kind.column()
        );
        sqlx::query(&sql)
            .bind(kind.increment())
            .bind(&now)
            .bind(&now)
            .bind(steam_id)
            .execute(&mut tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn set_online(&self, steam_id: &str, online: bool) -> anyhow::Result<()> {
        let now = now_iso();
        let mut tx = self.pool.begin().await?;
        ensure_player(&mut tx, steam_id, &now).await?;
        sqlx::query(
            "UPDATE players SET
                session_count = session_count + (CASE WHEN online = 0 AND ? THEN 1 ELSE 0 END),
                online = ?, last_seen = ?, updated_at = ?
             WHERE steam_id = ?",
        )
        .bind(online)
        .bind(online)
        .bind(&now)
        .bind(&now)
        .bind(steam_id)
        .execute(&mut tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn add_playtime(&self, steam_id: &str, seconds: i64) -> anyhow::Result<()> {
        let now = now_iso();
        let mut tx = self.pool.begin().await?;
        ensure_player(&mut tx, steam_id, &now).await?;
        sqlx::query(
            "UPDATE players SET playtime_seconds = playtime_seconds + ?, updated_at = ?
             WHERE steam_id = ?",
        )
        .bind(seconds)
        .bind(&now)
        .bind(steam_id)
        .execute(&mut tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Sets the display name, pushing the previous one onto the name history.
    pub async fn record_name(&self, steam_id: &str, name: &str) -> anyhow::Result<()> {
        let now = now_iso();
        let mut tx = self.pool.begin().await?;
        ensure_player(&mut tx, steam_id, &now).await?;
        record_name_conn(&mut tx, steam_id, name, &now).await?;
        tx.commit().await?;
        Ok(())
    }

    // save sync

    /// Applies one parsed save snapshot atomically: player upserts,
    /// world-state upserts, replace-all world entities, clan membership,
    /// server settings.
    pub async fn sync_from_save(
        &self,
        save: &ParsedSave,
        clans: &[ParsedClan],
        server_settings: &BTreeMap<String, Value>,
    ) -> anyhow::Result<()> {
        let now = now_iso();
        let mut tx = self.pool.begin().await?;

        for (steam_id, player) in &save.players {
            upsert_player_conn(&mut tx, steam_id, player).await?;
        }

        for (key, value) in &save.world_state {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            sqlx::query(
                "INSERT INTO world_state (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(text)
            .execute(&mut tx)
            .await?;
        }

        sqlx::query("DELETE FROM structures").execute(&mut tx).await?;
        for s in &save.structures {
            insert_structure(&mut tx, s).await?;
        }

        sqlx::query("DELETE FROM vehicles").execute(&mut tx).await?;
        for v in &save.vehicles {
            insert_vehicle(&mut tx, v).await?;
        }

        sqlx::query("DELETE FROM companions").execute(&mut tx).await?;
        for c in &save.companions {
            insert_companion(&mut tx, c).await?;
        }

        for clan in clans {
            sqlx::query(
                "INSERT INTO clans (name, created_at) VALUES (?, ?)
                 ON CONFLICT(name) DO NOTHING",
            )
            .bind(&clan.name)
            .bind(&now)
            .execute(&mut tx)
            .await?;
            sqlx::query("DELETE FROM clan_members WHERE clan_name = ?")
                .bind(&clan.name)
                .execute(&mut tx)
                .await?;
            for m in &clan.members {
                sqlx::query(
                    "INSERT INTO clan_members
                        (clan_name, account_id, name, rank, can_invite, can_kick)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(&clan.name)
                .bind(&m.account_id)
                .bind(&m.name)
                .bind(&m.rank)
                .bind(m.can_invite)
                .bind(m.can_kick)
                .execute(&mut tx)
                .await?;
            }
        }

        for (key, value) in server_settings {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            sqlx::query(
                "INSERT INTO server_settings (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(text)
            .execute(&mut tx)
            .await?;
        }

        set_meta_conn(&mut tx, "last_sync_time", &now).await?;
        set_meta_conn(&mut tx, "last_player_count", &save.players.len().to_string()).await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn replace_dead_bodies(&self, rows: &[ParsedDeadBody]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM dead_bodies").execute(&mut tx).await?;
        for b in rows {
            sqlx::query(
                "INSERT INTO dead_bodies (id, name, owner_steam_id, x, y, z, inventory)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(b.id)
            .bind(&b.name)
            .bind(&b.owner_steam_id)
            .bind(b.x)
            .bind(b.y)
            .bind(b.z)
            .bind(json_arg(&b.inventory))
            .execute(&mut tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn replace_containers(&self, rows: &[ParsedContainer]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM containers").execute(&mut tx).await?;
        for c in rows {
            sqlx::query(
                "INSERT INTO containers (id, name, x, y, z, items) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(c.id)
            .bind(&c.name)
            .bind(c.x)
            .bind(c.y)
            .bind(c.z)
            .bind(json_arg(&c.items))
            .execute(&mut tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn replace_loot_actors(&self, rows: &[ParsedLootActor]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM loot_actors").execute(&mut tx).await?;
        for l in rows {
            sqlx::query(
                "INSERT INTO loot_actors (id, class, x, y, z, items) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(l.id)
            .bind(&l.class)
            .bind(l.x)
            .bind(l.y)
            .bind(l.z)
            .bind(json_arg(&l.items))
            .execute(&mut tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn replace_quests(&self, rows: &[ParsedQuest]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM quests").execute(&mut tx).await?;
        for q in rows {
            sqlx::query("INSERT INTO quests (id, name, data) VALUES (?, ?, ?)")
                .bind(q.id)
                .bind(&q.name)
                .bind(json_arg(&q.data))
                .execute(&mut tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // leaderboards

    pub async fn top_killers(&self, limit: i64) -> anyhow::Result<Vec<LeaderboardRow>> {
        self.leaderboard("lifetime_kills", limit).await
    }

    pub async fn top_playtime(&self, limit: i64) -> anyhow::Result<Vec<LeaderboardRow>> {
        self.leaderboard("playtime_seconds", limit).await
    }

    pub async fn top_survivors(&self, limit: i64) -> anyhow::Result<Vec<LeaderboardRow>> {
        self.leaderboard("lifetime_days_survived", limit).await
    }

    pub async fn top_fishers(&self, limit: i64) -> anyhow::Result<Vec<LeaderboardRow>> {
        self.leaderboard("fish_caught", limit).await
    }

    pub async fn top_bitten(&self, limit: i64) -> anyhow::Result<Vec<LeaderboardRow>> {
        self.leaderboard("times_bitten", limit).await
    }

    pub async fn top_pvp(&self, limit: i64) -> anyhow::Result<Vec<LeaderboardRow>> {
        self.leaderboard("log_pvp_kills", limit).await
    }

    async fn leaderboard(
        &self,
        column: &'static str,
        limit: i64,
    ) -> anyhow::Result<Vec<LeaderboardRow>> {
        let sql = format!(
            "SELECT steam_id, name, {column} AS value FROM players
             WHERE {column} > 0 ORDER BY {column} DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|r| {
                Ok(LeaderboardRow {
                    steam_id: r.try_get("steam_id")?,
                    name: r.try_get("name")?,
                    value: r.try_get("value")?,
                })
            })
            .collect()
    }

    pub async fn get_server_totals(&self) -> anyhow::Result<ServerTotals> {
        let r = sqlx::query(
            "SELECT
                COUNT(*) AS total_players,
                COALESCE(SUM(online), 0) AS online_players,
                COALESCE(SUM(lifetime_kills), 0) AS lifetime_kills,
                COALESCE(SUM(lifetime_headshots), 0) AS lifetime_headshots,
                COALESCE(SUM(lifetime_days_survived), 0) AS lifetime_days_survived,
                COALESCE(SUM(log_deaths), 0) AS log_deaths,
                COALESCE(SUM(log_pvp_kills), 0) AS log_pvp_kills,
                COALESCE(SUM(log_builds), 0) AS log_builds,
                COALESCE(SUM(log_loots), 0) AS log_loots,
                COALESCE(SUM(fish_caught), 0) AS fish_caught,
                COALESCE(SUM(playtime_seconds), 0) AS playtime_seconds
             FROM players",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(ServerTotals {
            total_players: r.try_get("total_players")?,
            online_players: r.try_get("online_players")?,
            lifetime_kills: r.try_get("lifetime_kills")?,
            lifetime_headshots: r.try_get("lifetime_headshots")?,
            lifetime_days_survived: r.try_get("lifetime_days_survived")?,
            log_deaths: r.try_get("log_deaths")?,
            log_pvp_kills: r.try_get("log_pvp_kills")?,
            log_builds: r.try_get("log_builds")?,
            log_loots: r.try_get("log_loots")?,
            fish_caught: r.try_get("fish_caught")?,
            playtime_seconds: r.try_get("playtime_seconds")?,
        })
    }

    // snapshots

    pub async fn create_snapshot(
        &self,
        kind: &str,
        account_id: &str,
        payload: &Value,
    ) -> anyhow::Result<i64> {
        let res = sqlx::query(
            "INSERT INTO snapshots (type, account_id, payload, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(kind)
        .bind(account_id)
        .bind(payload.to_string())
        .bind(now_iso())
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn get_latest_snapshot(
        &self,
        kind: &str,
        account_id: &str,
    ) -> anyhow::Result<Option<(Value, String)>> {
        let row = sqlx::query(
            "SELECT payload, created_at FROM snapshots
             WHERE type = ? AND account_id = ?
             ORDER BY id DESC LIMIT 1",
        )
        .bind(kind)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| {
            let payload: String = r.try_get("payload")?;
            let created_at: String = r.try_get("created_at")?;
            Ok((decode_json(&payload), created_at))
        })
        .transpose()
    }

    /// `age` is a sqlite datetime modifier such as `-7 days`.
    pub async fn purge_snapshots(&self, age: &str) -> anyhow::Result<u64> {
        let res = sqlx::query(
            "DELETE FROM snapshots WHERE datetime(created_at) < datetime('now', ?)",
        )
        .bind(age)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    // readers

    pub async fn get_world_state(&self) -> anyhow::Result<BTreeMap<String, Value>> {
        let rows = sqlx::query("SELECT key, value FROM world_state")
            .fetch_all(&self.pool)
            .await?;
        let mut out = BTreeMap::new();
        for r in rows {
            let key: String = r.try_get("key")?;
            let text: String = r.try_get("value")?;
            // numeric and structured values parse back, everything else
            // stays a string
            out.insert(key, decode_json(&text));
        }
        Ok(out)
    }

    pub async fn get_server_settings(&self) -> anyhow::Result<BTreeMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM server_settings")
            .fetch_all(&self.pool)
            .await?;
        let mut out = BTreeMap::new();
        for r in rows {
            out.insert(r.try_get("key")?, r.try_get("value")?);
        }
        Ok(out)
    }

    pub async fn get_structures(&self) -> anyhow::Result<Vec<ParsedStructure>> {
        let rows = sqlx::query("SELECT * FROM structures ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| {
                Ok(ParsedStructure {
                    id: r.try_get("id")?,
                    class: r.try_get("class")?,
                    name: r.try_get("name")?,
                    owner_steam_id: r.try_get("owner_steam_id")?,
                    x: r.try_get("x")?,
                    y: r.try_get("y")?,
                    z: r.try_get("z")?,
                    health: r.try_get("health")?,
                    max_health: r.try_get("max_health")?,
                    upgrade_level: r.try_get("upgrade_level")?,
                    attached_to_trailer: r.try_get::<i64, _>("attached_to_trailer")? != 0,
                    inventory: decode_json(&r.try_get::<String, _>("inventory")?),
                    no_spawn: r.try_get::<i64, _>("no_spawn")? != 0,
                    extra: r.try_get("extra")?,
                })
            })
            .collect()
    }

    pub async fn get_vehicles(&self) -> anyhow::Result<Vec<ParsedVehicle>> {
        let rows = sqlx::query("SELECT * FROM vehicles ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| {
                Ok(ParsedVehicle {
                    id: r.try_get("id")?,
                    class: r.try_get("class")?,
                    name: r.try_get("name")?,
                    x: r.try_get("x")?,
                    y: r.try_get("y")?,
                    z: r.try_get("z")?,
                    health: r.try_get("health")?,
                    max_health: r.try_get("max_health")?,
                    fuel: r.try_get("fuel")?,
                    inventory: decode_json(&r.try_get::<String, _>("inventory")?),
                    upgrades: decode_json(&r.try_get::<String, _>("upgrades")?),
                    extra: r.try_get("extra")?,
                })
            })
            .collect()
    }

    pub async fn get_companions(&self) -> anyhow::Result<Vec<ParsedCompanion>> {
        let rows = sqlx::query("SELECT * FROM companions ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| {
                Ok(ParsedCompanion {
                    id: r.try_get("id")?,
                    kind: r.try_get("kind")?,
                    actor_name: r.try_get("actor_name")?,
                    owner_steam_id: r.try_get("owner_steam_id")?,
                    x: r.try_get("x")?,
                    y: r.try_get("y")?,
                    z: r.try_get("z")?,
                    health: r.try_get("health")?,
                    extra: decode_json(&r.try_get::<String, _>("extra")?),
                })
            })
            .collect()
    }

    pub async fn get_clans(&self) -> anyhow::Result<Vec<ParsedClan>> {
        let clan_rows = sqlx::query("SELECT name FROM clans ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        let mut clans = Vec::with_capacity(clan_rows.len());
        for clan_row in clan_rows {
            let name: String = clan_row.try_get("name")?;
            let member_rows = sqlx::query(
                "SELECT account_id, name, rank, can_invite, can_kick
                 FROM clan_members WHERE clan_name = ? ORDER BY account_id",
            )
            .bind(&name)
            .fetch_all(&self.pool)
            .await?;
            let members = member_rows
                .iter()
                .map(|r| {
                    Ok(save_parser::ParsedClanMember {
                        account_id: r.try_get("account_id")?,
                        name: r.try_get("name")?,
                        rank: r.try_get("rank")?,
                        can_invite: r.try_get::<i64, _>("can_invite")? != 0,
                        can_kick: r.try_get::<i64, _>("can_kick")? != 0,
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            clans.push(ParsedClan { name, members });
        }
        Ok(clans)
    }

    // reference data

    pub async fn replace_reference(
        &self,
        table: &str,
        rows: &[(String, String, Value)],
    ) -> anyhow::Result<()> {
        if !REFERENCE_TABLES.contains(&table) {
            return Err(anyhow!("unknown reference table {table:?}"));
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut tx)
            .await?;
        let sql = format!("INSERT INTO {table} (id, name, data) VALUES (?, ?, ?)");
        for (id, name, data) in rows {
            sqlx::query(&sql)
                .bind(id)
                .bind(name)
                .bind(json_arg(data))
                .execute(&mut tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_reference(
        &self,
        table: &str,
    ) -> anyhow::Result<Vec<(String, String, Value)>> {
        if !REFERENCE_TABLES.contains(&table) {
            return Err(anyhow!("unknown reference table {table:?}"));
        }
        let rows = sqlx::query(&format!("SELECT id, name, data FROM {table} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| {
                Ok((
                    r.try_get("id")?,
                    r.try_get("name")?,
                    decode_json(&r.try_get::<String, _>("data")?),
                ))
            })
            .collect()
    }

    // meta

    pub async fn set_meta(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        set_meta_conn(&mut tx, key, value).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_meta(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Ok(r.try_get(0)?)).transpose()
    }
}

async fn set_meta_conn(
    conn: &mut SqliteConnection,
    key: &str,
    value: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO meta (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(conn)
    .await?;
    Ok(())
}

async fn ensure_player(
    conn: &mut SqliteConnection,
    steam_id: &str,
    now: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO players (steam_id, first_seen, last_seen, updated_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(steam_id)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

async fn record_name_conn(
    conn: &mut SqliteConnection,
    steam_id: &str,
    name: &str,
    now: &str,
) -> anyhow::Result<()> {
    let row = sqlx::query("SELECT name, name_history FROM players WHERE steam_id = ?")
        .bind(steam_id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else { return Ok(()) };
    let old_name: String = row.try_get("name")?;
    if old_name == name || name.is_empty() {
        return Ok(());
    }
    let mut history = decode_json(&row.try_get::<String, _>("name_history")?);
    if !old_name.is_empty() {
        if let Value::Array(list) = &mut history {
            list.push(json!({"name": old_name, "until": now}));
        }
    }
    sqlx::query(
        "UPDATE players SET name = ?, name_history = ?, updated_at = ? WHERE steam_id = ?",
    )
    .bind(name)
    .bind(history.to_string())
    .bind(now)
    .bind(steam_id)
    .execute(conn)
    .await?;
    Ok(())
}

const UPSERT_PLAYER_SQL: &str = "INSERT INTO players (
    steam_id, name, male, profession, affliction, appearance,
    kills, headshots, melee_kills, firearm_kills, blast_kills, unarmed_kills,
    takedown_kills, vehicle_kills,
    lifetime_kills, lifetime_headshots, lifetime_melee_kills, lifetime_firearm_kills,
    lifetime_blast_kills, lifetime_unarmed_kills, lifetime_takedown_kills,
    lifetime_vehicle_kills, lifetime_days_survived, has_extended_stats,
    days_survived, times_bitten, bite_count, fish_caught, fish_caught_pike,
    health, max_health, hunger, max_hunger, thirst, max_thirst,
    stamina, max_stamina, infection, max_infection,
    battery, fatigue, infection_buildup, well_rested, energy, hood, hypo_handle,
    experience, x, y, z, rotation_yaw, respawn_point, radio_cooldown,
    status_effects, body_conditions, crafting_recipes, building_recipes,
    professions, skills, skill_tree, inventory, equipment, quick_slots, backpack,
    lore, unique_items, quest_data, challenge_data, challenge_counters,
    companions, horse, extended_stats_raw, custom_data, kill_tracker,
    first_seen, last_seen, updated_at
) VALUES (
    ?, ?, ?, ?, ?, ?,
    ?, ?, ?, ?, ?, ?, ?, ?,
    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
    ?, ?, ?, ?, ?,
    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
    ?, ?, ?, ?, ?, ?, ?,
    ?, ?, ?, ?, ?, ?, ?,
    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
    ?, ?, ?
) ON CONFLICT(steam_id) DO UPDATE SET
    name = excluded.name,
    male = excluded.male,
    profession = excluded.profession,
    affliction = excluded.affliction,
    appearance = excluded.appearance,
    kills = excluded.kills,
    headshots = excluded.headshots,
    melee_kills = excluded.melee_kills,
    firearm_kills = excluded.firearm_kills,
    blast_kills = excluded.blast_kills,
    unarmed_kills = excluded.unarmed_kills,
    takedown_kills = excluded.takedown_kills,
    vehicle_kills = excluded.vehicle_kills,
    lifetime_kills = excluded.lifetime_kills,
    lifetime_headshots = excluded.lifetime_headshots,
    lifetime_melee_kills = excluded.lifetime_melee_kills,
    lifetime_firearm_kills = excluded.lifetime_firearm_kills,
    lifetime_blast_kills = excluded.lifetime_blast_kills,
    lifetime_unarmed_kills = excluded.lifetime_unarmed_kills,
    lifetime_takedown_kills = excluded.lifetime_takedown_kills,
    lifetime_vehicle_kills = excluded.lifetime_vehicle_kills,
    lifetime_days_survived = excluded.lifetime_days_survived,
    has_extended_stats = excluded.has_extended_stats,
    days_survived = excluded.days_survived,
    times_bitten = excluded.times_bitten,
    bite_count = excluded.bite_count,
    fish_caught = excluded.fish_caught,
    fish_caught_pike = excluded.fish_caught_pike,
    health = excluded.health,
    max_health = excluded.max_health,
    hunger = excluded.hunger,
    max_hunger = excluded.max_hunger,
    thirst = excluded.thirst,
    max_thirst = excluded.max_thirst,
    stamina = excluded.stamina,
    max_stamina = excluded.max_stamina,
    infection = excluded.infection,
    max_infection = excluded.max_infection,
    battery = excluded.battery,
    fatigue = excluded.fatigue,
    infection_buildup = excluded.infection_buildup,
    well_rested = excluded.well_rested,
    energy = excluded.energy,
    hood = excluded.hood,
    hypo_handle = excluded.hypo_handle,
    experience = excluded.experience,
    x = excluded.x,
    y = excluded.y,
    z = excluded.z,
    rotation_yaw = excluded.rotation_yaw,
    respawn_point = excluded.respawn_point,
    radio_cooldown = excluded.radio_cooldown,
    status_effects = excluded.status_effects,
    body_conditions = excluded.body_conditions,
    crafting_recipes = excluded.crafting_recipes,
    building_recipes = excluded.building_recipes,
    professions = excluded.professions,
    skills = excluded.skills,
    skill_tree = excluded.skill_tree,
    inventory = excluded.inventory,
    equipment = excluded.equipment,
    quick_slots = excluded.quick_slots,
    backpack = excluded.backpack,
    lore = excluded.lore,
    unique_items = excluded.unique_items,
    quest_data = excluded.quest_data,
    challenge_data = excluded.challenge_data,
    challenge_counters = excluded.challenge_counters,
    companions = excluded.companions,
    horse = excluded.horse,
    extended_stats_raw = excluded.extended_stats_raw,
    custom_data = excluded.custom_data,
    kill_tracker = excluded.kill_tracker,
    last_seen = excluded.last_seen,
    updated_at = excluded.updated_at";

async fn upsert_player_conn(
    conn: &mut SqliteConnection,
    steam_id: &str,
    p: &ParsedPlayer,
) -> anyhow::Result<()> {
    let now = now_iso();
    if !p.name.is_empty() {
        record_name_conn(&mut *conn, steam_id, &p.name, &now).await?;
    }

    let args = vec![
        Arg::Text(steam_id.to_string()),
        Arg::Text(p.name.clone()),
        Arg::I64(p.male as i64),
        Arg::Text(p.profession.clone()),
        Arg::I64(p.affliction),
        Arg::Text(json_arg(&p.appearance)),
        Arg::I64(p.kills),
        Arg::I64(p.headshots),
        Arg::I64(p.melee_kills),
        Arg::I64(p.firearm_kills),
        Arg::I64(p.blast_kills),
        Arg::I64(p.unarmed_kills),
        Arg::I64(p.takedown_kills),
        Arg::I64(p.vehicle_kills),
        Arg::I64(p.lifetime_kills),
        Arg::I64(p.lifetime_headshots),
        Arg::I64(p.lifetime_melee_kills),
        Arg::I64(p.lifetime_firearm_kills),
        Arg::I64(p.lifetime_blast_kills),
        Arg::I64(p.lifetime_unarmed_kills),
        Arg::I64(p.lifetime_takedown_kills),
        Arg::I64(p.lifetime_vehicle_kills),
        Arg::I64(p.lifetime_days_survived),
        Arg::I64(p.has_extended_stats as i64),
        Arg::I64(p.days_survived),
        Arg::I64(p.times_bitten),
        Arg::I64(p.bite_count),
        Arg::I64(p.fish_caught),
        Arg::I64(p.fish_caught_pike),
        Arg::F64(p.health),
        Arg::F64(p.max_health),
        Arg::F64(p.hunger),
        Arg::F64(p.max_hunger),
        Arg::F64(p.thirst),
        Arg::F64(p.max_thirst),
        Arg::F64(p.stamina),
        Arg::F64(p.max_stamina),
        Arg::F64(p.infection),
        Arg::F64(p.max_infection),
        Arg::F64(p.battery),
        Arg::F64(p.fatigue),
        Arg::F64(p.infection_buildup),
        Arg::F64(p.well_rested),
        Arg::F64(p.energy),
        Arg::F64(p.hood),
        Arg::F64(p.hypo_handle),
        Arg::F64(p.experience),
        Arg::OptF64(p.x),
        Arg::OptF64(p.y),
        Arg::OptF64(p.z),
        Arg::F64(p.rotation_yaw),
        Arg::Text(p.respawn_point.to_string()),
        Arg::F64(p.radio_cooldown),
        Arg::Text(json_arg(&p.status_effects)),
        Arg::Text(json_arg(&p.body_conditions)),
        Arg::Text(json_arg(&p.crafting_recipes)),
        Arg::Text(json_arg(&p.building_recipes)),
        Arg::Text(json_arg(&p.professions)),
        Arg::Text(json_arg(&p.skills)),
        Arg::Text(json_arg(&p.skill_tree)),
        Arg::Text(json_arg(&p.inventory)),
        Arg::Text(json_arg(&p.equipment)),
        Arg::Text(json_arg(&p.quick_slots)),
        Arg::Text(json_arg(&p.backpack)),
        Arg::Text(json_arg(&p.lore)),
        Arg::Text(json_arg(&p.unique_items)),
        Arg::Text(json_arg(&p.quest_data)),
        Arg::Text(json_arg(&p.challenge_data)),
        Arg::Text(json_arg(&p.challenge_counters)),
        Arg::Text(json_arg(&p.companions)),
        Arg::Text(json_arg(&p.horse)),
        Arg::Text(json_arg(&p.extended_stats_raw)),
        Arg::Text(json_arg(&p.custom_data)),
        Arg::Text(json_arg(&p.kill_tracker)),
        Arg::Text(now.clone()),
        Arg::Text(now.clone()),
        Arg::Text(now),
    ];

    bind_args(sqlx::query(UPSERT_PLAYER_SQL), args)
        .execute(conn)
        .await?;
    Ok(())
}

async fn insert_structure(
    conn: &mut SqliteConnection,
    s: &ParsedStructure,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO structures
            (id, class, name, owner_steam_id, x, y, z, health, max_health,
             upgrade_level, attached_to_trailer, inventory, no_spawn, extra)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(s.id)
    .bind(&s.class)
    .bind(&s.name)
    .bind(&s.owner_steam_id)
    .bind(s.x)
    .bind(s.y)
    .bind(s.z)
    .bind(s.health)
    .bind(s.max_health)
    .bind(s.upgrade_level)
    .bind(s.attached_to_trailer)
    .bind(json_arg(&s.inventory))
    .bind(s.no_spawn)
    .bind(&s.extra)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_vehicle(conn: &mut SqliteConnection, v: &ParsedVehicle) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO vehicles
            (id, class, name, x, y, z, health, max_health, fuel, inventory, upgrades, extra)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(v.id)
    .bind(&v.class)
    .bind(&v.name)
    .bind(v.x)
    .bind(v.y)
    .bind(v.z)
    .bind(v.health)
    .bind(v.max_health)
    .bind(v.fuel)
    .bind(json_arg(&v.inventory))
    .bind(json_arg(&v.upgrades))
    .bind(&v.extra)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_companion(
    conn: &mut SqliteConnection,
    c: &ParsedCompanion,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO companions
            (id, kind, actor_name, owner_steam_id, x, y, z, health, extra)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(c.id)
    .bind(&c.kind)
    .bind(&c.actor_name)
    .bind(&c.owner_steam_id)
    .bind(c.x)
    .bind(c.y)
    .bind(c.z)
    .bind(c.health)
    .bind(json_arg(&c.extra))
    .execute(conn)
    .await?;
    Ok(())
}

fn player_from_row(r: &SqliteRow) -> anyhow::Result<PlayerRecord> {
    let player = ParsedPlayer {
        name: r.try_get("name")?,
        male: r.try_get::<i64, _>("male")? != 0,
        profession: r.try_get("profession")?,
        affliction: r.try_get("affliction")?,
        appearance: decode_json(&r.try_get::<String, _>("appearance")?),
        kills: r.try_get("kills")?,
        headshots: r.try_get("headshots")?,
        melee_kills: r.try_get("melee_kills")?,
        firearm_kills: r.try_get("firearm_kills")?,
        blast_kills: r.try_get("blast_kills")?,
        unarmed_kills: r.try_get("unarmed_kills")?,
        takedown_kills: r.try_get("takedown_kills")?,
        vehicle_kills: r.try_get("vehicle_kills")?,
        lifetime_kills: r.try_get("lifetime_kills")?,
        lifetime_headshots: r.try_get("lifetime_headshots")?,
        lifetime_melee_kills: r.try_get("lifetime_melee_kills")?,
        lifetime_firearm_kills: r.try_get("lifetime_firearm_kills")?,
        lifetime_blast_kills: r.try_get("lifetime_blast_kills")?,
        lifetime_unarmed_kills: r.try_get("lifetime_unarmed_kills")?,
        lifetime_takedown_kills: r.try_get("lifetime_takedown_kills")?,
        lifetime_vehicle_kills: r.try_get("lifetime_vehicle_kills")?,
        lifetime_days_survived: r.try_get("lifetime_days_survived")?,
        has_extended_stats: r.try_get::<i64, _>("has_extended_stats")? != 0,
        days_survived: r.try_get("days_survived")?,
        times_bitten: r.try_get("times_bitten")?,
        bite_count: r.try_get("bite_count")?,
        fish_caught: r.try_get("fish_caught")?,
        fish_caught_pike: r.try_get("fish_caught_pike")?,
        health: r.try_get("health")?,
        max_health: r.try_get("max_health")?,
        hunger: r.try_get("hunger")?,
        max_hunger: r.try_get("max_hunger")?,
        thirst: r.try_get("thirst")?,
        max_thirst: r.try_get("max_thirst")?,
        stamina: r.try_get("stamina")?,
        max_stamina: r.try_get("max_stamina")?,
        infection: r.try_get("infection")?,
        max_infection: r.try_get("max_infection")?,
        battery: r.try_get("battery")?,
        fatigue: r.try_get("fatigue")?,
        infection_buildup: r.try_get("infection_buildup")?,
        well_rested: r.try_get("well_rested")?,
        energy: r.try_get("energy")?,
        hood: r.try_get("hood")?,
        hypo_handle: r.try_get("hypo_handle")?,
        experience: r.try_get("experience")?,
        x: r.try_get("x")?,
        y: r.try_get("y")?,
        z: r.try_get("z")?,
        rotation_yaw: r.try_get("rotation_yaw")?,
        respawn_point: decode_json(&r.try_get::<String, _>("respawn_point")?),
        radio_cooldown: r.try_get("radio_cooldown")?,
        status_effects: decode_json(&r.try_get::<String, _>("status_effects")?),
        body_conditions: decode_json(&r.try_get::<String, _>("body_conditions")?),
        crafting_recipes: decode_json(&r.try_get::<String, _>("crafting_recipes")?),
        building_recipes: decode_json(&r.try_get::<String, _>("building_recipes")?),
        professions: decode_json(&r.try_get::<String, _>("professions")?),
        skills: decode_json(&r.try_get::<String, _>("skills")?),
        skill_tree: decode_json(&r.try_get::<String, _>("skill_tree")?),
        inventory: decode_json(&r.try_get::<String, _>("inventory")?),
        equipment: decode_json(&r.try_get::<String, _>("equipment")?),
        quick_slots: decode_json(&r.try_get::<String, _>("quick_slots")?),
        backpack: decode_json(&r.try_get::<String, _>("backpack")?),
        lore: decode_json(&r.try_get::<String, _>("lore")?),
        unique_items: decode_json(&r.try_get::<String, _>("unique_items")?),
        quest_data: decode_json(&r.try_get::<String, _>("quest_data")?),
        challenge_data: decode_json(&r.try_get::<String, _>("challenge_data")?),
        challenge_counters: decode_json(&r.try_get::<String, _>("challenge_counters")?),
        companions: decode_json(&r.try_get::<String, _>("companions")?),
        horse: decode_json(&r.try_get::<String, _>("horse")?),
        extended_stats_raw: decode_json(&r.try_get::<String, _>("extended_stats_raw")?),
        custom_data: decode_json(&r.try_get::<String, _>("custom_data")?),
        kill_tracker: decode_json(&r.try_get::<String, _>("kill_tracker")?),
    };

    Ok(PlayerRecord {
        steam_id: r.try_get("steam_id")?,
        name_history: decode_json(&r.try_get::<String, _>("name_history")?),
        first_seen: r.try_get("first_seen")?,
        last_seen: r.try_get("last_seen")?,
        online: r.try_get::<i64, _>("online")? != 0,
        log: LogCounters {
            deaths: r.try_get("log_deaths")?,
            pvp_kills: r.try_get("log_pvp_kills")?,
            pvp_deaths: r.try_get("log_pvp_deaths")?,
            builds: r.try_get("log_builds")?,
            loots: r.try_get("log_loots")?,
            damage_taken: r.try_get("log_damage_taken")?,
            raids_out: r.try_get("log_raids_out")?,
            raids_in: r.try_get("log_raids_in")?,
            last_event: r.try_get("log_last_event")?,
        },
        playtime_seconds: r.try_get("playtime_seconds")?,
        session_count: r.try_get("session_count")?,
        updated_at: r.try_get("updated_at")?,
        player,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const ACC: &str = "76561198000000010";
    const ACC2: &str = "76561198000000021";

    fn sample_player(name: &str, kills: i64) -> ParsedPlayer {
        ParsedPlayer {
            name: name.into(),
            kills,
            lifetime_kills: kills * 2,
            health: 87.5,
            x: Some(100.5),
            y: Some(-200.0),
            z: Some(30.0),
            inventory: json!([{"item": "Axe", "amount": 1, "durability": 50.0}]),
            ..Default::default()
        }
    }

    fn sample_save() -> ParsedSave {
        let mut save = ParsedSave::default();
        save.players.insert(ACC.into(), sample_player("Bob", 5));
        save.world_state.insert("dediDaysPassed".into(), json!(141));
        save.world_state
            .insert("currentSeason".into(), json!("Autumn"));
        save.structures.push(ParsedStructure {
            id: 0,
            class: "/Game/Build/BP_WoodWall.BP_WoodWall_C".into(),
            name: "WoodWall".into(),
            owner_steam_id: ACC.into(),
            health: 250.0,
            max_health: 250.0,
            inventory: json!([]),
            ..Default::default()
        });
        save.vehicles.push(ParsedVehicle {
            id: 0,
            class: "BP_Pickup_C".into(),
            name: "Pickup".into(),
            fuel: 42.2,
            inventory: json!([]),
            upgrades: json!([]),
            ..Default::default()
        });
        save
    }

    #[tokio::test]
    async fn schema_version_is_stamped() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        assert_eq!(
            store.get_meta("schema_version").await?.as_deref(),
            Some("1")
        );
        Ok(())
    }

    #[tokio::test]
    async fn upsert_then_upsert_reads_latest() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        store.upsert_player(ACC, &sample_player("Bob", 5)).await?;
        store.upsert_player(ACC, &sample_player("Bob", 9)).await?;

        let rec = store.get_player(ACC).await?.unwrap();
        assert_eq!(rec.player.kills, 9);
        assert_eq!(rec.player.lifetime_kills, 18);
        assert_eq!(rec.player.name, "Bob");
        assert!(!rec.updated_at.is_empty());
        // JSON columns decode back to native values
        assert_eq!(rec.player.inventory[0]["item"], "Axe");
        assert!(rec.player.male);
        assert!(!rec.online);

        // every non-identity column takes the new value, an empty name
        // included
        store.upsert_player(ACC, &sample_player("", 3)).await?;
        let rec = store.get_player(ACC).await?.unwrap();
        assert_eq!(rec.player.name, "");
        assert_eq!(rec.player.kills, 3);
        Ok(())
    }

    #[tokio::test]
    async fn sync_from_save_is_idempotent() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        let save = sample_save();
        store.sync_from_save(&save, &[], &BTreeMap::new()).await?;
        let first = store.get_player(ACC).await?.unwrap();
        let first_structs = store.get_structures().await?;

        store.sync_from_save(&save, &[], &BTreeMap::new()).await?;
        let second = store.get_player(ACC).await?.unwrap();
        let second_structs = store.get_structures().await?;

        assert_eq!(first.player, second.player);
        assert_eq!(first_structs, second_structs);
        assert_eq!(second_structs.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn sync_replaces_world_entities() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        store
            .sync_from_save(&sample_save(), &[], &BTreeMap::new())
            .await?;
        assert_eq!(store.get_vehicles().await?.len(), 1);

        let mut save = sample_save();
        save.vehicles.clear();
        store.sync_from_save(&save, &[], &BTreeMap::new()).await?;
        assert!(store.get_vehicles().await?.is_empty());
        assert_eq!(store.get_structures().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_sync_rolls_back_whole_snapshot() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        store
            .sync_from_save(&sample_save(), &[], &BTreeMap::new())
            .await?;

        let mut bad = sample_save();
        bad.players.insert(ACC2.into(), sample_player("Eve", 1));
        bad.structures.push(ParsedStructure {
            id: 0, // duplicate primary key
            ..Default::default()
        });
        bad.structures[0].class = "CHANGED".into();

        assert!(store
            .sync_from_save(&bad, &[], &BTreeMap::new())
            .await
            .is_err());

        // the previous snapshot is fully intact
        let structs = store.get_structures().await?;
        assert_eq!(structs.len(), 1);
        assert_eq!(structs[0].class, "/Game/Build/BP_WoodWall.BP_WoodWall_C");
        assert!(store.get_player(ACC2).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn leaderboards_are_sorted_and_bounded() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        for (i, acc) in ["76561198000000001", "76561198000000002", "76561198000000003"]
            .iter()
            .enumerate()
        {
            let mut p = sample_player(&format!("P{i}"), 0);
            p.lifetime_kills = (i as i64 + 1) * 10;
            store.upsert_player(acc, &p).await?;
        }

        let top = store.top_killers(2).await?;
        assert_eq!(top.len(), 2);
        assert!(top[0].value >= top[1].value);
        assert_eq!(top[0].value, 30);
        Ok(())
    }

    #[tokio::test]
    async fn totals_count_players() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        store.upsert_player(ACC, &sample_player("A", 3)).await?;
        store.upsert_player(ACC2, &sample_player("B", 4)).await?;
        store.set_online(ACC, true).await?;

        let totals = store.get_server_totals().await?;
        assert_eq!(totals.total_players, 2);
        assert_eq!(totals.online_players, 1);
        assert_eq!(totals.lifetime_kills, 14);
        Ok(())
    }

    #[tokio::test]
    async fn log_events_accumulate() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        store.record_log_event(ACC, LogEventKind::Death).await?;
        store.record_log_event(ACC, LogEventKind::Death).await?;
        store.record_log_event(ACC, LogEventKind::PvpKill).await?;
        store
            .record_log_event(ACC, LogEventKind::DamageTaken(25))
            .await?;

        let rec = store.get_player(ACC).await?.unwrap();
        assert_eq!(rec.log.deaths, 2);
        assert_eq!(rec.log.pvp_kills, 1);
        assert_eq!(rec.log.damage_taken, 25);
        assert!(!rec.log.last_event.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn log_counters_survive_save_sync() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        store.record_log_event(ACC, LogEventKind::Build).await?;
        store
            .sync_from_save(&sample_save(), &[], &BTreeMap::new())
            .await?;
        let rec = store.get_player(ACC).await?.unwrap();
        assert_eq!(rec.log.builds, 1);
        assert_eq!(rec.player.kills, 5);
        Ok(())
    }

    #[tokio::test]
    async fn online_transitions_count_sessions() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        store.set_online(ACC, true).await?;
        store.set_online(ACC, true).await?; // no-op, already online
        store.set_online(ACC, false).await?;
        store.add_playtime(ACC, 3600).await?;
        store.set_online(ACC, true).await?;

        let rec = store.get_player(ACC).await?.unwrap();
        assert_eq!(rec.session_count, 2);
        assert_eq!(rec.playtime_seconds, 3600);
        assert!(rec.online);
        assert_eq!(store.get_players_online().await?, vec![ACC.to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn renames_append_to_history() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        store.record_name(ACC, "Old").await?;
        store.record_name(ACC, "New").await?;
        store.record_name(ACC, "New").await?; // unchanged

        let rec = store.get_player(ACC).await?.unwrap();
        assert_eq!(rec.player.name, "New");
        let history = rec.name_history.as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["name"], "Old");
        assert!(history[0]["until"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn world_state_parses_numbers_on_read() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        store
            .sync_from_save(&sample_save(), &[], &BTreeMap::new())
            .await?;
        let ws = store.get_world_state().await?;
        assert_eq!(ws["dediDaysPassed"], json!(141));
        assert_eq!(ws["currentSeason"], json!("Autumn"));
        Ok(())
    }

    #[tokio::test]
    async fn clan_membership_is_replaced_per_sync() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        let clan = ParsedClan {
            name: "Raiders".into(),
            members: vec![
                save_parser::ParsedClanMember {
                    name: "Bob".into(),
                    account_id: ACC.into(),
                    rank: "Leader".into(),
                    can_invite: true,
                    can_kick: true,
                },
                save_parser::ParsedClanMember {
                    name: "Alice".into(),
                    account_id: ACC2.into(),
                    rank: "Recruit".into(),
                    ..Default::default()
                },
            ],
        };
        store
            .sync_from_save(&sample_save(), &[clan.clone()], &BTreeMap::new())
            .await?;
        assert_eq!(store.get_clans().await?[0].members.len(), 2);

        let smaller = ParsedClan {
            members: clan.members[..1].to_vec(),
            ..clan
        };
        store
            .sync_from_save(&sample_save(), &[smaller], &BTreeMap::new())
            .await?;
        let clans = store.get_clans().await?;
        assert_eq!(clans[0].members.len(), 1);
        assert_eq!(clans[0].members[0].rank, "Leader");
        Ok(())
    }

    #[tokio::test]
    async fn snapshots_latest_and_purge() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        store
            .create_snapshot("hourly", ACC, &json!({"kills": 1}))
            .await?;
        store
            .create_snapshot("hourly", ACC, &json!({"kills": 2}))
            .await?;
        store
            .create_snapshot("daily", ACC, &json!({"kills": 3}))
            .await?;

        let (payload, _) = store.get_latest_snapshot("hourly", ACC).await?.unwrap();
        assert_eq!(payload["kills"], 2);
        assert!(store.get_latest_snapshot("weekly", ACC).await?.is_none());

        // nothing is a week old yet
        assert_eq!(store.purge_snapshots("-7 days").await?, 0);
        // shifting the cutoff past now purges everything
        assert_eq!(store.purge_snapshots("+1 minute").await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn replace_all_world_quest_tables() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        store
            .replace_quests(&[ParsedQuest {
                id: 0,
                name: "FindTheCamp".into(),
                data: json!({"stage": 2}),
            }])
            .await?;
        store
            .replace_containers(&[ParsedContainer {
                id: 0,
                name: "Stash_9".into(),
                items: json!([{"item": "Nails", "amount": 10, "durability": 0.0}]),
                ..Default::default()
            }])
            .await?;
        store.replace_quests(&[]).await?;

        let rows = sqlx::query("SELECT COUNT(*) AS n FROM quests")
            .fetch_one(&store.pool)
            .await?;
        assert_eq!(rows.try_get::<i64, _>("n")?, 0);
        let rows = sqlx::query("SELECT COUNT(*) AS n FROM containers")
            .fetch_one(&store.pool)
            .await?;
        assert_eq!(rows.try_get::<i64, _>("n")?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn reference_tables_are_whitelisted() -> anyhow::Result<()> {
        let store = Store::open_in_memory().await?;
        store
            .replace_reference(
                "game_items",
                &[("axe".into(), "Axe".into(), json!({"weight": 2.5}))],
            )
            .await?;
        let rows = store.get_reference("game_items").await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].2["weight"], 2.5);

        assert!(store
            .replace_reference("players; DROP TABLE players", &[])
            .await
            .is_err());
        Ok(())
    }
}
