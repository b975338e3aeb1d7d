//! Schema DDL and the forward-only migration ladder.

pub const SCHEMA_VERSION: i64 = 1;

/// Version 1 statements, executed inside one transaction on first open.
/// Everything is `IF NOT EXISTS` so re-running is harmless.
pub const SCHEMA_V1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS players (
        steam_id TEXT PRIMARY KEY,
        name TEXT NOT NULL DEFAULT '',
        name_history TEXT NOT NULL DEFAULT '[]',
        first_seen TEXT NOT NULL DEFAULT '',
        last_seen TEXT NOT NULL DEFAULT '',
        online INTEGER NOT NULL DEFAULT 0,
        male INTEGER NOT NULL DEFAULT 1,
        profession TEXT NOT NULL DEFAULT '',
        affliction INTEGER NOT NULL DEFAULT 0,
        appearance TEXT NOT NULL DEFAULT '{}',

        kills INTEGER NOT NULL DEFAULT 0,
        headshots INTEGER NOT NULL DEFAULT 0,
        melee_kills INTEGER NOT NULL DEFAULT 0,
        firearm_kills INTEGER NOT NULL DEFAULT 0,
        blast_kills INTEGER NOT NULL DEFAULT 0,
        unarmed_kills INTEGER NOT NULL DEFAULT 0,
        takedown_kills INTEGER NOT NULL DEFAULT 0,
        vehicle_kills INTEGER NOT NULL DEFAULT 0,

        lifetime_kills INTEGER NOT NULL DEFAULT 0,
        lifetime_headshots INTEGER NOT NULL DEFAULT 0,
        lifetime_melee_kills INTEGER NOT NULL DEFAULT 0,
        lifetime_firearm_kills INTEGER NOT NULL DEFAULT 0,
        lifetime_blast_kills INTEGER NOT NULL DEFAULT 0,
        lifetime_unarmed_kills INTEGER NOT NULL DEFAULT 0,
        lifetime_takedown_kills INTEGER NOT NULL DEFAULT 0,
        lifetime_vehicle_kills INTEGER NOT NULL DEFAULT 0,
        lifetime_days_survived INTEGER NOT NULL DEFAULT 0,
        has_extended_stats INTEGER NOT NULL DEFAULT 0,

        days_survived INTEGER NOT NULL DEFAULT 0,
        times_bitten INTEGER NOT NULL DEFAULT 0,
        bite_count INTEGER NOT NULL DEFAULT 0,
        fish_caught INTEGER NOT NULL DEFAULT 0,
        fish_caught_pike INTEGER NOT NULL DEFAULT 0,

        health REAL NOT NULL DEFAULT 0,
        max_health REAL NOT NULL DEFAULT 100,
        hunger REAL NOT NULL DEFAULT 0,
        max_hunger REAL NOT NULL DEFAULT 100,
        thirst REAL NOT NULL DEFAULT 0,
        max_thirst REAL NOT NULL DEFAULT 100,
        stamina REAL NOT NULL DEFAULT 0,
        max_stamina REAL NOT NULL DEFAULT 100,
        infection REAL NOT NULL DEFAULT 0,
        max_infection REAL NOT NULL DEFAULT 100,
        battery REAL NOT NULL DEFAULT 0,
        fatigue REAL NOT NULL DEFAULT 0,
        infection_buildup REAL NOT NULL DEFAULT 0,
        well_rested REAL NOT NULL DEFAULT 0,
        energy REAL NOT NULL DEFAULT 0,
        hood REAL NOT NULL DEFAULT 0,
        hypo_handle REAL NOT NULL DEFAULT 0,

        experience REAL NOT NULL DEFAULT 0,
        x REAL,
        y REAL,
        z REAL,
        rotation_yaw REAL NOT NULL DEFAULT 0,
        respawn_point TEXT NOT NULL DEFAULT 'null',
        radio_cooldown REAL NOT NULL DEFAULT 0,

        status_effects TEXT NOT NULL DEFAULT '[]',
        body_conditions TEXT NOT NULL DEFAULT '[]',
        crafting_recipes TEXT NOT NULL DEFAULT '[]',
        building_recipes TEXT NOT NULL DEFAULT '[]',
        professions TEXT NOT NULL DEFAULT '[]',
        skills TEXT NOT NULL DEFAULT '[]',
        skill_tree TEXT NOT NULL DEFAULT '{}',
        inventory TEXT NOT NULL DEFAULT '[]',
        equipment TEXT NOT NULL DEFAULT '[]',
        quick_slots TEXT NOT NULL DEFAULT '[]',
        backpack TEXT NOT NULL DEFAULT '[]',
        lore TEXT NOT NULL DEFAULT '[]',
        unique_items TEXT NOT NULL DEFAULT '[]',
        quest_data TEXT NOT NULL DEFAULT '{}',
        challenge_data TEXT NOT NULL DEFAULT '{}',
        challenge_counters TEXT NOT NULL DEFAULT '{}',
        companions TEXT NOT NULL DEFAULT '[]',
        horse TEXT NOT NULL DEFAULT '{}',
        extended_stats_raw TEXT NOT NULL DEFAULT '[]',
        custom_data TEXT NOT NULL DEFAULT '{}',
        kill_tracker TEXT NOT NULL DEFAULT '{}',

        log_deaths INTEGER NOT NULL DEFAULT 0,
        log_pvp_kills INTEGER NOT NULL DEFAULT 0,
        log_pvp_deaths INTEGER NOT NULL DEFAULT 0,
        log_builds INTEGER NOT NULL DEFAULT 0,
        log_loots INTEGER NOT NULL DEFAULT 0,
        log_damage_taken INTEGER NOT NULL DEFAULT 0,
        log_raids_out INTEGER NOT NULL DEFAULT 0,
        log_raids_in INTEGER NOT NULL DEFAULT 0,
        log_last_event TEXT NOT NULL DEFAULT '',

        playtime_seconds INTEGER NOT NULL DEFAULT 0,
        session_count INTEGER NOT NULL DEFAULT 0,

        updated_at TEXT NOT NULL DEFAULT ''
    )",
    "CREATE INDEX IF NOT EXISTS idx_players_lifetime_kills
        ON players (lifetime_kills DESC)",
    "CREATE INDEX IF NOT EXISTS idx_players_playtime
        ON players (playtime_seconds DESC)",
    "CREATE INDEX IF NOT EXISTS idx_players_days
        ON players (lifetime_days_survived DESC)",
    "CREATE TABLE IF NOT EXISTS clans (
        name TEXT PRIMARY KEY,
        created_at TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS clan_members (
        clan_name TEXT NOT NULL REFERENCES clans(name) ON DELETE CASCADE,
        account_id TEXT NOT NULL,
        name TEXT NOT NULL DEFAULT '',
        rank TEXT NOT NULL DEFAULT 'Recruit',
        can_invite INTEGER NOT NULL DEFAULT 0,
        can_kick INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (clan_name, account_id)
    )",
    "CREATE TABLE IF NOT EXISTS world_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS server_settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS structures (
        id INTEGER PRIMARY KEY,
        class TEXT NOT NULL DEFAULT '',
        name TEXT NOT NULL DEFAULT '',
        owner_steam_id TEXT NOT NULL DEFAULT '',
        x REAL,
        y REAL,
        z REAL,
        health REAL NOT NULL DEFAULT 0,
        max_health REAL NOT NULL DEFAULT 0,
        upgrade_level INTEGER NOT NULL DEFAULT 0,
        attached_to_trailer INTEGER NOT NULL DEFAULT 0,
        inventory TEXT NOT NULL DEFAULT '[]',
        no_spawn INTEGER NOT NULL DEFAULT 0,
        extra TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS vehicles (
        id INTEGER PRIMARY KEY,
        class TEXT NOT NULL DEFAULT '',
        name TEXT NOT NULL DEFAULT '',
        x REAL,
        y REAL,
        z REAL,
        health REAL NOT NULL DEFAULT 0,
        max_health REAL NOT NULL DEFAULT 0,
        fuel REAL NOT NULL DEFAULT 0,
        inventory TEXT NOT NULL DEFAULT '[]',
        upgrades TEXT NOT NULL DEFAULT '[]',
        extra TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS companions (
        id INTEGER PRIMARY KEY,
        kind TEXT NOT NULL DEFAULT 'dog',
        actor_name TEXT NOT NULL DEFAULT '',
        owner_steam_id TEXT NOT NULL DEFAULT '',
        x REAL,
        y REAL,
        z REAL,
        health REAL NOT NULL DEFAULT 0,
        extra TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS dead_bodies (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL DEFAULT '',
        owner_steam_id TEXT NOT NULL DEFAULT '',
        x REAL,
        y REAL,
        z REAL,
        inventory TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE TABLE IF NOT EXISTS containers (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL DEFAULT '',
        x REAL,
        y REAL,
        z REAL,
        items TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE TABLE IF NOT EXISTS loot_actors (
        id INTEGER PRIMARY KEY,
        class TEXT NOT NULL DEFAULT '',
        x REAL,
        y REAL,
        z REAL,
        items TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE TABLE IF NOT EXISTS quests (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL DEFAULT '',
        data TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type TEXT NOT NULL,
        account_id TEXT NOT NULL DEFAULT '',
        payload TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_type_account
        ON snapshots (type, account_id)",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_created
        ON snapshots (created_at)",
    "CREATE TABLE IF NOT EXISTS game_items (
        id TEXT PRIMARY KEY, name TEXT NOT NULL DEFAULT '', data TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS profession_defs (
        id TEXT PRIMARY KEY, name TEXT NOT NULL DEFAULT '', data TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS affliction_defs (
        id TEXT PRIMARY KEY, name TEXT NOT NULL DEFAULT '', data TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS skill_defs (
        id TEXT PRIMARY KEY, name TEXT NOT NULL DEFAULT '', data TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS challenge_defs (
        id TEXT PRIMARY KEY, name TEXT NOT NULL DEFAULT '', data TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS recipe_defs (
        id TEXT PRIMARY KEY, name TEXT NOT NULL DEFAULT '', data TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS quest_defs (
        id TEXT PRIMARY KEY, name TEXT NOT NULL DEFAULT '', data TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS lore_defs (
        id TEXT PRIMARY KEY, name TEXT NOT NULL DEFAULT '', data TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS loading_tips (
        id TEXT PRIMARY KEY, name TEXT NOT NULL DEFAULT '', data TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS spawn_locations (
        id TEXT PRIMARY KEY, name TEXT NOT NULL DEFAULT '', data TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS server_setting_defs (
        id TEXT PRIMARY KEY, name TEXT NOT NULL DEFAULT '', data TEXT NOT NULL DEFAULT '{}'
    )",
];

/// Reference tables addressable through the generic replace operation.
pub const REFERENCE_TABLES: &[&str] = &[
    "game_items",
    "profession_defs",
    "affliction_defs",
    "skill_defs",
    "challenge_defs",
    "recipe_defs",
    "quest_defs",
    "lore_defs",
    "loading_tips",
    "spawn_locations",
    "server_setting_defs",
];

/// Idempotent DDL for versions above 1, applied in order inside one
/// transaction when an older database is opened. Empty for now.
pub fn migrations_after(version: i64) -> Vec<(i64, Vec<&'static str>)> {
    let ladder: Vec<(i64, Vec<&'static str>)> = Vec::new();
    ladder
        .into_iter()
        .filter(|(v, _)| *v > version)
        .collect()
}
