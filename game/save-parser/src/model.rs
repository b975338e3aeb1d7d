use std::collections::BTreeMap;

use gvas::GvasHeader;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Everything parsed out of one save snapshot.
///
/// Field names follow the agent cache wire format, so this serializes
/// directly into the cache JSON and back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedSave {
    #[serde(skip)]
    pub header: GvasHeader,
    pub players: BTreeMap<String, ParsedPlayer>,
    pub world_state: BTreeMap<String, Value>,
    pub structures: Vec<ParsedStructure>,
    pub vehicles: Vec<ParsedVehicle>,
    pub companions: Vec<ParsedCompanion>,
    pub dead_bodies: Vec<ParsedDeadBody>,
    pub containers: Vec<ParsedContainer>,
    pub loot_actors: Vec<ParsedLootActor>,
    pub quests: Vec<ParsedQuest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedPlayer {
    pub name: String,
    pub male: bool,
    pub profession: String,
    pub affliction: i64,
    pub appearance: Value,

    // current-life combat counters, reset on death
    pub kills: i64,
    pub headshots: i64,
    pub melee_kills: i64,
    pub firearm_kills: i64,
    pub blast_kills: i64,
    pub unarmed_kills: i64,
    pub takedown_kills: i64,
    pub vehicle_kills: i64,

    // lifetime counters from the Statistics tag set
    pub lifetime_kills: i64,
    pub lifetime_headshots: i64,
    pub lifetime_melee_kills: i64,
    pub lifetime_firearm_kills: i64,
    pub lifetime_blast_kills: i64,
    pub lifetime_unarmed_kills: i64,
    pub lifetime_takedown_kills: i64,
    pub lifetime_vehicle_kills: i64,
    pub lifetime_days_survived: i64,
    pub has_extended_stats: bool,

    pub days_survived: i64,
    pub times_bitten: i64,
    pub bite_count: i64,
    pub fish_caught: i64,
    pub fish_caught_pike: i64,

    pub health: f64,
    pub max_health: f64,
    pub hunger: f64,
    pub max_hunger: f64,
    pub thirst: f64,
    pub max_thirst: f64,
    pub stamina: f64,
    pub max_stamina: f64,
    pub infection: f64,
    pub max_infection: f64,
    pub battery: f64,
    pub fatigue: f64,
    pub infection_buildup: f64,
    pub well_rested: f64,
    pub energy: f64,
    pub hood: f64,
    pub hypo_handle: f64,

    pub experience: f64,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub rotation_yaw: f64,
    pub respawn_point: Value,
    pub radio_cooldown: f64,

    pub status_effects: Value,
    pub body_conditions: Value,
    pub crafting_recipes: Value,
    pub building_recipes: Value,
    pub professions: Value,
    pub skills: Value,
    pub skill_tree: Value,
    pub inventory: Value,
    pub equipment: Value,
    pub quick_slots: Value,
    pub backpack: Value,
    pub lore: Value,
    pub unique_items: Value,
    pub quest_data: Value,
    pub challenge_data: Value,
    pub challenge_counters: Value,
    pub companions: Value,
    pub horse: Value,
    pub extended_stats_raw: Value,
    pub custom_data: Value,
    pub kill_tracker: Value,
}

impl Default for ParsedPlayer {
    fn default() -> Self {
        Self {
            name: String::new(),
            male: true,
            profession: String::new(),
            affliction: 0,
            appearance: empty_object(),
            kills: 0,
            headshots: 0,
            melee_kills: 0,
            firearm_kills: 0,
            blast_kills: 0,
            unarmed_kills: 0,
            takedown_kills: 0,
            vehicle_kills: 0,
            lifetime_kills: 0,
            lifetime_headshots: 0,
            lifetime_melee_kills: 0,
            lifetime_firearm_kills: 0,
            lifetime_blast_kills: 0,
            lifetime_unarmed_kills: 0,
            lifetime_takedown_kills: 0,
            lifetime_vehicle_kills: 0,
            lifetime_days_survived: 0,
            has_extended_stats: false,
            days_survived: 0,
            times_bitten: 0,
            bite_count: 0,
            fish_caught: 0,
            fish_caught_pike: 0,
            health: 0.0,
            max_health: 100.0,
            hunger: 0.0,
            max_hunger: 100.0,
            thirst: 0.0,
            max_thirst: 100.0,
            stamina: 0.0,
            max_stamina: 100.0,
            infection: 0.0,
            max_infection: 100.0,
            battery: 0.0,
            fatigue: 0.0,
            infection_buildup: 0.0,
            well_rested: 0.0,
            energy: 0.0,
            hood: 0.0,
            hypo_handle: 0.0,
            experience: 0.0,
            x: None,
            y: None,
            z: None,
            rotation_yaw: 0.0,
            respawn_point: Value::Null,
            radio_cooldown: 0.0,
            status_effects: empty_array(),
            body_conditions: empty_array(),
            crafting_recipes: empty_array(),
            building_recipes: empty_array(),
            professions: empty_array(),
            skills: empty_array(),
            skill_tree: empty_object(),
            inventory: empty_array(),
            equipment: empty_array(),
            quick_slots: empty_array(),
            backpack: empty_array(),
            lore: empty_array(),
            unique_items: empty_array(),
            quest_data: empty_object(),
            challenge_data: empty_object(),
            challenge_counters: empty_object(),
            companions: empty_array(),
            horse: empty_object(),
            extended_stats_raw: empty_array(),
            custom_data: empty_object(),
            kill_tracker: empty_object(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedStructure {
    pub id: i64,
    pub class: String,
    pub name: String,
    pub owner_steam_id: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub health: f64,
    pub max_health: f64,
    pub upgrade_level: i64,
    pub attached_to_trailer: bool,
    pub inventory: Value,
    pub no_spawn: bool,
    pub extra: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedVehicle {
    pub id: i64,
    pub class: String,
    pub name: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub health: f64,
    pub max_health: f64,
    pub fuel: f64,
    pub inventory: Value,
    pub upgrades: Value,
    pub extra: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedCompanion {
    pub id: i64,
    /// `dog` or `horse`
    pub kind: String,
    pub actor_name: String,
    pub owner_steam_id: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub health: f64,
    pub extra: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedDeadBody {
    pub id: i64,
    pub name: String,
    pub owner_steam_id: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub inventory: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedContainer {
    pub id: i64,
    pub name: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub items: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedLootActor {
    pub id: i64,
    pub class: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub items: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedQuest {
    pub id: i64,
    pub name: String,
    pub data: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedClan {
    pub name: String,
    pub members: Vec<ParsedClanMember>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedClanMember {
    pub name: String,
    pub account_id: String,
    pub rank: String,
    pub can_invite: bool,
    pub can_kick: bool,
}
