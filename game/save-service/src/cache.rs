use std::collections::BTreeMap;

use anyhow::ensure;
use save_parser::{
    ParsedCompanion, ParsedContainer, ParsedDeadBody, ParsedLootActor, ParsedPlayer, ParsedQuest,
    ParsedSave, ParsedStructure, ParsedVehicle,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::CACHE_FORMAT_VERSION;

/// The JSON snapshot the remote parser writes and this service consumes.
///
/// Forward compatible: unknown fields are ignored and any `v >= 1` is
/// accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentCache {
    pub v: i64,
    pub ts: String,
    /// Save modify time, milliseconds.
    pub mtime: i64,
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

impl AgentCache {
    pub fn decode(data: &[u8]) -> anyhow::Result<Self> {
        let cache: AgentCache = serde_json::from_slice(data)?;
        ensure!(cache.v >= 1, "unsupported cache format version {}", cache.v);
        Ok(cache)
    }

    pub fn from_save(save: &ParsedSave, mtime_ms: i64, ts: String) -> Self {
        Self {
            v: CACHE_FORMAT_VERSION,
            ts,
            mtime: mtime_ms,
            players: save.players.clone(),
            world_state: save.world_state.clone(),
            structures: save.structures.clone(),
            vehicles: save.vehicles.clone(),
            companions: save.companions.clone(),
            dead_bodies: save.dead_bodies.clone(),
            containers: save.containers.clone(),
            loot_actors: save.loot_actors.clone(),
            quests: save.quests.clone(),
        }
    }

    pub fn into_save(self) -> ParsedSave {
        ParsedSave {
            header: Default::default(),
            players: self.players,
            world_state: self.world_state,
            structures: self.structures,
            vehicles: self.vehicles,
            companions: self.companions,
            dead_bodies: self.dead_bodies,
            containers: self.containers,
            loot_actors: self.loot_actors,
            quests: self.quests,
        }
    }
}
