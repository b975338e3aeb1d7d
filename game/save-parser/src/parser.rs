use binary_reader::BinaryReader;
use gvas::{
    clean_property_name, read_header, read_property, ArrayValue, ByteValue, GvasError, MapValue,
    Property, PropertyValue, ReadOptions, StructValue, Transform,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::json::{children_to_json, map_to_json, property_value_to_json};
use crate::model::{
    ParsedCompanion, ParsedContainer, ParsedDeadBody, ParsedLootActor, ParsedPlayer, ParsedQuest,
    ParsedSave, ParsedStructure, ParsedVehicle,
};
use crate::tables;

/// 17-digit external account ids embedded in arbitrary strings.
pub static ACCOUNT_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"7656\d+").unwrap());

static RECOVERY_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z0-9_]{2,60}$").unwrap());

/// How far forward recovery scans past a stuck offset.
const RECOVERY_SCAN_LIMIT: usize = 50_000;

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn yaw_degrees(z: f64, w: f64) -> f64 {
    round1((2.0 * z * w).atan2(1.0 - 2.0 * z * z).to_degrees())
}

/// `/Game/...​/BP_WoodWall.BP_WoodWall_C` → `WoodWall`
pub fn simplify_class_name(class: &str) -> String {
    let seg = class.rsplit('/').next().unwrap_or(class);
    let seg = seg.rsplit('.').next().unwrap_or(seg);
    let seg = seg.strip_prefix("BP_").unwrap_or(seg);
    let seg = seg.strip_suffix("_C").unwrap_or(seg);
    seg.to_string()
}

pub fn parse_save(data: &[u8]) -> Result<ParsedSave, GvasError> {
    SaveParser::default().parse(data)
}

#[derive(Debug, Default)]
pub struct SaveParser {
    pub opts: ReadOptions,
}

impl SaveParser {
    pub fn with_options(opts: ReadOptions) -> Self {
        Self { opts }
    }

    /// Walks the whole buffer. Parse failures end the scan or are recovered;
    /// whatever was extracted up to that point is returned.
    pub fn parse(&self, data: &[u8]) -> Result<ParsedSave, GvasError> {
        let mut r = BinaryReader::new(data);
        let header = read_header(&mut r)?;
        let mut ctx = ParseContext::new();
        ctx.save.header = header;

        loop {
            let before = r.position();
            match read_property(&mut r, &self.opts)? {
                Some(prop) => ctx.handle(&prop),
                None => {
                    if r.position() == before {
                        if !forward_recover(&mut r) {
                            break;
                        }
                    } else {
                        // terminator reached (or a failure that consumed input)
                        break;
                    }
                }
            }
        }

        Ok(ctx.finish())
    }
}

/// Repositions the cursor at the next plausible property start: an int32
/// length in (3, 80) followed by an ASCII identifier-shaped name.
fn forward_recover(r: &mut BinaryReader) -> bool {
    let stuck = r.position();
    let limit = r.len().min(stuck + RECOVERY_SCAN_LIMIT);
    for pos in stuck..limit {
        r.restore(pos);
        let Ok(len) = r.read_i32() else { continue };
        if len <= 3 || len >= 80 {
            continue;
        }
        let Ok(bytes) = r.read_bytes(len as usize - 1) else {
            continue;
        };
        let Ok(name) = std::str::from_utf8(bytes) else {
            continue;
        };
        if RECOVERY_NAME_RE.is_match(name) {
            log::debug!(
                "recovered scan at offset {} ({} bytes skipped, next property {:?})",
                pos,
                pos - stuck,
                name
            );
            r.restore(pos);
            return true;
        }
    }
    r.restore(stuck);
    false
}

#[derive(Default)]
struct NoSpawnEntry {
    class: String,
    extra: String,
}

/// All mutable state threaded through the property walk.
#[derive(Default)]
struct ParseContext {
    save: ParsedSave,
    current_account: Option<String>,

    // parallel build-actor arrays, stitched in the post-pass
    build_classes: Vec<String>,
    build_transform_count: usize,
    build_health: Vec<f64>,
    build_max_health: Vec<f64>,
    build_upgrade: Vec<i64>,
    build_trailer: Vec<bool>,
    build_str: Vec<String>,
    build_data: Vec<String>,
    no_spawn: Vec<NoSpawnEntry>,
    build_inventories: Vec<(String, Value)>,
}

impl ParseContext {
    fn new() -> Self {
        Self::default()
    }

    fn set_account(&mut self, account: String) {
        self.save.players.entry(account.clone()).or_default();
        self.current_account = Some(account);
    }

    fn player_mut(&mut self) -> Option<&mut ParsedPlayer> {
        let account = self.current_account.as_ref()?;
        self.save.players.get_mut(account)
    }

    fn handle(&mut self, prop: &Property) {
        let name = clean_property_name(&prop.name).to_string();

        if name == "SteamID" {
            if let Some(v) = prop.value.as_str() {
                if let Some(m) = ACCOUNT_ID_RE.find(v) {
                    self.set_account(m.as_str().to_string());
                }
            }
            return;
        }

        if name == "Statistics" {
            self.handle_statistics(&prop.value);
            return;
        }

        if self.current_account.is_none() && self.handle_world(&name, prop) {
            return;
        }
        if self.current_account.is_some() && self.handle_player(&name, prop) {
            return;
        }

        // not routed: descend into nested lists, establishing ownership first
        match &prop.value {
            PropertyValue::Struct(StructValue::Generic { children, .. }) => {
                self.recurse(children);
            }
            PropertyValue::Array(ArrayValue::Structs { elements, .. }) => {
                for el in elements {
                    if let StructValue::Generic { children, .. } = el {
                        self.recurse(children);
                    }
                }
            }
            _ => {}
        }
    }

    fn recurse(&mut self, children: &[Property]) {
        if let Some(account) = pre_scan_account(children) {
            self.set_account(account);
        }
        for c in children {
            self.handle(c);
        }
    }

    // world-level routing, only outside any player context

    fn handle_world(&mut self, name: &str, prop: &Property) -> bool {
        match name {
            "BuildActorClass" => {
                if let PropertyValue::Array(ArrayValue::Strings(v)) = &prop.value {
                    self.build_classes = v.clone();
                }
            }
            "BuildActorTransform" => match &prop.value {
                PropertyValue::Array(a) => self.build_transform_count = a.count(),
                _ => return false,
            },
            "BuildingCurrentHealth" => {
                if let PropertyValue::Array(ArrayValue::Floats(v)) = &prop.value {
                    self.build_health = v.clone();
                }
            }
            "BuildingMaxHealth" => {
                if let PropertyValue::Array(ArrayValue::Floats(v)) = &prop.value {
                    self.build_max_health = v.clone();
                }
            }
            "BuildingUpgradeLv" => {
                if let PropertyValue::Array(ArrayValue::Ints(v)) = &prop.value {
                    self.build_upgrade = v.clone();
                }
            }
            "AttachedToTrailer" => {
                if let PropertyValue::Array(ArrayValue::Bools(v)) = &prop.value {
                    self.build_trailer = v.clone();
                }
            }
            "BuildingStr" => {
                if let PropertyValue::Array(ArrayValue::Strings(v)) = &prop.value {
                    self.build_str = v.clone();
                }
            }
            "BuildActorData" => {
                if let PropertyValue::Array(ArrayValue::Strings(v)) = &prop.value {
                    self.build_data = v.clone();
                }
            }
            "BuildActorsNoSpawn" => {
                for children in generic_elements(&prop.value) {
                    self.no_spawn.push(NoSpawnEntry {
                        class: find_str_contains(children, "Class").unwrap_or_default().into(),
                        extra: find_str_contains(children, "Data")
                            .or_else(|| find_str_contains(children, "Name"))
                            .unwrap_or_default()
                            .into(),
                    });
                }
            }
            "BuildActorInventory" => {
                for children in generic_elements(&prop.value) {
                    let actor = find_str_contains(children, "Name").unwrap_or_default();
                    if actor.is_empty() {
                        continue;
                    }
                    let items = find_slots_json(children).unwrap_or_else(|| json!([]));
                    self.build_inventories.push((actor.to_string(), items));
                }
            }
            "Cars" => {
                for children in generic_elements(&prop.value) {
                    self.extract_vehicle(children);
                }
            }
            "Dogs" => {
                for children in generic_elements(&prop.value) {
                    self.extract_companion(children, "dog");
                }
            }
            "Horses" => {
                for children in generic_elements(&prop.value) {
                    self.extract_companion(children, "horse");
                }
            }
            "DeadBodies" => {
                for children in generic_elements(&prop.value) {
                    self.extract_dead_body(children);
                }
            }
            "ContainerData" => {
                for children in generic_elements(&prop.value) {
                    self.extract_container(children);
                }
            }
            "ModularLootActor" => {
                for children in generic_elements(&prop.value) {
                    self.extract_loot_actor(children);
                }
            }
            "QuestSavedData" => {
                for children in generic_elements(&prop.value) {
                    let id = self.save.quests.len() as i64;
                    self.save.quests.push(ParsedQuest {
                        id,
                        name: find_str_contains(children, "Name")
                            .or_else(|| find_str_contains(children, "Quest"))
                            .unwrap_or_default()
                            .into(),
                        data: children_to_json(children),
                    });
                }
            }
            "Dedi_DaysPassed" => {
                self.world_num("dediDaysPassed", &prop.value);
            }
            "CurrentSeason" => {
                let season = prop
                    .value
                    .as_str()
                    .map(|v| tables::resolve_season(v).unwrap_or(v).to_string())
                    .unwrap_or_default();
                self.save.world_state.insert("currentSeason".into(), json!(season));
            }
            "CurrentSeasonDay" => {
                self.world_num("currentSeasonDay", &prop.value);
            }
            "RandomSeed" => {
                self.world_num("randomSeed", &prop.value);
            }
            "UsesSteamUID" => {
                self.save
                    .world_state
                    .insert("usesSteamUid".into(), json!(prop.value.as_bool().unwrap_or(false)));
            }
            "GameDiff" => {
                self.save
                    .world_state
                    .insert("difficulty".into(), property_value_to_json(&prop.value));
            }
            "UDSandUDWsave" => {
                self.save
                    .world_state
                    .insert("weather".into(), property_value_to_json(&prop.value));
            }
            "Airdrop" => {
                self.save
                    .world_state
                    .insert("airdrop".into(), property_value_to_json(&prop.value));
            }
            "DropInSaves" => {
                self.save
                    .world_state
                    .insert("dropInSaves".into(), property_value_to_json(&prop.value));
            }
            _ => return false,
        }
        true
    }

    fn world_num(&mut self, key: &str, value: &PropertyValue) {
        if let Some(v) = value.as_i64() {
            self.save.world_state.insert(key.into(), json!(v));
        }
    }

    fn extract_vehicle(&mut self, children: &[Property]) {
        let id = self.save.vehicles.len() as i64;
        let class = find_str_contains(children, "Class").unwrap_or_default().to_string();
        let (x, y, z) = transform_pos(children);
        self.save.vehicles.push(ParsedVehicle {
            id,
            name: simplify_class_name(&class),
            class,
            x,
            y,
            z,
            health: round1(
                find_num_exact(children, "Health")
                    .or_else(|| find_num_contains(children, "CurrentHealth"))
                    .unwrap_or(0.0),
            ),
            max_health: round1(find_num_contains(children, "MaxHealth").unwrap_or(0.0)),
            fuel: round1(find_num_contains(children, "Fuel").unwrap_or(0.0)),
            inventory: find_slots_json(children).unwrap_or_else(|| json!([])),
            upgrades: find_strings_contains(children, "Upgrade").unwrap_or_else(|| json!([])),
            extra: find_str_exact(children, "ExtraData").unwrap_or_default().into(),
        });
    }

    fn extract_companion(&mut self, children: &[Property], kind: &str) {
        let id = self.save.companions.len() as i64;
        let (x, y, z) = transform_pos(children);
        self.save.companions.push(ParsedCompanion {
            id,
            kind: kind.into(),
            actor_name: find_str_contains(children, "Name").unwrap_or_default().into(),
            owner_steam_id: scan_account(children).unwrap_or_default(),
            x,
            y,
            z,
            health: round1(
                find_num_exact(children, "Health")
                    .or_else(|| find_num_contains(children, "Health"))
                    .unwrap_or(0.0),
            ),
            extra: json!({}),
        });
    }

    fn extract_dead_body(&mut self, children: &[Property]) {
        let id = self.save.dead_bodies.len() as i64;
        let (x, y, z) = transform_pos(children);
        self.save.dead_bodies.push(ParsedDeadBody {
            id,
            name: find_str_contains(children, "Name").unwrap_or_default().into(),
            owner_steam_id: scan_account(children).unwrap_or_default(),
            x,
            y,
            z,
            inventory: find_slots_json(children).unwrap_or_else(|| json!([])),
        });
    }

    fn extract_container(&mut self, children: &[Property]) {
        let id = self.save.containers.len() as i64;
        let (x, y, z) = transform_pos(children);
        self.save.containers.push(ParsedContainer {
            id,
            name: find_str_contains(children, "Name").unwrap_or_default().into(),
            x,
            y,
            z,
            items: find_slots_json(children).unwrap_or_else(|| json!([])),
        });
    }

    fn extract_loot_actor(&mut self, children: &[Property]) {
        let id = self.save.loot_actors.len() as i64;
        let (x, y, z) = transform_pos(children);
        self.save.loot_actors.push(ParsedLootActor {
            id,
            class: find_str_contains(children, "Class").unwrap_or_default().into(),
            x,
            y,
            z,
            items: find_slots_json(children).unwrap_or_else(|| json!([])),
        });
    }

    // per-player routing

    fn handle_player(&mut self, name: &str, prop: &Property) -> bool {
        let value = &prop.value;
        let Some(p) = self.player_mut() else {
            return false;
        };

        match name {
            "PlayerName" => {
                if let Some(v) = value.as_str() {
                    p.name = v.to_string();
                }
            }
            "Male" => p.male = value.as_bool().unwrap_or(p.male),
            "Health" => set_f64(&mut p.health, value, round1),
            "MaxHealth" => set_f64(&mut p.max_health, value, round1),
            "Hunger" => set_f64(&mut p.hunger, value, round1),
            "MaxHunger" => set_f64(&mut p.max_hunger, value, round1),
            "Thirst" => set_f64(&mut p.thirst, value, round1),
            "MaxThirst" => set_f64(&mut p.max_thirst, value, round1),
            "Stamina" => set_f64(&mut p.stamina, value, round1),
            "MaxStamina" => set_f64(&mut p.max_stamina, value, round1),
            "Infection" => set_f64(&mut p.infection, value, round1),
            "MaxInfection" => set_f64(&mut p.max_infection, value, round1),
            "Battery" => set_f64(&mut p.battery, value, round1),
            "Experience" => set_f64(&mut p.experience, value, round1),
            "RadioCooldown" => set_f64(&mut p.radio_cooldown, value, round1),
            "DayzSurvived" => set_i64(&mut p.days_survived, value),
            "TimesBitten" => set_i64(&mut p.times_bitten, value),
            "BiteCount" => set_i64(&mut p.bite_count, value),
            "FishCaught" => set_i64(&mut p.fish_caught, value),
            "FishCaughtPike" => set_i64(&mut p.fish_caught_pike, value),
            "Affliction" => set_i64(&mut p.affliction, value),
            "Profession" | "StartingProfession" | "StartPerk" => {
                let resolved = match value {
                    PropertyValue::Byte(ByteValue::Raw(idx)) => tables::profession_by_index(*idx),
                    other => other.as_str().and_then(tables::resolve_profession),
                };
                if let Some(resolved) = resolved {
                    p.profession = resolved.to_string();
                }
            }
            "PlayerTransform" => {
                if let PropertyValue::Struct(StructValue::Transform(t)) = value {
                    if let Some((x, y, z)) = t.translation {
                        p.x = Some(round1(x));
                        p.y = Some(round1(y));
                        p.z = Some(round1(z));
                    }
                    if let Some((_, _, z, w)) = t.rotation {
                        p.rotation_yaw = yaw_degrees(z, w);
                    }
                }
            }
            "RespawnPoint" => match value {
                PropertyValue::Struct(StructValue::Transform(t)) => {
                    if let Some((x, y, z)) = t.translation {
                        p.respawn_point =
                            json!({"x": round1(x), "y": round1(y), "z": round1(z)});
                    }
                }
                PropertyValue::Struct(StructValue::Vector { x, y, z }) => {
                    p.respawn_point =
                        json!({"x": round1(*x), "y": round1(*y), "z": round1(*z)});
                }
                _ => {}
            },
            "GameStats" => {
                if let PropertyValue::Map(MapValue::Entries(entries)) = value {
                    for (k, v) in entries {
                        let (Some(key), Some(num)) = (k.as_str(), v.as_f64()) else {
                            continue;
                        };
                        if let Some(field) = tables::game_stat_field(key) {
                            set_game_stat(p, field, num.round() as i64);
                        }
                    }
                    p.kill_tracker = map_to_json(&MapValue::Entries(entries.clone()));
                }
            }
            "FloatData" => {
                if let PropertyValue::Map(MapValue::Entries(entries)) = value {
                    for (k, v) in entries {
                        let (Some(key), Some(num)) = (k.as_str(), v.as_f64()) else {
                            continue;
                        };
                        if let Some(field) = tables::float_data_field(key) {
                            set_float_data(p, field, round2(num));
                        }
                    }
                }
            }
            "CustomData" => {
                if let PropertyValue::Map(m) = value {
                    p.custom_data = map_to_json(m);
                }
            }
            "StatusEffects" => p.status_effects = property_value_to_json(value),
            "BodyConditions" => p.body_conditions = property_value_to_json(value),
            "SkillTree" => p.skill_tree = property_value_to_json(value),
            "CollectedLore" => p.lore = property_value_to_json(value),
            "LoreID" => {
                if let (Some(id), Value::Array(list)) = (value.as_str(), &mut p.lore) {
                    list.push(json!(id));
                }
            }
            "Inventory" => p.inventory = property_value_to_json(value),
            "Equipment" => p.equipment = property_value_to_json(value),
            "QuickSlots" => p.quick_slots = property_value_to_json(value),
            "Backpack" => p.backpack = property_value_to_json(value),
            "CharacterProfile" => {
                if let PropertyValue::Struct(StructValue::Generic { children, .. }) = value {
                    p.appearance = children_to_json(children);
                }
            }
            "Companions" => p.companions = property_value_to_json(value),
            "Horse" => p.horse = property_value_to_json(value),
            "QuestData" => p.quest_data = property_value_to_json(value),
            "ChallengeData" => p.challenge_data = property_value_to_json(value),
            "ExtendedStats" => p.extended_stats_raw = property_value_to_json(value),
            _ => {
                // list families that come in suffixed variants, and the
                // per-challenge integer counters
                if let Some(target) = list_family(name) {
                    let json = property_value_to_json(value);
                    let slot = match target {
                        "crafting_recipes" => &mut p.crafting_recipes,
                        "building_recipes" => &mut p.building_recipes,
                        "professions" => &mut p.professions,
                        "skills" => &mut p.skills,
                        "unique_items" => &mut p.unique_items,
                        _ => unreachable!(),
                    };
                    append_list(slot, json);
                    return true;
                }
                if let Some(rest) = name.strip_prefix("Challenge_") {
                    if let (Some(v), Value::Object(map)) = (value.as_i64(), &mut p.challenge_counters)
                    {
                        map.insert(rest.to_string(), json!(v));
                        return true;
                    }
                }
                return false;
            }
        }
        true
    }

    fn handle_statistics(&mut self, value: &PropertyValue) {
        let elements: Vec<&Vec<Property>> = generic_elements(value);
        if elements.is_empty() {
            return;
        }
        let Some(p) = self.player_mut() else { return };
        for children in elements {
            let mut tag: Option<String> = None;
            let mut num: Option<f64> = None;
            for c in children.iter() {
                let cname = clean_property_name(&c.name);
                if cname == "StatisticId" {
                    tag = match &c.value {
                        PropertyValue::Struct(StructValue::Generic { children, .. }) => children
                            .iter()
                            .find(|t| clean_property_name(&t.name) == "TagName")
                            .and_then(|t| t.value.as_str())
                            .map(str::to_string),
                        other => other.as_str().map(str::to_string),
                    };
                } else if cname == "CurrentValue" {
                    num = c.value.as_f64();
                } else if cname.starts_with("statistics.") {
                    tag = Some(cname.to_string());
                    num = c.value.as_f64();
                }
            }
            let (Some(tag), Some(v)) = (tag, num) else {
                continue;
            };
            if let Some(field) = tables::statistic_field(&tag) {
                set_lifetime(p, field, v.round() as i64);
                if v > 0.0 {
                    p.has_extended_stats = true;
                }
            }
        }
    }

    // post-pass stitching

    fn finish(mut self) -> ParsedSave {
        let total = self.build_classes.len().max(self.build_transform_count);
        for i in 0..total {
            let class = self.build_classes.get(i).cloned().unwrap_or_default();
            self.save.structures.push(ParsedStructure {
                id: i as i64,
                name: simplify_class_name(&class),
                owner_steam_id: self
                    .build_str
                    .get(i)
                    .and_then(|s| ACCOUNT_ID_RE.find(s))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
                // positions stay unset, transforms were skipped during the walk
                x: None,
                y: None,
                z: None,
                health: round1(self.build_health.get(i).copied().unwrap_or(0.0)),
                max_health: round1(self.build_max_health.get(i).copied().unwrap_or(0.0)),
                upgrade_level: self.build_upgrade.get(i).copied().unwrap_or(0),
                attached_to_trailer: self.build_trailer.get(i).copied().unwrap_or(false),
                inventory: json!([]),
                no_spawn: false,
                extra: self.build_data.get(i).cloned().unwrap_or_default(),
                class,
            });
        }

        for entry in &self.no_spawn {
            for s in &mut self.save.structures {
                if (!entry.extra.is_empty() && s.extra == entry.extra)
                    || (!entry.class.is_empty() && s.class == entry.class)
                {
                    s.no_spawn = true;
                }
            }
        }

        for (actor, items) in std::mem::take(&mut self.build_inventories) {
            if let Some(s) = self
                .save
                .structures
                .iter_mut()
                .find(|s| !s.extra.is_empty() && s.extra == actor)
            {
                s.inventory = items;
            } else {
                let id = self.save.containers.len() as i64;
                self.save.containers.push(ParsedContainer {
                    id,
                    name: actor,
                    x: None,
                    y: None,
                    z: None,
                    items,
                });
            }
        }

        let ws = &mut self.save.world_state;
        ws.insert("totalStructures".into(), json!(self.save.structures.len()));
        ws.insert("totalVehicles".into(), json!(self.save.vehicles.len()));
        ws.insert("totalCompanions".into(), json!(self.save.companions.len()));
        ws.insert("totalDeadBodies".into(), json!(self.save.dead_bodies.len()));
        ws.insert("totalPlayers".into(), json!(self.save.players.len()));

        self.save
    }
}

fn list_family(name: &str) -> Option<&'static str> {
    for (prefix, field) in [
        ("CraftingRecipes", "crafting_recipes"),
        ("BuildingRecipes", "building_recipes"),
        ("UnlockedProfessions", "professions"),
        ("UnlockedSkills", "skills"),
        ("UniqueItems", "unique_items"),
        ("UniqueLoot", "unique_items"),
    ] {
        if name == prefix || name.starts_with(&format!("{}_", prefix)) {
            return Some(field);
        }
    }
    None
}

fn append_list(slot: &mut Value, json: Value) {
    let Value::Array(target) = slot else {
        *slot = json;
        return;
    };
    match json {
        Value::Array(items) => target.extend(items),
        other => target.push(other),
    }
}

fn set_f64(slot: &mut f64, value: &PropertyValue, round: fn(f64) -> f64) {
    if let Some(v) = value.as_f64() {
        *slot = round(v);
    }
}

fn set_i64(slot: &mut i64, value: &PropertyValue) {
    if let Some(v) = value.as_i64() {
        *slot = v;
    }
}

fn set_game_stat(p: &mut ParsedPlayer, field: &str, v: i64) {
    match field {
        "kills" => p.kills = v,
        "headshots" => p.headshots = v,
        "melee_kills" => p.melee_kills = v,
        "firearm_kills" => p.firearm_kills = v,
        "blast_kills" => p.blast_kills = v,
        "unarmed_kills" => p.unarmed_kills = v,
        "takedown_kills" => p.takedown_kills = v,
        "vehicle_kills" => p.vehicle_kills = v,
        _ => {}
    }
}

fn set_float_data(p: &mut ParsedPlayer, field: &str, v: f64) {
    match field {
        "fatigue" => p.fatigue = v,
        "infection_buildup" => p.infection_buildup = v,
        "well_rested" => p.well_rested = v,
        "energy" => p.energy = v,
        "hood" => p.hood = v,
        "hypo_handle" => p.hypo_handle = v,
        "battery" => p.battery = v,
        _ => {}
    }
}

fn set_lifetime(p: &mut ParsedPlayer, field: &str, v: i64) {
    match field {
        "lifetime_kills" => p.lifetime_kills = v,
        "lifetime_headshots" => p.lifetime_headshots = v,
        "lifetime_melee_kills" => p.lifetime_melee_kills = v,
        "lifetime_firearm_kills" => p.lifetime_firearm_kills = v,
        "lifetime_blast_kills" => p.lifetime_blast_kills = v,
        "lifetime_unarmed_kills" => p.lifetime_unarmed_kills = v,
        "lifetime_takedown_kills" => p.lifetime_takedown_kills = v,
        "lifetime_vehicle_kills" => p.lifetime_vehicle_kills = v,
        "lifetime_days_survived" => p.lifetime_days_survived = v,
        _ => {}
    }
}

/// Generic struct elements of an array property (or a single generic struct).
fn generic_elements(value: &PropertyValue) -> Vec<&Vec<Property>> {
    match value {
        PropertyValue::Array(ArrayValue::Structs { elements, .. }) => elements
            .iter()
            .filter_map(|el| match el {
                StructValue::Generic { children, .. } => Some(children),
                _ => None,
            })
            .collect(),
        PropertyValue::Struct(StructValue::Generic { children, .. }) => vec![children],
        _ => Vec::new(),
    }
}

fn pre_scan_account(children: &[Property]) -> Option<String> {
    for c in children {
        if clean_property_name(&c.name) == "SteamID" {
            if let Some(m) = c.value.as_str().and_then(|v| ACCOUNT_ID_RE.find(v)) {
                return Some(m.as_str().to_string());
            }
        }
        match &c.value {
            PropertyValue::Struct(StructValue::Generic { children, .. }) => {
                if let Some(found) = pre_scan_account(children) {
                    return Some(found);
                }
            }
            PropertyValue::Array(ArrayValue::Structs { elements, .. }) => {
                for el in elements {
                    if let StructValue::Generic { children, .. } = el {
                        if let Some(found) = pre_scan_account(children) {
                            return Some(found);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn scan_account(children: &[Property]) -> Option<String> {
    for c in children {
        if let Some(m) = c.value.as_str().and_then(|v| ACCOUNT_ID_RE.find(v)) {
            return Some(m.as_str().to_string());
        }
    }
    None
}

fn find_str_exact<'a>(children: &'a [Property], name: &str) -> Option<&'a str> {
    children
        .iter()
        .find(|p| clean_property_name(&p.name) == name)
        .and_then(|p| p.value.as_str())
}

fn find_str_contains<'a>(children: &'a [Property], needle: &str) -> Option<&'a str> {
    children
        .iter()
        .find(|p| clean_property_name(&p.name).contains(needle) && p.value.as_str().is_some())
        .and_then(|p| p.value.as_str())
}

fn find_num_exact(children: &[Property], name: &str) -> Option<f64> {
    children
        .iter()
        .find(|p| clean_property_name(&p.name) == name)
        .and_then(|p| p.value.as_f64())
}

fn find_num_contains(children: &[Property], needle: &str) -> Option<f64> {
    children
        .iter()
        .find(|p| clean_property_name(&p.name).contains(needle) && p.value.as_f64().is_some())
        .and_then(|p| p.value.as_f64())
}

fn find_slots_json(children: &[Property]) -> Option<Value> {
    children.iter().find_map(|p| match &p.value {
        PropertyValue::Array(a @ ArrayValue::Slots(_)) => {
            Some(crate::json::array_to_json(a))
        }
        _ => None,
    })
}

fn find_strings_contains(children: &[Property], needle: &str) -> Option<Value> {
    children.iter().find_map(|p| match &p.value {
        PropertyValue::Array(ArrayValue::Strings(v))
            if clean_property_name(&p.name).contains(needle) =>
        {
            Some(json!(v))
        }
        _ => None,
    })
}

fn transform_pos(children: &[Property]) -> (Option<f64>, Option<f64>, Option<f64>) {
    for c in children {
        if let PropertyValue::Struct(StructValue::Transform(Transform {
            translation: Some((x, y, z)),
            ..
        })) = &c.value
        {
            return (Some(round1(*x)), Some(round1(*y)), Some(round1(*z)));
        }
    }
    (None, None, None)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testenc as enc;

    const ACC1: &str = "76561198000000010";
    const ACC2: &str = "76561198000000021";

    fn parse(props: &[Vec<u8>]) -> ParsedSave {
        let mut buf = enc::gvas_header();
        for p in props {
            buf.extend(p);
        }
        buf.extend(enc::none());
        parse_save(&buf).unwrap()
    }

    #[test]
    fn empty_save_yields_empty_result() {
        let save = parse(&[]);
        assert_eq!(save.players.len(), 0);
        assert!(save.structures.is_empty());
        assert_eq!(save.world_state["totalPlayers"], 0);
    }

    #[test]
    fn not_gvas_fails() {
        assert!(matches!(
            parse_save(b"SAVEGAME"),
            Err(GvasError::NotGvas)
        ));
    }

    #[test]
    fn player_position_and_yaw() {
        // 45 degrees around the up axis
        let quat = [0.0, 0.0, 0.38268343, 0.92387953];
        let save = parse(&[
            enc::str_prop("SteamID", ACC1),
            enc::transform_prop("PlayerTransform", (37377.63, -292189.0, 5014.0), quat),
        ]);
        let p = &save.players[ACC1];
        assert_eq!(p.x, Some(37377.6));
        assert_eq!(p.y, Some(-292189.0));
        assert_eq!(p.z, Some(5014.0));
        assert_eq!(p.rotation_yaw, 45.0);
    }

    #[test]
    fn two_accounts_bind_by_sequence() {
        let save = parse(&[
            enc::str_prop("SteamID", ACC1),
            enc::int_prop("DayzSurvived", 12),
            enc::str_prop("SteamID", ACC2),
            enc::int_prop("DayzSurvived", 30),
        ]);
        assert_eq!(save.players.len(), 2);
        assert_eq!(save.players[ACC1].days_survived, 12);
        assert_eq!(save.players[ACC2].days_survived, 30);
    }

    #[test]
    fn every_account_key_matches_the_pattern() {
        let save = parse(&[
            enc::str_prop("SteamID", &format!("player {} joined", ACC1)),
            enc::str_prop("SteamID", "not an account"),
        ]);
        assert_eq!(save.players.len(), 1);
        assert!(save.players.keys().all(|k| ACCOUNT_ID_RE.is_match(k)));
    }

    #[test]
    fn inventory_slots_are_lifted() {
        let save = parse(&[
            enc::str_prop("SteamID", ACC1),
            enc::slots_array("Inventory", &[enc::slot_element("Axe", 1, 50.0)]),
        ]);
        let p = &save.players[ACC1];
        assert_eq!(
            p.inventory,
            serde_json::json!([{"item": "Axe", "amount": 1, "durability": 50.0}])
        );
    }

    #[test]
    fn game_stats_feed_current_life_counters() {
        let save = parse(&[
            enc::str_prop("SteamID", ACC1),
            enc::str_int_map("GameStats", &[("Kills", 5), ("Headshots", 2)]),
        ]);
        let p = &save.players[ACC1];
        assert_eq!(p.kills, 5);
        assert_eq!(p.headshots, 2);
        assert_eq!(p.kill_tracker["Kills"], 5);
    }

    #[test]
    fn float_data_is_rounded_to_two_decimals() {
        let save = parse(&[
            enc::str_prop("SteamID", ACC1),
            enc::str_float_map("FloatData", &[("Fatigue", 12.3456), ("Energy", 88.881)]),
        ]);
        let p = &save.players[ACC1];
        assert_eq!(p.fatigue, 12.35);
        assert_eq!(p.energy, 88.88);
    }

    #[test]
    fn statistics_fill_lifetime_counters() {
        let mut stat_id = enc::name_prop("TagName", "statistics.stat.game.kills.total");
        stat_id.extend(enc::none());
        let mut element = enc::prop_header("StatisticId", "StructProperty", stat_id.len() as i64);
        element.extend(enc::fstring("GameplayTag"));
        element.extend([0u8; 16]);
        element.push(0);
        element.extend(stat_id);
        element.extend(enc::float_prop("CurrentValue", 7.4));

        let save = parse(&[
            enc::str_prop("SteamID", ACC1),
            enc::generic_struct_array("Statistics", "S_Statistics", &[element]),
        ]);
        let p = &save.players[ACC1];
        assert_eq!(p.lifetime_kills, 7);
        assert!(p.has_extended_stats);
    }

    #[test]
    fn profession_resolves_from_byte_enum() {
        let save = parse(&[
            enc::str_prop("SteamID", ACC1),
            enc::byte_enum_prop(
                "Profession",
                "Enum_Professions",
                "Enum_Professions::NewEnumerator3",
            ),
        ]);
        assert_eq!(save.players[ACC1].profession, "Doctor");
    }

    #[test]
    fn world_scalars_populate_world_state() {
        let save = parse(&[
            enc::int_prop("Dedi_DaysPassed", 141),
            enc::enum_prop("CurrentSeason", "UDS_Season", "UDS_Season::NewEnumerator2"),
            enc::int_prop("CurrentSeasonDay", 17),
            enc::bool_prop("UsesSteamUID", true),
        ]);
        assert_eq!(save.world_state["dediDaysPassed"], 141);
        assert_eq!(save.world_state["currentSeason"], "Autumn");
        assert_eq!(save.world_state["currentSeasonDay"], 17);
        assert_eq!(save.world_state["usesSteamUid"], true);
    }

    #[test]
    fn build_actor_arrays_stitch_into_structures() {
        let wall_inv = enc::slots_array("Slots", &[enc::slot_element("Plank", 4, 100.0)]);
        let mut wall_entry = enc::str_prop("ActorName", "Wall_1");
        wall_entry.extend(wall_inv);
        let orphan_inv = enc::slots_array("Slots", &[enc::slot_element("Nails", 10, 0.0)]);
        let mut orphan_entry = enc::str_prop("ActorName", "Stash_9");
        orphan_entry.extend(orphan_inv);

        let save = parse(&[
            enc::string_array(
                "BuildActorClass",
                "StrProperty",
                &[
                    "/Game/Build/BP_WoodWall.BP_WoodWall_C",
                    "/Game/Build/BP_Workbench.BP_Workbench_C",
                ],
            ),
            enc::float_array("BuildingCurrentHealth", &[250.0, 90.5]),
            enc::float_array("BuildingMaxHealth", &[250.0, 100.0]),
            enc::int_array("BuildingUpgradeLv", &[1, 0]),
            enc::bool_array("AttachedToTrailer", &[false, true]),
            enc::string_array(
                "BuildingStr",
                "StrProperty",
                &["owner=76561198000000099", ""],
            ),
            enc::string_array("BuildActorData", "StrProperty", &["Wall_1", ""]),
            enc::generic_struct_array(
                "BuildActorInventory",
                "S_ActorInventory",
                &[wall_entry, orphan_entry],
            ),
        ]);

        assert_eq!(save.structures.len(), 2);
        let wall = &save.structures[0];
        assert_eq!(wall.name, "WoodWall");
        assert_eq!(wall.owner_steam_id, "76561198000000099");
        assert_eq!(wall.health, 250.0);
        assert_eq!(wall.upgrade_level, 1);
        assert!(!wall.attached_to_trailer);
        assert_eq!(wall.inventory[0]["item"], "Plank");
        assert!(wall.x.is_none());

        assert!(save.structures[1].attached_to_trailer);

        // the orphan inventory becomes a container row
        assert_eq!(save.containers.len(), 1);
        assert_eq!(save.containers[0].name, "Stash_9");
        assert_eq!(save.containers[0].items[0]["item"], "Nails");

        assert_eq!(save.world_state["totalStructures"], 2);
    }

    #[test]
    fn skipped_transform_array_still_counts_structures() {
        let parser = SaveParser::with_options(ReadOptions {
            skip_large_arrays: true,
            large_array_threshold: 2,
        });
        let mut buf = enc::gvas_header();
        buf.extend(enc::vector_struct_array(
            "BuildActorTransform",
            &[(0.0, 0.0, 0.0); 4],
        ));
        buf.extend(enc::none());
        let save = parser.parse(&buf).unwrap();
        assert_eq!(save.structures.len(), 4);
        assert!(save.structures.iter().all(|s| s.class.is_empty()));
    }

    #[test]
    fn cars_become_vehicles() {
        let mut car = enc::str_prop("VehicleClass", "/Game/Cars/BP_Pickup.BP_Pickup_C");
        car.extend(enc::transform_prop(
            "VehicleTransform",
            (100.0, 200.0, 30.0),
            [0.0, 0.0, 0.0, 1.0],
        ));
        car.extend(enc::float_prop("CurrentHealth", 77.7));
        car.extend(enc::float_prop("MaxHealth", 100.0));
        car.extend(enc::float_prop("Fuel", 42.2));
        car.extend(enc::slots_array("Slots", &[enc::slot_element("Gas", 1, 0.0)]));

        let save = parse(&[enc::generic_struct_array("Cars", "S_CarSave", &[car])]);
        assert_eq!(save.vehicles.len(), 1);
        let v = &save.vehicles[0];
        assert_eq!(v.name, "Pickup");
        assert_eq!(v.x, Some(100.0));
        assert_eq!(v.health, 77.7);
        assert_eq!(v.fuel, 42.2);
        assert_eq!(v.inventory[0]["item"], "Gas");
        assert_eq!(save.world_state["totalVehicles"], 1);
    }

    #[test]
    fn dogs_become_companions_with_owner() {
        let mut dog = enc::str_prop("DogName", "Rex");
        dog.extend(enc::str_prop("OwnerID", ACC1));
        dog.extend(enc::float_prop("Health", 55.0));
        let save = parse(&[enc::generic_struct_array("Dogs", "S_DogSave", &[dog])]);
        assert_eq!(save.companions.len(), 1);
        assert_eq!(save.companions[0].kind, "dog");
        assert_eq!(save.companions[0].actor_name, "Rex");
        assert_eq!(save.companions[0].owner_steam_id, ACC1);
    }

    #[test]
    fn recovery_skips_garbage_before_valid_property() {
        let mut buf = enc::gvas_header();
        buf.extend([0xFFu8; 50]);
        buf.extend(enc::int_prop("Dedi_DaysPassed", 5));
        buf.extend(enc::none());
        let save = parse_save(&buf).unwrap();
        assert_eq!(save.world_state["dediDaysPassed"], 5);
    }

    #[test]
    fn truncated_buffer_returns_partial_result() {
        let mut buf = enc::gvas_header();
        buf.extend(enc::str_prop("SteamID", ACC1));
        buf.extend(enc::int_prop("DayzSurvived", 9));
        // no terminator, stream just ends
        let save = parse_save(&buf).unwrap();
        assert_eq!(save.players[ACC1].days_survived, 9);
    }

    #[test]
    fn nested_player_struct_binds_owner_before_siblings() {
        // a player save struct where the vitals precede the SteamID child
        let mut element = enc::float_prop("Health", 66.6);
        element.extend(enc::str_prop("SteamID", ACC2));
        element.extend(enc::int_prop("DayzSurvived", 3));
        let save = parse(&[enc::generic_struct_array(
            "PlayerSaves",
            "S_PlayerSave",
            &[element],
        )]);
        let p = &save.players[ACC2];
        assert_eq!(p.health, 66.6);
        assert_eq!(p.days_survived, 3);
    }

    #[test]
    fn default_player_shape_is_complete() {
        let save = parse(&[enc::str_prop("SteamID", ACC1)]);
        let json = serde_json::to_value(&save.players[ACC1]).unwrap();
        for field in [
            "name",
            "male",
            "profession",
            "kills",
            "lifetimeKills",
            "daysSurvived",
            "health",
            "maxHealth",
            "inventory",
            "equipment",
            "questData",
            "customData",
            "rotationYaw",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
    }

    #[test]
    fn lore_id_appends_and_list_replaces() {
        let save = parse(&[
            enc::str_prop("SteamID", ACC1),
            enc::str_prop("LoreID", "lore_001"),
            enc::str_prop("LoreID", "lore_002"),
        ]);
        assert_eq!(
            save.players[ACC1].lore,
            serde_json::json!(["lore_001", "lore_002"])
        );

        let save = parse(&[
            enc::str_prop("SteamID", ACC1),
            enc::str_prop("LoreID", "lore_001"),
            enc::string_array("CollectedLore", "NameProperty", &["a", "b"]),
        ]);
        assert_eq!(save.players[ACC1].lore, serde_json::json!(["a", "b"]));
    }

    #[test]
    fn class_name_simplification() {
        assert_eq!(
            simplify_class_name("/Game/Build/BP_WoodWall.BP_WoodWall_C"),
            "WoodWall"
        );
        assert_eq!(simplify_class_name("Workbench"), "Workbench");
        assert_eq!(simplify_class_name(""), "");
    }
}
