//! Fixed lookup tables for enum-encoded save values.

/// Starting professions, indexed by the byte the save stores.
pub const PROFESSIONS: [&str; 12] = [
    "Unemployed",
    "Firefighter",
    "Police Officer",
    "Doctor",
    "Mechanic",
    "Carpenter",
    "Farmer",
    "Fisherman",
    "Hunter",
    "Soldier",
    "Chef",
    "Athlete",
];

/// `Enum_Professions::NewEnumeratorN` or a raw byte index.
pub fn resolve_profession(value: &str) -> Option<&'static str> {
    let idx = value
        .strip_prefix("Enum_Professions::NewEnumerator")
        .and_then(|n| n.parse::<usize>().ok())
        .or_else(|| value.parse::<usize>().ok())?;
    PROFESSIONS.get(idx).copied()
}

pub fn profession_by_index(idx: u8) -> Option<&'static str> {
    PROFESSIONS.get(idx as usize).copied()
}

/// `UDS_Season::NewEnumerator{0..3}`.
pub fn resolve_season(value: &str) -> Option<&'static str> {
    let idx = value.strip_prefix("UDS_Season::NewEnumerator")?;
    match idx {
        "0" => Some("Spring"),
        "1" => Some("Summer"),
        "2" => Some("Autumn"),
        "3" => Some("Winter"),
        _ => None,
    }
}

/// `E_ClanRank::NewEnumerator{0..4}`.
pub fn resolve_clan_rank(value: &str) -> &'static str {
    let idx = value
        .strip_prefix("E_ClanRank::NewEnumerator")
        .unwrap_or(value);
    match idx {
        "0" => "Recruit",
        "1" => "Member",
        "2" => "Officer",
        "3" => "Co-Leader",
        "4" => "Leader",
        _ => "Recruit",
    }
}

/// Statistics gameplay-tag → lifetime counter field.
///
/// The field names match [`crate::model::ParsedPlayer`].
pub fn statistic_field(tag: &str) -> Option<&'static str> {
    Some(match tag {
        "statistics.stat.game.kills.total" => "lifetime_kills",
        "statistics.stat.game.kills.headshot" => "lifetime_headshots",
        "statistics.stat.game.kills.melee" => "lifetime_melee_kills",
        "statistics.stat.game.kills.firearm" => "lifetime_firearm_kills",
        "statistics.stat.game.kills.blast" => "lifetime_blast_kills",
        "statistics.stat.game.kills.unarmed" => "lifetime_unarmed_kills",
        "statistics.stat.game.kills.takedown" => "lifetime_takedown_kills",
        "statistics.stat.game.kills.vehicle" => "lifetime_vehicle_kills",
        "statistics.stat.game.dayssurvived.total" => "lifetime_days_survived",
        _ => return None,
    })
}

/// Current-life counter field for a `GameStats` map key.
pub fn game_stat_field(key: &str) -> Option<&'static str> {
    Some(match key {
        "Kills" => "kills",
        "Headshots" => "headshots",
        "MeleeKills" => "melee_kills",
        "FirearmKills" => "firearm_kills",
        "BlastKills" => "blast_kills",
        "UnarmedKills" => "unarmed_kills",
        "TakedownKills" => "takedown_kills",
        "VehicleKills" => "vehicle_kills",
        _ => return None,
    })
}

/// Vital/float field for a `FloatData` map key.
pub fn float_data_field(key: &str) -> Option<&'static str> {
    Some(match key {
        "Fatigue" => "fatigue",
        "InfectionBuildup" => "infection_buildup",
        "WellRested" => "well_rested",
        "Energy" => "energy",
        "Hood" => "hood",
        "HypoHandle" => "hypo_handle",
        "Battery" => "battery",
        _ => return None,
    })
}
