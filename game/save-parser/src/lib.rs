pub mod clans;
pub mod json;
pub mod model;
pub mod parser;
pub mod tables;

#[cfg(test)]
pub(crate) mod testenc;

pub use clans::parse_clan_save;
pub use model::{
    ParsedClan, ParsedClanMember, ParsedCompanion, ParsedContainer, ParsedDeadBody,
    ParsedLootActor, ParsedPlayer, ParsedQuest, ParsedSave, ParsedStructure, ParsedVehicle,
};
pub use parser::{parse_save, SaveParser};
