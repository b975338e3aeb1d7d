use binary_reader::BinaryReader;
use gvas::{
    clean_property_name, read_header, read_property, ArrayValue, GvasError, Property,
    PropertyValue, ReadOptions, StructValue,
};

use crate::model::{ParsedClan, ParsedClanMember};
use crate::parser::ACCOUNT_ID_RE;
use crate::tables;

/// Parses the dedicated clan-data save: a GVAS file whose top level carries a
/// `ClanInfo` array of clan structs.
pub fn parse_clan_save(data: &[u8]) -> Result<Vec<ParsedClan>, GvasError> {
    let mut r = BinaryReader::new(data);
    read_header(&mut r)?;

    let opts = ReadOptions::default();
    let mut clans = Vec::new();
    loop {
        let before = r.position();
        match read_property(&mut r, &opts)? {
            Some(prop) => {
                if clean_property_name(&prop.name) == "ClanInfo" {
                    if let PropertyValue::Array(ArrayValue::Structs { elements, .. }) = &prop.value
                    {
                        for el in elements {
                            if let StructValue::Generic { children, .. } = el {
                                if let Some(clan) = extract_clan(children) {
                                    clans.push(clan);
                                }
                            }
                        }
                    }
                }
            }
            None => {
                if r.position() == before {
                    break;
                }
                break;
            }
        }
    }
    Ok(clans)
}

fn extract_clan(children: &[Property]) -> Option<ParsedClan> {
    let name = children
        .iter()
        .find(|p| {
            let n = clean_property_name(&p.name);
            n == "ClanName" || (n.contains("Name") && !n.contains("Member"))
        })
        .and_then(|p| p.value.as_str())?
        .to_string();
    if name.is_empty() {
        return None;
    }

    let mut members = Vec::new();
    for p in children {
        if let PropertyValue::Array(ArrayValue::Structs { elements, .. }) = &p.value {
            for el in elements {
                if let StructValue::Generic { children, .. } = el {
                    if let Some(member) = extract_member(children) {
                        members.push(member);
                    }
                }
            }
        }
    }

    Some(ParsedClan { name, members })
}

fn extract_member(children: &[Property]) -> Option<ParsedClanMember> {
    let mut member = ParsedClanMember::default();
    for p in children {
        let name = clean_property_name(&p.name);
        if name == "NetID" {
            if let Some(m) = p.value.as_str().and_then(|v| ACCOUNT_ID_RE.find(v)) {
                member.account_id = m.as_str().to_string();
            }
        } else if name.contains("Rank") {
            if let Some(v) = p.value.as_str() {
                member.rank = tables::resolve_clan_rank(v).to_string();
            }
        } else if name.contains("Invite") {
            member.can_invite = p.value.as_bool().unwrap_or(false);
        } else if name.contains("Kick") {
            member.can_kick = p.value.as_bool().unwrap_or(false);
        } else if name.contains("Name") {
            if let Some(v) = p.value.as_str() {
                member.name = v.to_string();
            }
        }
    }
    if member.account_id.is_empty() {
        return None;
    }
    if member.rank.is_empty() {
        member.rank = "Recruit".into();
    }
    Some(member)
}
