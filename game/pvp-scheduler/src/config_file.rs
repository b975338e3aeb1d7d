//! Line-level edits of the game server settings file. Only the `PVP=` and
//! `ServerName=` lines are ever rewritten; everything else passes through
//! byte for byte.

use once_cell::sync::Lazy;
use regex::Regex;

static PVP_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(PVP\s*=\s*)(\d)").unwrap());
static SERVER_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^(ServerName\s*=\s*)"?([^"\r\n]*)"?"#).unwrap());
static PVP_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*- PVP Enabled \d{1,2}:\d{2}-\d{1,2}:\d{2}.*$").unwrap());

pub fn read_pvp_flag(content: &str) -> Option<bool> {
    PVP_LINE_RE
        .captures(content)
        .map(|c| &c[2] == "1")
}

/// `None` when the `PVP=` line is missing.
pub fn set_pvp_flag(content: &str, on: bool) -> Option<String> {
    if !PVP_LINE_RE.is_match(content) {
        return None;
    }
    let digit = if on { "1" } else { "0" };
    Some(
        PVP_LINE_RE
            .replace(content, format!("${{1}}{}", digit))
            .into_owned(),
    )
}

pub fn read_server_name(content: &str) -> Option<String> {
    SERVER_NAME_RE.captures(content).map(|c| c[2].to_string())
}

pub fn set_server_name(content: &str, name: &str) -> Option<String> {
    if !SERVER_NAME_RE.is_match(content) {
        return None;
    }
    Some(
        SERVER_NAME_RE
            .replace(content, format!("${{1}}\"{}\"", name))
            .into_owned(),
    )
}

/// Strips a previously applied PvP suffix, yielding the clean base name.
pub fn strip_pvp_suffix(name: &str) -> String {
    PVP_SUFFIX_RE.replace(name, "").into_owned()
}

pub fn pvp_suffix(start_minutes: u32, end_minutes: u32, tz: &str) -> String {
    format!(
        "- PVP Enabled {:02}:{:02}-{:02}:{:02} {}",
        start_minutes / 60,
        start_minutes % 60,
        end_minutes / 60,
        end_minutes % 60,
        tz
    )
}
