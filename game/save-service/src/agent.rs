//! Assembles the self-contained remote parser script.
//!
//! The remote host only runs Node, so the deployable parser is the JavaScript
//! rendition of the reader/property/save-parser stack, concatenated into one
//! file with a CLI trailer.

pub const CACHE_FORMAT_VERSION: i64 = 1;

const SECTIONS: [(&str, &str); 5] = [
    ("io framing", include_str!("agent/header.js")),
    ("binary reader", include_str!("agent/binary_reader.js")),
    ("property reader", include_str!("agent/property_reader.js")),
    ("save parser", include_str!("agent/save_parser.js")),
    ("cli", include_str!("agent/cli.js")),
];

pub fn build_agent_script() -> String {
    let mut out = String::with_capacity(64 * 1024);
    out.push_str(&format!(
        "// humanitz save parser agent, cache format v{}\n",
        CACHE_FORMAT_VERSION
    ));
    for (title, source) in SECTIONS {
        out.push_str(&format!("\n// ---- {} ----\n", title));
        // the shebang only makes sense at the very top
        let source = source.strip_prefix("#!/usr/bin/env node\n").unwrap_or(source);
        out.push_str(&source.replace("__CACHE_VERSION__", &CACHE_FORMAT_VERSION.to_string()));
    }
    out
}
