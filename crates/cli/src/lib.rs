//! Library half of the `dynload` CLI.
//!
//! Command implementations live in [`commands`] so they can be exercised directly from tests;
//! `main.rs` only parses arguments and dispatches.

pub mod commands;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use dynload_core::model::UnitDescription;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging on stderr so program output on stdout stays clean.
///
/// Use the `RUST_LOG` environment variable to override the default `warn` filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // A subscriber may already be installed when commands run inside tests.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Read a unit description from disk. Files ending in `.json` are parsed as JSON, anything
/// else as YAML.
pub fn load_description(path: &Path) -> Result<UnitDescription> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read unit description: {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse unit description JSON: {}", path.display()))
    } else {
        serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse unit description YAML: {}", path.display()))
    }
}

/// Classic 16-bytes-per-line hex dump with offsets and an ASCII gutter.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (line, chunk) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}  {:<47}  |{}|\n", line * 16, hex.join(" "), ascii));
    }
    out
}
