use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use dynload_core::artifact::decode;
use dynload_core::{BinaryArtifact, BuildOptions, UnitBuilder};

use crate::{hex_dump, load_description};

/// Summary of one built artifact.
#[derive(Debug, Serialize)]
pub struct BuildSummary {
    pub name: String,
    pub size: usize,
    pub sha256: String,
    pub pool_entries: usize,
    pub members: usize,
}

impl BuildSummary {
    pub fn from_artifact(artifact: &BinaryArtifact) -> Result<Self> {
        let unit = decode(artifact.as_bytes()).context("Built artifact failed to decode")?;
        Ok(Self {
            name: unit.name,
            size: artifact.len(),
            sha256: artifact.digest(),
            pool_entries: unit.pool.len(),
            members: unit.members.len(),
        })
    }
}

/// Options shared by every command that builds from a description file.
pub fn build_options(no_pool: bool) -> BuildOptions {
    BuildOptions { pool_constants: !no_pool }
}

/// Load a description file and build it with the standard catalog.
pub fn build_from_file(description: &Path, no_pool: bool) -> Result<BinaryArtifact> {
    let desc = load_description(description)?;
    UnitBuilder::new()
        .with_options(build_options(no_pool))
        .build(&desc)
        .with_context(|| format!("Failed to build unit {}", desc.name))
}

/// Build a unit from a description and print a summary. The artifact stays in memory.
pub fn build_command(description: &Path, hex: bool, json: bool, no_pool: bool) -> Result<()> {
    let artifact = build_from_file(description, no_pool)?;

    if hex {
        print!("{}", hex_dump(artifact.as_bytes()));
        return Ok(());
    }

    let summary = BuildSummary::from_artifact(&artifact)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Built unit: {}", summary.name);
    println!("  Size: {} bytes", summary.size);
    println!("  SHA-256: {}", summary.sha256);
    println!("  Pool entries: {}", summary.pool_entries);
    println!("  Members: {}", summary.members);

    Ok(())
}
