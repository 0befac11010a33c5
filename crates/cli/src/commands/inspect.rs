use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use dynload_core::artifact::format::descriptor;
use dynload_core::artifact::{decode, DecodedUnit, PoolEntry};

use crate::commands::build_from_file;

#[derive(Debug, Serialize)]
pub struct PoolRow {
    pub index: u16,
    pub tag: &'static str,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct MemberRow {
    pub kind: &'static str,
    pub name: String,
    pub descriptor: String,
    pub code: Vec<String>,
}

/// Disassembly of a built artifact.
#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub name: String,
    pub base: String,
    pub public: bool,
    pub instantiable: bool,
    pub sha256: String,
    pub pool: Vec<PoolRow>,
    pub members: Vec<MemberRow>,
}

fn pool_value(entry: &PoolEntry) -> String {
    match entry {
        PoolEntry::Utf8(s) => format!("{s:?}"),
        PoolEntry::Str(idx) => format!("#{idx}"),
        PoolEntry::Int(v) => v.to_string(),
        PoolEntry::Bool(v) => v.to_string(),
        PoolEntry::ExternalRef { target, method, descriptor } => {
            format!("#{target}::#{method} #{descriptor}")
        }
    }
}

impl InspectReport {
    pub fn new(unit: &DecodedUnit, sha256: String) -> Self {
        let pool = unit
            .pool
            .iter()
            .enumerate()
            .map(|(index, entry)| PoolRow {
                // The decoder caps the pool at u16::MAX entries.
                index: index as u16,
                tag: entry.tag_name(),
                value: pool_value(entry),
            })
            .collect();
        let members = unit
            .members
            .iter()
            .map(|m| MemberRow {
                kind: m.kind.as_str(),
                name: m.name.clone(),
                descriptor: descriptor(&m.signature),
                code: m.code.iter().map(|op| unit.render_op(op)).collect(),
            })
            .collect();
        Self {
            name: unit.name.clone(),
            base: unit.base.clone(),
            public: unit.is_public(),
            instantiable: unit.is_instantiable(),
            sha256,
            pool,
            members,
        }
    }
}

/// Build a unit and print its decoded pool and member disassembly.
pub fn inspect_command(description: &Path, json: bool) -> Result<()> {
    let artifact = build_from_file(description, false)?;
    let unit = decode(artifact.as_bytes()).context("Built artifact failed to decode")?;
    let report = InspectReport::new(&unit, artifact.digest());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut flags = Vec::new();
    if report.public {
        flags.push("public");
    }
    if report.instantiable {
        flags.push("instantiable");
    }

    println!("Unit {} extends {} [{}]", report.name, report.base, flags.join(", "));
    println!("SHA-256: {}", report.sha256);
    println!();
    println!("Constant pool ({} entries):", report.pool.len());
    for row in &report.pool {
        println!("  #{:<4} {:<13} {}", row.index, row.tag, row.value);
    }
    println!();
    println!("Members ({}):", report.members.len());
    for member in &report.members {
        println!("  {} {}{}", member.kind, member.name, member.descriptor);
        for (pc, line) in member.code.iter().enumerate() {
            println!("    {pc:>3}: {line}");
        }
    }

    Ok(())
}
