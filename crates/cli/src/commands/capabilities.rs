use anyhow::Result;
use serde::Serialize;

use dynload_core::builder::CapabilityCatalog;

#[derive(Debug, Serialize)]
pub struct CapabilityInfo {
    pub target: String,
    pub method: String,
    pub descriptor: String,
    pub summary: String,
}

/// List the capabilities generated code may call.
pub fn list_capabilities_command(json: bool) -> Result<()> {
    let catalog = CapabilityCatalog::standard();
    let entries: Vec<CapabilityInfo> = catalog
        .iter()
        .map(|(id, summary)| CapabilityInfo {
            target: id.target.clone(),
            method: id.method.clone(),
            descriptor: id.descriptor(),
            summary: summary.to_string(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Capabilities:");
    for entry in entries {
        println!("- {}::{}{}: {}", entry.target, entry.method, entry.descriptor, entry.summary);
    }

    Ok(())
}
