use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use dynload_core::build;
use dynload_core::model::hello_world_unit;
use dynload_core::services::InterpreterHost;

use crate::commands::load_and_invoke;

pub const DEMO_UNIT: &str = "HelloWorld";
pub const DEMO_MEMBER: &str = "sayHello";
pub const DEMO_MESSAGE: &str = "Hello, World!";

#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub unit: String,
    pub member: String,
    pub size: usize,
    pub sha256: String,
    pub stdout: String,
}

/// Build the HelloWorld unit in memory, load it, and call `sayHello`.
pub fn demo_command(json: bool) -> Result<()> {
    let artifact = build(&hello_world_unit(DEMO_UNIT, DEMO_MESSAGE))
        .context("Failed to build demo unit")?;

    if !json {
        return load_and_invoke(Arc::new(InterpreterHost::new()), DEMO_UNIT, artifact, DEMO_MEMBER);
    }

    let (host, captured) = InterpreterHost::capturing();
    let report = DemoReport {
        unit: DEMO_UNIT.to_string(),
        member: DEMO_MEMBER.to_string(),
        size: artifact.len(),
        sha256: artifact.digest(),
        stdout: String::new(),
    };
    load_and_invoke(Arc::new(host), DEMO_UNIT, artifact, DEMO_MEMBER)?;
    let report = DemoReport { stdout: captured.stdout(), ..report };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
