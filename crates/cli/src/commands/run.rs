use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use dynload_core::services::{DynamicLoader, InterpreterHost, Invoker};
use dynload_core::BinaryArtifact;

use crate::commands::build_from_file;

/// Register `artifact` under `name`, resolve it, and invoke `member` on a fresh instance.
pub fn load_and_invoke(
    host: Arc<InterpreterHost>,
    name: &str,
    artifact: BinaryArtifact,
    member: &str,
) -> Result<()> {
    let loader = DynamicLoader::new(Arc::clone(&host));
    loader.register(name, artifact);
    let unit = loader.resolve(name).with_context(|| format!("Failed to load unit {name}"))?;
    host.invoke(&unit, member).with_context(|| format!("Failed to invoke {name}.{member}"))?;
    Ok(())
}

/// Build a description file, load it, and invoke one of its zero-argument members.
pub fn run_command(description: &Path, member: &str, no_pool: bool) -> Result<()> {
    let artifact = build_from_file(description, no_pool)?;
    let name = dynload_core::artifact::decode(artifact.as_bytes())
        .context("Built artifact failed to decode")?
        .name;
    load_and_invoke(Arc::new(InterpreterHost::new()), &name, artifact, member)
}
