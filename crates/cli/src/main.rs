use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dynload::commands::{
    build_command, demo_command, inspect_command, list_capabilities_command, run_command,
};
use dynload::init_logging;

/// Build executable units at runtime and load them from memory.
///
/// This CLI is a thin wrapper around `dynload-core` (exposed in code as `dynload_core`).
/// All substantive logic lives in the library so it can be tested thoroughly
/// and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "dynload",
    version,
    about = "Build executable units at runtime and load them from memory",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build, load, and run the built-in HelloWorld unit.
    Demo {
        /// Emit JSON instead of letting the unit print directly.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Build a unit from a YAML/JSON description and summarize the artifact.
    ///
    /// The artifact is kept in memory; nothing is written to disk.
    Build {
        /// Path to the unit description (`.json` for JSON, anything else for YAML).
        #[arg(long)]
        description: PathBuf,

        /// Print a hex dump of the artifact instead of a summary.
        #[arg(long, default_value_t = false)]
        hex: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Give every value constant its own pool slot.
        #[arg(long, default_value_t = false)]
        no_pool: bool,
    },

    /// Build a unit and print its constant pool and member disassembly.
    Inspect {
        /// Path to the unit description.
        #[arg(long)]
        description: PathBuf,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Build a unit, load it, and invoke one of its zero-argument methods.
    Run {
        /// Path to the unit description.
        #[arg(long)]
        description: PathBuf,

        /// Method to invoke.
        #[arg(long)]
        member: String,

        /// Give every value constant its own pool slot.
        #[arg(long, default_value_t = false)]
        no_pool: bool,
    },

    /// List the capabilities generated code may call.
    Capabilities {
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    // Default to the demo if no command is provided.
    match cli.command.unwrap_or(Command::Demo { json: false }) {
        Command::Demo { json } => demo_command(json)?,
        Command::Build { description, hex, json, no_pool } => {
            build_command(&description, hex, json, no_pool)?
        }
        Command::Inspect { description, json } => inspect_command(&description, json)?,
        Command::Run { description, member, no_pool } => {
            run_command(&description, &member, no_pool)?
        }
        Command::Capabilities { json } => list_capabilities_command(json)?,
    }

    Ok(())
}
