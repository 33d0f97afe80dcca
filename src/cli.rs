use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::model::LinkRef;

#[derive(Parser)]
#[command(
    name = "rpplink",
    about = "Inspect and rewrite MIDI CC parameter links in REAPER project files"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List every modulation link with its TRACK/FX/LINK address
    Links {
        /// Path to the project file (.RPP)
        project: PathBuf,
    },
    /// Rewrite the MIDI wire assignment of selected links in place
    Reassign(ReassignArgs),
}

#[derive(clap::Args)]
pub struct ReassignArgs {
    /// Path to the project file (.RPP)
    pub project: PathBuf,

    /// Link to edit, as TRACK/FX/LINK (repeatable)
    #[arg(long = "link", required = true, value_name = "T/F/L")]
    pub links: Vec<LinkRef>,

    /// New controller number (0-127)
    #[arg(long)]
    pub cc: Option<u32>,

    /// New MIDI channel (0-16, 0 = all)
    #[arg(long)]
    pub channel: Option<u32>,

    /// New MIDI bus (0-15)
    #[arg(long)]
    pub bus: Option<u32>,

    /// Write the result here instead of overwriting the project
    #[arg(long)]
    pub out: Option<PathBuf>,
}
