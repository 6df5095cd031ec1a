mod commands;
mod stop;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{Session, Toggle};

#[derive(Parser)]
#[command(name = "procpatch")]
#[command(version, about = "Reversible in-memory patches for a running process")]
struct Args {
    /// Catalogue of patches, unlock items and bundles
    #[arg(short, long, default_value = "catalog.json", global = true)]
    catalog: PathBuf,

    /// Attach to this process instead of the catalogue target
    #[arg(long, global = true)]
    process: Option<String>,

    /// Scan this module instead of the catalogue target
    #[arg(long, global = true)]
    module: Option<String>,

    /// Scan chunk size in bytes
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the catalogue
    List,
    /// Attach and show the live state of every entry
    Status,
    /// Apply, remove or toggle code patches
    Patch {
        #[arg(value_enum)]
        action: PatchAction,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Apply or remove a patch chain
    Chain {
        #[arg(value_enum)]
        action: PatchAction,
        name: String,
    },
    /// Enable, disable or toggle unlock items
    Unlock {
        #[arg(value_enum)]
        action: Toggle,
        names: Vec<String>,
        /// Every selectable item
        #[arg(long, conflicts_with = "names")]
        all: bool,
    },
    /// Enable, disable or toggle bundles
    Bundle {
        #[arg(value_enum)]
        action: Toggle,
        names: Vec<String>,
        /// Every bundle
        #[arg(long, conflicts_with = "names")]
        all: bool,
    },
    /// Find a hex signature (`??` wildcards allowed) in the target module
    Scan { pattern: String },
    /// Hex dump target memory
    Peek {
        /// Address in hex, with or without 0x
        address: String,
        #[arg(default_value_t = 64)]
        len: usize,
    },
    /// Keep a profile applied, reapplying after the target restarts
    Watch {
        #[arg(long = "patch")]
        patches: Vec<String>,
        #[arg(long = "chain")]
        chains: Vec<String>,
        #[arg(long = "unlock")]
        unlocks: Vec<String>,
        #[arg(long = "bundle")]
        bundles: Vec<String>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum PatchAction {
    Apply,
    Remove,
    Toggle,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "procpatch=debug" } else { "procpatch=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let session = Session {
        catalog: args.catalog,
        process: args.process,
        module: args.module,
        chunk_size: args.chunk_size,
    };

    match args.command {
        Command::List => commands::list::run(&session),
        Command::Status => commands::status::run(&session),
        Command::Patch { action, names } => match action {
            PatchAction::Apply => commands::patch::run(&session, Toggle::Enable, &names),
            PatchAction::Remove => commands::patch::run(&session, Toggle::Disable, &names),
            PatchAction::Toggle => commands::patch::run(&session, Toggle::Toggle, &names),
        },
        Command::Chain { action, name } => match action {
            PatchAction::Apply => commands::chain::run(&session, Toggle::Enable, &name),
            PatchAction::Remove => commands::chain::run(&session, Toggle::Disable, &name),
            PatchAction::Toggle => commands::chain::run(&session, Toggle::Toggle, &name),
        },
        Command::Unlock { action, names, all } => commands::unlock::run(&session, action, &names, all),
        Command::Bundle { action, names, all } => commands::bundle::run(&session, action, &names, all),
        Command::Scan { pattern } => commands::scan::run(&session, &pattern),
        Command::Peek { address, len } => commands::peek::run(&session, &address, len),
        Command::Watch {
            patches,
            chains,
            unlocks,
            bundles,
        } => commands::watch::run(
            &session,
            commands::watch::Profile {
                patches,
                chains,
                unlocks,
                bundles,
            },
        ),
    }
}
