use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "parampack")]
#[command(about = "Inspect and verify keyed parameter stores", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// JSON config file (sync_writes, verify_checksums, max_record_bytes)
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub(crate) verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// List saved keys with their offsets and lengths.
    Keys {
        store: PathBuf,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the records saved under a key (all keys when omitted).
    Inspect {
        store: PathBuf,
        #[arg(short, long)]
        key: Option<String>,
        /// Regular expression over local record names, without the collection namespace
        /// (repeatable; any match admits)
        #[arg(short, long = "filter")]
        filters: Vec<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode every indexed record and report unindexed trailing bytes.
    Verify {
        store: PathBuf,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}
