mod cli;

use std::path::Path;

use clap::Parser;
use parampack::{NameFilter, Pack, PackConfig, PatternFilter, RecordSummary};
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

use crate::cli::{Cli, Command};

#[derive(Serialize)]
struct KeyRecords {
    key: String,
    records: Vec<RecordSummary>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::ERROR,
        (false, 0) => LevelFilter::WARN,
        (false, 1) => LevelFilter::INFO,
        (false, 2) => LevelFilter::DEBUG,
        (false, _) => LevelFilter::TRACE,
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(level);
    tracing_subscriber::registry().with(layer).init();
}

fn open_pack(store: &Path, config: Option<&Path>) -> parampack::Result<Pack> {
    let config = match config {
        Some(path) => PackConfig::load(path)?,
        None => PackConfig::default(),
    };
    Pack::with_config(store, config)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.config.as_deref();
    match cli.command {
        Command::Keys { store, json } => {
            let pack = open_pack(&store, config)?;
            let keys = pack.keys()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&keys)?);
            } else if keys.is_empty() {
                println!("{}: no keys", store.display());
            } else {
                for entry in &keys {
                    println!("{}\toffset={}\tlength={}", entry.key, entry.offset, entry.length);
                }
            }
            Ok(())
        }

        Command::Inspect {
            store,
            key,
            filters,
            json,
        } => {
            let pack = open_pack(&store, config)?;
            let filter = PatternFilter::new(&filters)?;
            let keys = match key {
                Some(key) => vec![key],
                None => pack.keys()?.into_iter().map(|entry| entry.key).collect(),
            };

            let mut listing = Vec::with_capacity(keys.len());
            for key in keys {
                let records = pack
                    .records(&key)?
                    .into_iter()
                    // Records keep local names only; the namespace is not stored.
                    .filter(|summary| filter.admits(&summary.name))
                    .collect();
                listing.push(KeyRecords { key, records });
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
                return Ok(());
            }
            for group in &listing {
                println!("{}", group.key);
                for summary in &group.records {
                    let shapes: Vec<String> =
                        summary.shapes.iter().map(|dims| format!("{dims:?}")).collect();
                    println!(
                        "  {:<17} {:<32} {} (offset={}, length={}, elements={})",
                        summary.kind.to_string(),
                        summary.name,
                        shapes.join(" "),
                        summary.offset,
                        summary.length,
                        summary.elements
                    );
                }
            }
            Ok(())
        }

        Command::Verify { store, json } => {
            let pack = open_pack(&store, config)?;
            let report = pack.verify()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for key in &report.keys {
                    println!("{}\trecords={}\tlength={}", key.key, key.records, key.length);
                }
                println!(
                    "ok: {} keys, {} indexed bytes, {} data bytes, {} orphaned",
                    report.keys.len(),
                    report.indexed_bytes,
                    report.data_bytes,
                    report.orphaned_bytes
                );
            }
            Ok(())
        }
    }
}
