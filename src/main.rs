// sqldumpsplit command line.
// `analyze` scans a dump and reports its tables; `split` also writes one file per
// selected table using the positions recorded during the scan.

use clap::{Args, CommandFactory, Parser, Subcommand};
use sqldumpsplit::extractor::{ExtractMode, ExtractOptions};
use sqldumpsplit::progress::ProgressManager;
use sqldumpsplit::scanner::{DuplicatePolicy, ScanOptions};
use sqldumpsplit::{logger, report, WorkUnit};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Enable debug logging (disables progress bars).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a dump and list its tables.
    Analyze {
        #[command(flatten)]
        scan: ScanArgs,

        /// Write the full analysis as JSON to this file.
        #[arg(long)]
        json: Option<PathBuf>,

        /// Print the CREATE TABLE text of this table.
        #[arg(long)]
        structure: Option<String>,
    },
    /// Scan a dump and write selected tables to separate files.
    Split {
        #[command(flatten)]
        scan: ScanArgs,

        /// Table to extract (repeatable).
        #[arg(long = "table", short = 't')]
        tables: Vec<String>,

        /// Extract every table found in the dump.
        #[arg(long, conflicts_with = "tables")]
        all: bool,

        /// Run one pass per table in parallel instead of a single shared pass.
        #[arg(long)]
        per_table: bool,

        /// Worker threads for --per-table (0 = num CPU).
        #[arg(long, default_value_t = 0)]
        workers: usize,
    },
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Dump file (.sql or .sql.gz).
    dump: PathBuf,

    /// Directory for split output and decompressed dumps.
    #[arg(long, short = 'o', default_value = "outputs")]
    out: PathBuf,

    /// Keep INSERT statistics when a table is declared again.
    #[arg(long)]
    merge_duplicates: bool,

    /// Cap on buffered CREATE TABLE text per table, in bytes.
    #[arg(long)]
    structure_cap: Option<usize>,
}

impl ScanArgs {
    fn options(&self) -> ScanOptions {
        ScanOptions {
            duplicate_policy: if self.merge_duplicates {
                DuplicatePolicy::Merge
            } else {
                DuplicatePolicy::Replace
            },
            max_structure_bytes: self.structure_cap,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if std::env::args().len() == 1 {
        Cli::command().print_help()?;
        eprintln!();
        std::process::exit(1);
    }
    let cli = Cli::parse();
    logger::init(cli.debug);

    // Progress bars are disabled in debug mode to avoid mangled output.
    let progress = ProgressManager::new(!cli.debug);
    let start = Instant::now();
    let mut stderr = io::stderr();

    match cli.command {
        Command::Analyze {
            scan,
            json,
            structure,
        } => {
            let unit = WorkUnit::analyze(&scan.dump, &scan.out, scan.options(), &progress)?;
            report::print_tables(&mut stderr, &unit.analysis)?;
            report::print_summary(&mut stderr, &unit.analysis)?;

            if let Some(name) = structure {
                match unit.analysis.catalog.get(&name) {
                    Some(table) => {
                        let mut stdout = io::stdout();
                        writeln!(
                            stdout,
                            "{}",
                            report::structure_preview(
                                &table.structure,
                                report::STRUCTURE_PREVIEW_BYTES
                            )
                        )?;
                    }
                    None => tracing::warn!("Table {} not found in {}", name, scan.dump.display()),
                }
            }

            if let Some(path) = json {
                let text = serde_json::to_string_pretty(&unit.analysis)?;
                std::fs::write(&path, text)?;
                tracing::info!("Analysis written to {}", path.display());
            }
        }
        Command::Split {
            scan,
            tables,
            all,
            per_table,
            workers,
        } => {
            let unit = WorkUnit::analyze(&scan.dump, &scan.out, scan.options(), &progress)?;
            let selected = if all { unit.table_names() } else { tables };
            if selected.is_empty() {
                tracing::error!("No tables selected; pass --table NAME or --all");
                std::process::exit(2);
            }

            let options = ExtractOptions {
                mode: if per_table {
                    ExtractMode::PerTable
                } else {
                    ExtractMode::Shared
                },
                workers,
            };
            let outcomes = unit.split(&selected, &options, &progress);
            report::print_outcomes(&mut stderr, &outcomes)?;

            tracing::debug!("split took {:?}", start.elapsed());
            if outcomes.iter().any(|o| !o.success) {
                std::process::exit(1);
            }
        }
    }

    tracing::debug!("done in {:?}", start.elapsed());
    Ok(())
}
