mod cli_utils;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{cmd_build, cmd_inspect, cmd_list, cmd_query};

#[derive(Parser)]
#[command(name = "geoglot")]
#[command(
    about = "Bilingual (English/Arabic) GeoIP lookup database",
    long_about = "geoglot - Build and query bilingual GeoIP databases\n\n\
    Compiles GeoLite2-style CSV feeds (a locations table with one row per\n\
    language, and a network blocks table) into a memory-mapped binary trie,\n\
    and answers longest-prefix-match lookups with English and Arabic names.\n\n\
    Examples:\n\
      geoglot build -l GeoLite2-City-Locations.csv -b GeoLite2-City-Blocks-IPv4.csv -o city.gdb\n\
      geoglot query city.gdb 1.0.0.5\n\
      geoglot list city.gdb --offset 100 --limit 50\n\
      geoglot inspect city.gdb --json"
)]
#[command(version)]
struct Cli {
    /// Log pipeline progress to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a database from locations and blocks CSV files
    Build {
        /// JSON configuration file (flags below override it)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Locations table (.csv or .csv.gz)
        #[arg(short, long, value_name = "FILE")]
        locations: Option<PathBuf>,

        /// Network blocks table (.csv or .csv.gz)
        #[arg(short, long, value_name = "FILE")]
        blocks: Option<PathBuf>,

        /// Output database file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Languages to load, comma-separated (default: en,ar)
        #[arg(long, value_delimiter = ',')]
        languages: Option<Vec<String>>,

        /// Print the rebuild summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Look up an IP address
    Query {
        /// Path to the database file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// IPv4 or IPv6 address
        #[arg(value_name = "ADDRESS")]
        address: String,

        /// Quiet mode - no output, only exit code (0 = found, 1 = not found)
        #[arg(short, long)]
        quiet: bool,
    },

    /// List records in network order
    List {
        /// Path to the database file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Records to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Records to return (at most 10000)
        #[arg(long, default_value_t = geoglot::DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// Show header facts of a database
    Inspect {
        /// Path to the database file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Commands::Build {
            config,
            locations,
            blocks,
            output,
            languages,
            json,
        } => cmd_build(config, locations, blocks, output, languages, json),
        Commands::Query {
            database,
            address,
            quiet,
        } => cmd_query(database, address, quiet),
        Commands::List {
            database,
            offset,
            limit,
        } => cmd_list(database, offset, limit),
        Commands::Inspect { database, json } => cmd_inspect(database, json),
    }
}
