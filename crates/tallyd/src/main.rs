//! Tally daemon - community activity stats.
//!
//! Ingests normalized message events into the append-only store and
//! answers windowed aggregate queries over it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use tally_common::chunker;
use tally_common::config::SettingsStore;
use tallyd::engine::{AggregationEngine, ChannelRef, RankReport};
use tallyd::ingest;
use tallyd::store::EventStore;

/// Transport block size limit for report output.
const BLOCK_LIMIT: usize = 2000;

#[derive(Parser)]
#[command(name = "tallyd")]
#[command(about = "Community activity stats daemon", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, default_value = "settings.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest JSONL raw messages from stdin into the event store
    Ingest,

    /// How active has a guild been?
    Server {
        /// Window expression (e.g. "3d12h", "all")
        window: String,
        guild: u64,
        /// Label to print instead of the guild id
        #[arg(long)]
        label: Option<String>,
    },

    /// Rank channels by message volume
    Channels {
        window: String,
        /// Channels as `id` or `id:label`
        channels: Vec<String>,
    },

    /// Rank the channels under a category
    Category {
        window: String,
        category: u64,
    },

    /// Daily activity series for a channel over the last month
    Series { channel: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let settings = SettingsStore::load(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    let db_path = settings.settings().database.clone();
    let epoch_ms = settings.settings().epoch_ms;

    match cli.command {
        Commands::Ingest => {
            let store = EventStore::open_at(&db_path, epoch_ms)
                .with_context(|| format!("opening store at {}", db_path.display()))?;
            info!(db = %db_path.display(), "ingest loop starting");

            let (tx, writer) = ingest::spawn_writer(store);
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let forwarded = ingest::run(stdin, &settings, tx).await?;
            writer.await?;
            info!(forwarded, "ingest loop finished");
        }

        Commands::Server { window, guild, label } => {
            let store = EventStore::open_readonly(&db_path, epoch_ms)?;
            let engine = AggregationEngine::new(&store);
            let label = label.unwrap_or_else(|| format!("guild {guild}"));
            let line = engine.guild_total(&window, Utc::now(), guild, &label)?;
            send_report(&line);
        }

        Commands::Channels { window, channels } => {
            let channels = channels
                .iter()
                .map(|arg| parse_channel_ref(arg))
                .collect::<Result<Vec<_>>>()?;
            let store = EventStore::open_readonly(&db_path, epoch_ms)?;
            let engine = AggregationEngine::new(&store);
            print_rank(engine.rank_channels(&window, Utc::now(), &channels)?);
        }

        Commands::Category { window, category } => {
            let store = EventStore::open_readonly(&db_path, epoch_ms)?;
            let engine = AggregationEngine::new(&store);
            print_rank(engine.rank_category(&window, Utc::now(), category)?);
        }

        Commands::Series { channel } => {
            let store = EventStore::open_readonly(&db_path, epoch_ms)?;
            let engine = AggregationEngine::new(&store);
            for (date, count) in engine.daily_series(Utc::now(), channel)? {
                println!("{date} {count}");
            }
        }
    }

    Ok(())
}

/// `id` or `id:label`.
fn parse_channel_ref(arg: &str) -> Result<ChannelRef> {
    let (id, label) = match arg.split_once(':') {
        Some((id, label)) => (id, Some(label)),
        None => (arg, None),
    };
    let id: u64 = id
        .parse()
        .with_context(|| format!("invalid channel id '{id}'"))?;
    Ok(ChannelRef {
        id,
        label: label.map(str::to_string).unwrap_or_else(|| format!("<#{id}>")),
    })
}

fn print_rank(report: RankReport) {
    match report {
        RankReport::Empty => println!("No matching channels found"),
        RankReport::Ranked(lines) => send_report(&lines.join("\n")),
    }
}

/// Print a report in transport-safe blocks.
fn send_report(text: &str) {
    for block in chunker::chunk(text, BLOCK_LIMIT) {
        println!("{block}");
    }
}
