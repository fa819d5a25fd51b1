use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand};
use epg_guide_engine::feed::ProgramFeed;
use epg_guide_engine::ingest::{BatchIngestBackend, IngestionBackend};
use epg_guide_engine::{GuideSource, GuideStore, Program, SqliteStore};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "epg-cache")]
#[command(about = "EPG guide cache inspection and maintenance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database path
    #[arg(short, long, default_value = "guide.db")]
    db: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest program records from JSON files into a source
    Ingest {
        /// Source id to ingest into
        #[arg(short, long)]
        source: String,

        /// Channel ids covered by the source (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        channels: Vec<String>,

        /// JSON files, each holding an array of program records
        files: Vec<String>,
    },

    /// List cached programs for a channel
    Query {
        /// Source id
        #[arg(short, long)]
        source: String,

        /// Channel id
        channel: String,
    },

    /// Get cache statistics
    Stats,

    /// Delete programs that ended more than the retention window ago
    Prune {
        /// Source id
        #[arg(short, long)]
        source: String,

        /// Retention window in hours
        #[arg(long, default_value = "12")]
        retention_hours: i64,
    },
}

/// Feed implementation over local JSON files, for offline ingestion
struct FileFeed;

#[async_trait]
impl ProgramFeed for FileFeed {
    async fn fetch_programs(
        &self,
        _source_id: &str,
        url: &str,
    ) -> epg_guide_engine::Result<Vec<Program>> {
        let body = std::fs::read_to_string(url)
            .map_err(|e| epg_guide_engine::GuideEngineError::Feed {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(serde_json::from_str(&body)?)
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let store = Arc::new(SqliteStore::new(&cli.db).await?);

    match cli.command {
        Commands::Ingest {
            source,
            channels,
            files,
        } => {
            let src = GuideSource {
                id: source,
                updated_at: Utc::now(),
                feed_urls: files,
                channel_ids: channels,
            };
            let backend = BatchIngestBackend::new(
                Arc::clone(&store) as Arc<dyn GuideStore>,
                Arc::new(FileFeed),
                Duration::from_secs(12 * 3600),
            );
            let report = backend.ingest(&src, &src.signature()).await?;

            println!("✅ Ingested source: {}", report.source_id);
            println!("   Rows: {}", report.rows);
            println!("   Feeds ok: {}", report.feeds_ok);
            println!("   Feeds failed: {}", report.feeds_failed);
            for err in &report.errors {
                println!("   ⚠️ {}", err);
            }
        }

        Commands::Query { source, channel } => {
            let by_channel = store
                .programs_for_channels(&source, &[channel.clone()])
                .await?;
            let programs = &by_channel[&channel];

            println!("📺 {} program(s) for channel {}:", programs.len(), channel);
            for p in programs {
                println!(
                    "   {} - {}  {}",
                    p.start.format("%Y-%m-%d %H:%M"),
                    p.end.format("%H:%M"),
                    p.title
                );
            }
        }

        Commands::Stats => {
            let stats = store.stats().await?;

            println!("📊 Cache Statistics:");
            println!("   Program rows: {}", stats.program_rows);
            println!("   Sources: {}", stats.sources);
            if let Some(oldest) = stats.oldest_end {
                println!("   Oldest program end: {}", oldest.format("%Y-%m-%d %H:%M:%S"));
            }
            if let Some(newest) = stats.newest_end {
                println!("   Newest program end: {}", newest.format("%Y-%m-%d %H:%M:%S"));
            }
        }

        Commands::Prune {
            source,
            retention_hours,
        } => {
            let cutoff = Utc::now() - chrono::Duration::hours(retention_hours);
            println!("🧹 Pruning programs that ended before {}...", cutoff);

            let deleted = store.prune(&source, cutoff).await?;

            println!("✅ Deleted {} program(s)", deleted);
        }
    }

    Ok(())
}
