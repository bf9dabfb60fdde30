use clap::{Parser, Subcommand};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "moodwire")]
#[command(about = "Network-mood pipeline: collect, rank, score, summarize")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one full pipeline cycle (collect → aggregate → publish).
    Run {
        /// Override the configured window length in minutes.
        #[arg(long)]
        window_minutes: Option<i64>,
        /// Compute the summary but skip the publish step.
        #[arg(long)]
        dry_run: bool,
        /// Use the in-memory store — no Postgres needed, nothing persists.
        #[arg(long)]
        memory: bool,
        /// Idempotency token for duplicate-run suppression.
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// Show one run's status and summary.
    Status {
        run_id: uuid::Uuid,
    },
    /// List recent runs, newest first.
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Delete runs past their retention period.
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = moodwire_core::load_app_config_from_env()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            window_minutes,
            dry_run,
            memory,
            idempotency_key,
        } => {
            commands::run(
                &config,
                window_minutes,
                dry_run,
                memory,
                idempotency_key.as_deref(),
            )
            .await
        }
        Commands::Status { run_id } => commands::status(&config, run_id).await,
        Commands::Runs { limit } => commands::runs(&config, limit).await,
        Commands::Purge => commands::purge(&config).await,
    }
}
