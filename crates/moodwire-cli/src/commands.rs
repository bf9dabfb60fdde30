//! CLI command handlers.

use std::sync::Arc;

use moodwire_core::AppConfig;
use moodwire_feed::SearchClient;
use moodwire_pipeline::{
    format_quiet, format_summary, run_cycle, LogPublisher, PipelineConfig, RankedItem,
    RunOutcome, RunReport,
};
use moodwire_sentiment::LexiconScorer;
use moodwire_store::{
    MemoryRunStore, PgRunStore, PoolConfig, RetryConfig, Run, RunStore,
};
use uuid::Uuid;

/// Connect to Postgres and wrap it in the run store, running migrations.
async fn connect_store(config: &AppConfig) -> anyhow::Result<PgRunStore> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set (or pass --memory to `run`)"))?;
    let pool = moodwire_store::connect_pool(url, PoolConfig::from_app_config(config)).await?;
    moodwire_store::run_migrations(&pool).await?;
    Ok(PgRunStore::new(
        pool,
        config.retention_hours,
        RetryConfig::from_app_config(config),
    ))
}

pub async fn run(
    config: &AppConfig,
    window_minutes: Option<i64>,
    dry_run: bool,
    memory: bool,
    idempotency_key: Option<&str>,
) -> anyhow::Result<()> {
    let mut pipeline_config = PipelineConfig::from_app_config(config);
    if let Some(minutes) = window_minutes {
        anyhow::ensure!(minutes > 0, "--window-minutes must be positive");
        pipeline_config.window_minutes = minutes;
    }
    if dry_run {
        pipeline_config.dry_run = true;
    }

    let source = Arc::new(SearchClient::with_base_url(
        config.feed_timeout_secs,
        &config.search_base_url,
    )?);

    let report = if memory {
        let store = MemoryRunStore::new(config.retention_hours);
        execute(&store, source, &pipeline_config, idempotency_key).await?
    } else {
        let store = connect_store(config).await?;
        execute(&store, source, &pipeline_config, idempotency_key).await?
    };

    print_report(&report, pipeline_config.window_minutes);
    Ok(())
}

async fn execute<St: RunStore>(
    store: &St,
    source: Arc<SearchClient>,
    pipeline_config: &PipelineConfig,
    idempotency_key: Option<&str>,
) -> anyhow::Result<RunReport> {
    let report = run_cycle(
        store,
        source,
        &LexiconScorer,
        &LogPublisher,
        pipeline_config,
        idempotency_key,
    )
    .await?;
    Ok(report)
}

fn print_report(report: &RunReport, window_minutes: i64) {
    println!("run {}", report.run_id);
    match &report.outcome {
        RunOutcome::Duplicate(status) => {
            println!("already handled by an earlier invocation (status: {status})");
        }
        RunOutcome::Quiet => println!("{}", format_quiet(window_minutes)),
        RunOutcome::Summarized(summary) => {
            println!("(dry run) {}", format_summary(summary));
            print_top_items(&summary.top_items);
        }
        RunOutcome::Published(summary, receipt) => {
            println!("{}", format_summary(summary));
            println!("published as {} ({})", receipt.post_id, receipt.content_id);
            print_top_items(&summary.top_items);
        }
    }
}

fn print_top_items(top_items: &[RankedItem]) {
    for item in top_items {
        println!(
            "  #{} @{} — {} engagements ({:?})",
            item.rank, item.author_handle, item.engagement, item.sentiment_category
        );
    }
}

pub async fn status(config: &AppConfig, run_id: Uuid) -> anyhow::Result<()> {
    let store = connect_store(config).await?;
    let run = store.get_run(run_id).await?;
    let stored_items = store.count_items(run_id).await?;

    print_run_line(&run);
    println!("  window: {} → {}", run.window_start, run.window_end);
    println!(
        "  cursor: '{}', has_more: {}, rounds: {}, stored items: {stored_items}",
        run.cursor, run.has_more, run.rounds_completed
    );
    if let Some(reason) = &run.failure_reason {
        println!("  failure: {reason}");
    }
    if let Some(count) = run.item_count {
        println!("  aggregated over {count} items");
    }
    if let (Some(average), Some(mood)) = (run.average_compound, &run.mood_label) {
        println!(
            "  mood: {mood} ({:+.1}% net sentiment)",
            average * 100.0
        );
    }
    if let Some(top) = &run.top_items {
        let top_items: Vec<RankedItem> = serde_json::from_value(top.clone())?;
        print_top_items(&top_items);
    }
    Ok(())
}

pub async fn runs(config: &AppConfig, limit: i64) -> anyhow::Result<()> {
    let store = connect_store(config).await?;
    let runs = store.list_recent_runs(limit).await?;
    if runs.is_empty() {
        println!("no runs recorded");
        return Ok(());
    }
    for run in &runs {
        print_run_line(run);
    }
    Ok(())
}

fn print_run_line(run: &Run) {
    println!(
        "{}  {}  {:9}  {}",
        run.run_id,
        run.created_at.format("%Y-%m-%d %H:%M:%S"),
        run.status.as_str(),
        run.mood_label.as_deref().unwrap_or("-")
    );
}

pub async fn purge(config: &AppConfig) -> anyhow::Result<()> {
    let store = connect_store(config).await?;
    let purged = store.purge_expired().await?;
    println!("purged {purged} expired runs");
    Ok(())
}
