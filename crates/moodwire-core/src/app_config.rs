use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    /// Postgres connection string. Optional so store-free commands
    /// (e.g. `moodwire-cli run --memory`) work without a database.
    pub database_url: Option<String>,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,

    /// Base URL of the search AppView host.
    pub search_base_url: String,
    /// Search term sampled for the network-mood window.
    pub search_query: String,
    pub feed_timeout_secs: u64,

    /// Sliding window length for each run.
    pub window_minutes: i64,
    /// How many top posts the summary embeds.
    pub top_n: usize,
    /// Items requested per page (upstream caps at 100).
    pub page_size: u32,
    /// Parallel fetch workers per collection round.
    pub fan_out: u32,
    /// Safety valve: stop collecting after this many rounds.
    pub max_rounds: u32,
    /// Wall-clock budget for one round's fan-out barrier.
    pub round_timeout_secs: u64,
    /// Wall-clock budget for the whole collection stage.
    pub collect_budget_secs: u64,
    /// Run records expire this many hours after creation.
    pub retention_hours: i64,
    /// When set, skip the publish step and only log the summary.
    pub dry_run: bool,
    /// Cron expression for the recurring mood tick.
    pub cron_schedule: String,

    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub store_max_retries: u32,
    pub store_backoff_base_ms: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &self.database_url.as_ref().map(|_| "[redacted]"))
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("search_base_url", &self.search_base_url)
            .field("search_query", &self.search_query)
            .field("feed_timeout_secs", &self.feed_timeout_secs)
            .field("window_minutes", &self.window_minutes)
            .field("top_n", &self.top_n)
            .field("page_size", &self.page_size)
            .field("fan_out", &self.fan_out)
            .field("max_rounds", &self.max_rounds)
            .field("round_timeout_secs", &self.round_timeout_secs)
            .field("collect_budget_secs", &self.collect_budget_secs)
            .field("retention_hours", &self.retention_hours)
            .field("dry_run", &self.dry_run)
            .field("cron_schedule", &self.cron_schedule)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("store_max_retries", &self.store_max_retries)
            .field("store_backoff_base_ms", &self.store_backoff_base_ms)
            .finish()
    }
}
