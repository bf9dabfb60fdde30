mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(moodwire_core::load_app_config_from_env()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the server"))?;
    let pool = moodwire_store::connect_pool(
        database_url,
        moodwire_store::PoolConfig::from_app_config(&config),
    )
    .await?;
    moodwire_store::run_migrations(&pool).await?;

    let store = moodwire_store::PgRunStore::new(
        pool,
        config.retention_hours,
        moodwire_store::RetryConfig::from_app_config(&config),
    );
    let source = Arc::new(moodwire_feed::SearchClient::with_base_url(
        config.feed_timeout_secs,
        &config.search_base_url,
    )?);

    let _scheduler =
        scheduler::build_scheduler(store.clone(), Arc::clone(&source), Arc::clone(&config))
            .await?;

    let auth = AuthState::from_env(matches!(
        config.env,
        moodwire_core::Environment::Development
    ))?;
    let state = AppState {
        store,
        source,
        config: Arc::clone(&config),
    };
    let app = build_app(state, auth, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "moodwire server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
