// ABOUTME: Gateway boot sequence and graceful shutdown
// ABOUTME: Wires the pool, stores, limiter, collector, proxy, and router

use crate::config::Config;
use anyhow::Context;
use octroi_agents::{AgentStore, BudgetStore};
use octroi_api::{build_router, RouterDeps};
use octroi_metering::{Collector, MeterStore};
use octroi_proxy::ProxyHandler;
use octroi_ratelimit::{Limiter, ToolRateLimitStore, ToolRateLimiter};
use octroi_registry::{AesGcmCipher, Cipher, ToolService, ToolStore};
use octroi_users::UserStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let cfg = Config::load(config_path.as_deref()).context("loading configuration")?;

    let pool = octroi_storage::connect(&cfg.database.url, cfg.database.max_connections)
        .await
        .context("connecting to database")?;
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("pinging database")?;
    info!("connected to database");

    let cipher: Option<Arc<dyn Cipher>> = AesGcmCipher::from_hex_key(&cfg.encryption.key)
        .context("initialising encryption cipher")?
        .map(|c| Arc::new(c) as Arc<dyn Cipher>);

    let tool_store = ToolStore::new(pool.clone(), cipher);
    let tool_service = Arc::new(ToolService::new(tool_store.clone()));
    let agent_store = AgentStore::new(pool.clone());
    let budget_store = BudgetStore::new(pool.clone());
    let meter_store = MeterStore::new(pool.clone());
    let user_store = UserStore::new(pool.clone());
    let tool_rate_limit_store = ToolRateLimitStore::new(pool.clone());

    let collector = Collector::new(
        Arc::new(meter_store.clone()),
        cfg.metering.batch_size as usize,
        cfg.flush_interval(),
    );
    collector.start();

    let limiter = Arc::new(Limiter::new(cfg.rate_limit.default, cfg.rate_limit_window()));
    let tool_rate_limiter = ToolRateLimiter::new(
        Arc::new(tool_rate_limit_store.clone()),
        limiter.clone(),
    );

    let proxy = Arc::new(
        ProxyHandler::new(
            Arc::new(tool_store),
            Arc::new(budget_store.clone()),
            Arc::new(collector.clone()),
            cfg.proxy_timeout(),
            cfg.proxy.max_request_size,
        )
        .with_tool_rate_limits(Arc::new(tool_rate_limiter)),
    );

    let router = build_router(RouterDeps {
        pool,
        tools: tool_service,
        agents: agent_store,
        budgets: budget_store,
        meter: meter_store,
        users: user_store,
        tool_rate_limits: tool_rate_limit_store,
        limiter,
        proxy,
        allowed_origins: cfg.cors.allowed_origins.clone(),
    });

    let listener = tokio::net::TcpListener::bind(cfg.addr())
        .await
        .with_context(|| format!("binding {}", cfg.addr()))?;
    info!(addr = %cfg.addr(), "server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    info!("shutting down");
    // Drain buffered transactions before exiting.
    collector.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
