use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use beta_admin_api::{
    AppState,
    config::Config,
    invite::{
        HttpForwarder, InviteService, LogAuditWriter, QueuedAuditSink, RateLimitPolicy,
        RateLimiter,
    },
    router::create_router,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(1);
    });

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池（按需建立连接）
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET TIME ZONE 'UTC';").await?;
                Ok(())
            })
        })
        .connect_lazy_with(config.database.connect_options());

    // 邀请转发：限流、webhook、审计
    let forwarder = HttpForwarder::new(config.webhook_url.clone(), config.webhook_timeout())
        .unwrap_or_else(|e| {
            tracing::error!("Failed to build webhook client: {}", e);
            std::process::exit(1);
        });
    let limiter = Arc::new(RateLimiter::new(RateLimitPolicy::default()));
    let sweeper = limiter
        .clone()
        .spawn_sweeper(config.rate_limit_sweep_interval());
    let (audit, audit_drain) =
        QueuedAuditSink::spawn(LogAuditWriter, config.audit_queue_capacity);

    // 设置应用状态
    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        invites: InviteService::new(limiter, Arc::new(forwarder), Arc::new(audit)),
    };

    let router = create_router(state);

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        });
    tracing::info!("Server listening on {}", addr);

    if let Err(e) = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!("Server error: {}", e);
    }

    // 路由已释放，审计队列的发送端随之关闭，等待剩余记录写完
    sweeper.abort();
    if tokio::time::timeout(Duration::from_secs(5), audit_drain)
        .await
        .is_err()
    {
        tracing::warn!("Timed out draining invite audit queue");
    }
    pool.close().await;
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
