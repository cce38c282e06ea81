use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use engagement_service::clock::{Clock, SystemClock};
use engagement_service::config::{Config, SERVICE_NAME};
use engagement_service::metrics::serve_metrics;
use engagement_service::storage::{PgGateway, StorageGateway};
use engagement_service::workers::SweepScheduler;
use engagement_service::EngagementService;

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn health(service: web::Data<Arc<EngagementService>>) -> impl Responder {
    match service.ping().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "status": "ok" })),
        Err(e) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "unavailable",
            "error": e.to_string(),
        })),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting {}", SERVICE_NAME);

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        env = %config.app.env,
        http_port = config.app.http_port,
        isolation = %config.consistency.isolation,
        max_attempts = config.consistency.max_attempts,
        "Configuration loaded"
    );
    config.database.log_config();

    let pg_pool = db_pool::create_pool(config.database.clone())
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations applied");

    let gateway: Arc<dyn StorageGateway> = Arc::new(PgGateway::new(
        pg_pool.clone(),
        SERVICE_NAME,
        config.consistency.isolation,
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let service = Arc::new(EngagementService::new(
        gateway,
        clock.clone(),
        config.consistency.retry_config(),
        config.retention.batch_size,
    ));

    let mut join_set = JoinSet::new();

    let scheduler = SweepScheduler::new(service.sweeper(), clock, config.retention.clone());
    let sweep_cancel = scheduler.cancellation_token();
    if config.retention.enabled {
        join_set.spawn(async move {
            scheduler.run().await;
            Ok(())
        });
    } else {
        info!("Retention sweeper disabled by configuration");
    }

    let http_addr = format!("{}:{}", config.app.host, config.app.http_port);
    info!("HTTP health and metrics: http://{}", http_addr);

    let http_service = service.clone();
    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(http_service.clone()))
            .route("/health", web::get().to(health))
            .route("/metrics", web::get().to(serve_metrics))
    })
    .disable_signals()
    .bind(&http_addr)
    .context("Failed to bind HTTP server")?
    .run();
    let server_handle = http_server.handle();

    join_set.spawn(async move {
        http_server
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
    });

    join_set.spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        sweep_cancel.cancel();
        server_handle.stop(true).await;
        Ok(())
    });

    while let Some(result) = join_set.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Task failed: {:#}", e);
                return Err(e);
            }
            Err(e) => {
                error!("Task panicked: {:#}", e);
                return Err(anyhow::anyhow!("Task panicked: {}", e));
            }
        }
    }

    pg_pool.close().await;
    info!("{} shut down", SERVICE_NAME);
    Ok(())
}
