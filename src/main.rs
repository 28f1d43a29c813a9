use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tracing::{error, info, warn};

use stateset_commerce as commerce;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = commerce::config::load_config().context("failed to load configuration")?;
    commerce::config::init_tracing(&cfg.log_level, cfg.log_json);
    commerce::errors::set_debug_errors(cfg.debug_errors && !cfg.is_production());
    if cfg.debug_errors && cfg.is_production() {
        warn!("debug_errors ignored in production");
    }

    // Init DB
    let db_pool = commerce::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        commerce::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = Arc::new(commerce::events::EventSender::new(event_tx));
    tokio::spawn(commerce::events::process_events(event_rx));

    let gateway = Arc::new(
        commerce::gateway::HttpPaymentGateway::new(&cfg.payment)
            .context("failed to build payment gateway client")?,
    );
    let notifier = Arc::new(commerce::notifications::LogNotificationService);

    let config = Arc::new(cfg);
    let services = commerce::handlers::AppServices::new(
        db.clone(),
        event_sender.clone(),
        config.clone(),
        gateway,
        notifier,
    );

    let app_state = commerce::AppState {
        db,
        config: config.clone(),
        event_sender,
        services,
    };
    let app = commerce::build_router(app_state);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid listen address")?;
    info!("stateset-commerce listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
