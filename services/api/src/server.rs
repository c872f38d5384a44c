use crate::cli::ServeArgs;
use crate::infra::{bootstrap, AppState, Bootstrap};
use crate::routes::with_marketplace_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use collab_exchange::config::AppConfig;
use collab_exchange::error::AppError;
use collab_exchange::marketplace::SystemClock;
use collab_exchange::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let Bootstrap { engine, feed } = bootstrap(config.engine, Arc::new(SystemClock))?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        feed,
    };

    let app = with_marketplace_routes(engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        escrow_policy = ?config.engine.escrow_policy,
        "collaboration exchange ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
