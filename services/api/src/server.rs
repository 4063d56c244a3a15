use crate::cli::ServeArgs;
use crate::infra::{build_engine, AppState, InMemoryTriageRepository, LoggingActionDispatcher};
use crate::routes::with_triage_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use case_triage::config::AppConfig;
use case_triage::error::AppError;
use case_triage::telemetry;
use case_triage::workflows::triage::TriageService;
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

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = Arc::new(TriageService::new(
        build_engine(&config)?,
        Arc::new(InMemoryTriageRepository::default()),
        Arc::new(LoggingActionDispatcher::default()),
    ));

    let app = with_triage_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        max_concurrency = config.triage.max_concurrency,
        "case triage service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
