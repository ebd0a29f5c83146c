use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryAttachmentStore, InMemoryRecordStore};
use crate::routes::with_registration_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use recruit_board::config::AppConfig;
use recruit_board::error::AppError;
use recruit_board::telemetry;
use recruit_board::workflows::registration::{
    AttachmentStore, RecordStore, RegistrationSessions, RestBackend, SubmissionPipeline,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    if config.storage.base_url.is_some() {
        let backend = Arc::new(RestBackend::from_config(&config.storage)?);
        info!(?backend, "using hosted storage backend");
        serve(config, Arc::clone(&backend), backend).await
    } else {
        warn!("STORAGE_BASE_URL not set; registrations are kept in memory");
        serve(
            config,
            Arc::new(InMemoryAttachmentStore::default()),
            Arc::new(InMemoryRecordStore::default()),
        )
        .await
    }
}

async fn serve<A, R>(config: AppConfig, attachments: Arc<A>, records: Arc<R>) -> Result<(), AppError>
where
    A: AttachmentStore + 'static,
    R: RecordStore + 'static,
{
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let schema = config.registration.schema.schema();
    let sessions = Arc::new(
        RegistrationSessions::new(schema, SubmissionPipeline::new(attachments, records))
            .with_shake_duration(config.registration.shake_duration)
            .with_idle_timeout(config.registration.session_idle_timeout),
    );

    let app = with_registration_routes(sessions)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        schema = ?config.registration.schema,
        %addr,
        "registration service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
