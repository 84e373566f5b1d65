use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryRecordRepository};
use crate::routes::with_inspection_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::future::IntoFuture;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use plant_ai::config::AppConfig;
use plant_ai::error::AppError;
use plant_ai::gateway::handlers::standard_handlers;
use plant_ai::gateway::topics::{MessageKind, TopicRegistry};
use plant_ai::gateway::{mqtt_channel, GatewayError, MqttGateway, MqttPublisher, ReconnectPolicy};
use plant_ai::telemetry;
use plant_ai::workflows::inspection::{
    AnalysisMappingRegistry, EngineEndpoints, HttpTimeseriesSink, HttpWorkflowEngine,
    InspectionWorkflowService, StorageLayout,
};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(config.environment, &config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryRecordRepository::default());
    let mappings = Arc::new(AnalysisMappingRegistry::new());
    let engine = Arc::new(HttpWorkflowEngine::new(EngineEndpoints {
        anonymizer_url: config.engine.anonymizer_url.clone(),
        cloe_url: config.engine.cloe_url.clone(),
        fencilla_url: config.engine.fencilla_url.clone(),
        thermal_reading_url: config.engine.thermal_reading_url.clone(),
    }));
    let timeseries = Arc::new(HttpTimeseriesSink::new(config.timeseries.base_url.clone()));

    let (mqtt_client, mqtt_event_loop) = mqtt_channel(&config.mqtt);
    let publisher = Arc::new(MqttPublisher::new(mqtt_client.clone()));

    let service = Arc::new(InspectionWorkflowService::new(
        repository,
        engine,
        publisher,
        Arc::clone(&timeseries),
        mappings,
        StorageLayout {
            raw_account: config.storage.raw_account.clone(),
            anonymized_account: config.storage.anonymized_account.clone(),
            visualized_account: config.storage.visualized_account.clone(),
        },
    ));

    let mut topics = TopicRegistry::new();
    topics
        .register("isar/+/inspection_result", MessageKind::InspectionResult)
        .map_err(GatewayError::from)?;
    topics
        .register("isar/+/inspection_value", MessageKind::InspectionValue)
        .map_err(GatewayError::from)?;

    let shutdown = CancellationToken::new();
    let gateway = MqttGateway::new(
        mqtt_client,
        mqtt_event_loop,
        topics,
        standard_handlers(Arc::clone(&service), timeseries),
        ReconnectPolicy::new(
            config.mqtt.reconnect_delay,
            config.mqtt.max_retry_attempts,
            config.mqtt.fail_on_max_retries,
        ),
        shutdown.clone(),
    );
    let mut gateway_task = tokio::spawn(gateway.run());

    let app = with_inspection_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "inspection workflow orchestrator ready");

    let server = axum::serve(listener, app).into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            shutdown.cancel();
            result?;
        }
        result = &mut gateway_task => {
            match result {
                Ok(Ok(())) => {
                    // Silent-stop mode: the gateway gave up reconnecting
                    // but HTTP keeps serving.
                    warn!("gateway stopped, http continues");
                    server.await?;
                }
                Ok(Err(err)) => return Err(err.into()),
                Err(err) => return Err(std::io::Error::other(err).into()),
            }
        }
    }
    Ok(())
}
