//! MQTT ingestion gateway. Owns the single broker connection on a
//! dedicated task, routes published messages through the topic
//! registry to registered handlers, and applies the reconnect policy
//! when the connection drops. Handler work is spawned off the event
//! loop so a slow downstream call never stalls the read loop.

pub mod handlers;
pub mod messages;
pub mod topics;

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::MqttConfig;
use crate::workflows::inspection::publisher::{
    AnalysisResultMessage, MessagePublisher, PublishError, VisualizationAvailableMessage,
    ANALYSIS_RESULT_TOPIC, VISUALIZATION_AVAILABLE_TOPIC,
};
use handlers::GatewayHandlers;
use topics::TopicRegistry;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error(transparent)]
    Topic(#[from] topics::TopicError),
    #[error("broker unreachable after {attempts} attempts: {reason}")]
    ConnectionLost { attempts: u32, reason: String },
}

/// What to do after a connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    RetryAfter(Duration),
    /// Stop reconnecting but leave the service running.
    GiveUp,
    /// Stop reconnecting and take the service down.
    Fatal,
}

/// Fixed-delay reconnect with a failure budget. Whether exhausting the
/// budget is fatal is a boot-time setting.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    max_attempts: u32,
    fail_on_max: bool,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration, max_attempts: u32, fail_on_max: bool) -> Self {
        Self {
            delay,
            max_attempts,
            fail_on_max,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Consecutive-failure count resets on every successful connect.
    pub fn on_connected(&mut self) {
        self.attempts = 0;
    }

    pub fn on_failure(&mut self) -> ReconnectDecision {
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            if self.fail_on_max {
                ReconnectDecision::Fatal
            } else {
                ReconnectDecision::GiveUp
            }
        } else {
            ReconnectDecision::RetryAfter(self.delay)
        }
    }
}

/// Build the shared MQTT client and its event loop from configuration.
/// The client half is cloneable and also backs the outbound publisher.
pub fn mqtt_channel(config: &MqttConfig) -> (AsyncClient, EventLoop) {
    let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(30));
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username.clone(), password.clone());
    }
    AsyncClient::new(options, 64)
}

pub struct MqttGateway {
    client: AsyncClient,
    event_loop: EventLoop,
    topics: TopicRegistry,
    handlers: GatewayHandlers,
    policy: ReconnectPolicy,
    shutdown: CancellationToken,
}

impl MqttGateway {
    pub fn new(
        client: AsyncClient,
        event_loop: EventLoop,
        topics: TopicRegistry,
        handlers: GatewayHandlers,
        policy: ReconnectPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            event_loop,
            topics,
            handlers,
            policy,
            shutdown,
        }
    }

    /// Drive the connection until shutdown, the reconnect budget runs
    /// out, or (when configured fatal) a lost connection ends the
    /// service.
    pub async fn run(mut self) -> Result<(), GatewayError> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("gateway shutting down");
                    for pattern in self.topics.patterns() {
                        if let Err(err) = self.client.unsubscribe(pattern).await {
                            warn!(pattern, error = %err, "unsubscribe failed");
                        }
                    }
                    let _ = self.client.disconnect().await;
                    return Ok(());
                }
                event = self.event_loop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        self.policy.on_connected();
                        info!("connected to broker");
                        for pattern in self.topics.patterns() {
                            self.client.subscribe(pattern, QoS::AtLeastOnce).await?;
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        self.dispatch(&publish.topic, publish.payload.to_vec());
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "broker connection error");
                        match self.policy.on_failure() {
                            ReconnectDecision::RetryAfter(delay) => {
                                tokio::time::sleep(delay).await;
                            }
                            ReconnectDecision::GiveUp => {
                                error!(
                                    attempts = self.policy.attempts(),
                                    "reconnect budget exhausted, gateway stopping"
                                );
                                return Ok(());
                            }
                            ReconnectDecision::Fatal => {
                                return Err(GatewayError::ConnectionLost {
                                    attempts: self.policy.attempts(),
                                    reason: err.to_string(),
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    fn dispatch(&self, topic: &str, payload: Vec<u8>) {
        match self.topics.resolve(topic) {
            Ok(kind) => match self.handlers.handle(kind, payload) {
                Some(work) => {
                    tokio::spawn(work);
                }
                None => warn!(topic, kind = kind.label(), "no handler registered, dropped"),
            },
            Err(err) => warn!(error = %err, "message dropped"),
        }
    }
}

/// Outbound publisher backed by the gateway's MQTT client.
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }

    async fn publish<M: serde::Serialize>(&self, topic: &str, message: &M) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(message).map_err(|err| PublishError(err.to_string()))?;
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|err| PublishError(err.to_string()))
    }
}

#[async_trait]
impl MessagePublisher for MqttPublisher {
    async fn publish_visualization_available(
        &self,
        message: VisualizationAvailableMessage,
    ) -> Result<(), PublishError> {
        self.publish(VISUALIZATION_AVAILABLE_TOPIC, &message).await
    }

    async fn publish_analysis_result(
        &self,
        message: AnalysisResultMessage,
    ) -> Result<(), PublishError> {
        self.publish(ANALYSIS_RESULT_TOPIC, &message).await
    }
}
