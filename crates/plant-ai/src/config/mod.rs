use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub mqtt: MqttConfig,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    pub timeseries: TimeseriesConfig,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(&var_or("APP_ENV", "development"));

        let host = var_or("APP_HOST", "127.0.0.1");
        let port = var_or("APP_PORT", "3000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidNumber("APP_PORT"))?;

        let log_level = var_or("APP_LOG_LEVEL", "info");

        let mqtt = MqttConfig {
            host: var_or("MQTT_HOST", "localhost"),
            port: var_or("MQTT_PORT", "1883")
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidNumber("MQTT_PORT"))?,
            client_id: var_or("MQTT_CLIENT_ID", "plant-ai"),
            username: env::var("MQTT_USERNAME").ok(),
            password: env::var("MQTT_PASSWORD").ok(),
            reconnect_delay: Duration::from_secs(
                var_or("MQTT_RECONNECT_DELAY_SECS", "5")
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidNumber("MQTT_RECONNECT_DELAY_SECS"))?,
            ),
            max_retry_attempts: var_or("MQTT_MAX_RETRY_ATTEMPTS", "10")
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidNumber("MQTT_MAX_RETRY_ATTEMPTS"))?,
            fail_on_max_retries: var_or("MQTT_FAIL_ON_MAX_RETRIES", "true")
                .parse::<bool>()
                .map_err(|_| ConfigError::InvalidBool("MQTT_FAIL_ON_MAX_RETRIES"))?,
        };

        let engine = EngineConfig {
            anonymizer_url: var_or("ENGINE_ANONYMIZER_URL", "http://localhost:8100/anonymizer"),
            cloe_url: var_or("ENGINE_CLOE_URL", "http://localhost:8100/cloe"),
            fencilla_url: var_or("ENGINE_FENCILLA_URL", "http://localhost:8100/fencilla"),
            thermal_reading_url: var_or(
                "ENGINE_THERMAL_READING_URL",
                "http://localhost:8100/thermal-reading",
            ),
        };

        let storage = StorageConfig {
            raw_account: var_or("STORAGE_RAW_ACCOUNT", "plantrawdata"),
            anonymized_account: var_or("STORAGE_ANONYMIZED_ACCOUNT", "plantanonymized"),
            visualized_account: var_or("STORAGE_VISUALIZED_ACCOUNT", "plantvisualized"),
        };

        let timeseries = TimeseriesConfig {
            base_url: var_or("TIMESERIES_BASE_URL", "http://localhost:8200"),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            mqtt,
            engine,
            storage,
            timeseries,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Broker connection and reconnect policy for the ingestion gateway.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub reconnect_delay: Duration,
    pub max_retry_attempts: u32,
    pub fail_on_max_retries: bool,
}

/// Base URLs of the external workflow services.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub anonymizer_url: String,
    pub cloe_url: String,
    pub fencilla_url: String,
    pub thermal_reading_url: String,
}

/// Storage accounts the pipeline reads from and writes to.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub raw_account: String,
    pub anonymized_account: String,
    pub visualized_account: String,
}

/// Time-series store endpoint.
#[derive(Debug, Clone)]
pub struct TimeseriesConfig {
    pub base_url: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidNumber(&'static str),
    InvalidBool(&'static str),
    InvalidHost { source: std::net::AddrParseError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber(name) => write!(f, "{name} must be a valid number"),
            ConfigError::InvalidBool(name) => write!(f, "{name} must be true or false"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidNumber(_) | ConfigError::InvalidBool(_) => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "MQTT_HOST",
            "MQTT_PORT",
            "MQTT_CLIENT_ID",
            "MQTT_USERNAME",
            "MQTT_PASSWORD",
            "MQTT_RECONNECT_DELAY_SECS",
            "MQTT_MAX_RETRY_ATTEMPTS",
            "MQTT_FAIL_ON_MAX_RETRIES",
            "ENGINE_ANONYMIZER_URL",
            "ENGINE_CLOE_URL",
            "ENGINE_FENCILLA_URL",
            "ENGINE_THERMAL_READING_URL",
            "STORAGE_RAW_ACCOUNT",
            "STORAGE_ANONYMIZED_ACCOUNT",
            "STORAGE_VISUALIZED_ACCOUNT",
            "TIMESERIES_BASE_URL",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.mqtt.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.mqtt.max_retry_attempts, 10);
        assert!(config.mqtt.fail_on_max_retries);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn rejects_non_numeric_retry_budget() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("MQTT_MAX_RETRY_ATTEMPTS", "lots");
        let err = AppConfig::load().expect_err("invalid budget rejected");
        assert!(matches!(err, ConfigError::InvalidNumber("MQTT_MAX_RETRY_ATTEMPTS")));
    }
}
