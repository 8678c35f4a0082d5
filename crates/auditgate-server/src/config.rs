//! Configuration management
//!
//! Loaded from the environment (after an optional `.env` file) with the
//! defaults below.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::audit::{
    PublisherSettings, DEFAULT_MAX_IN_FLIGHT, DEFAULT_QUEUE_CAPACITY, DEFAULT_TOPIC,
};
use crate::gateway::{Domain, MandatoryHeaders, Tier};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/auditgate";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default timeout for one audit delivery in seconds.
pub const DEFAULT_AUDIT_PUBLISH_TIMEOUT_SECS: u64 = 10;

/// Headers required on non-core requests when none are configured.
pub const DEFAULT_MANDATORY_HEADERS: &str = "x-correlation-id,x-stan-id,x-channel-id";

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub audit: AuditConfig,
    pub gateway: GatewayConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Database name from the URL path, used as the audit channel
    pub fn database_name(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_default()
    }
}

/// Audit publisher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Kafka REST proxy base URL; events go to the log when unset
    pub broker_url: Option<String>,
    pub topic: String,
    pub queue_capacity: usize,
    pub max_in_flight: usize,
    pub publish_timeout_secs: u64,
}

impl AuditConfig {
    pub fn publisher_settings(&self) -> PublisherSettings {
        PublisherSettings {
            topic: self.topic.clone(),
            queue_capacity: self.queue_capacity,
            max_in_flight: self.max_in_flight,
            publish_timeout: Duration::from_secs(self.publish_timeout_secs),
        }
    }
}

/// Access-control configuration for the gated API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub shared_secret: String,
    pub mandatory_headers: Vec<String>,
    pub tier: Tier,
    pub core_channel: String,
    pub domain: Domain,
}

impl GatewayConfig {
    pub fn mandatory(&self) -> MandatoryHeaders {
        MandatoryHeaders::new(self.mandatory_headers.iter().cloned(), self.tier)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Read the environment without loading `.env` or validating
    pub fn from_env() -> anyhow::Result<Self> {
        let tier: Tier = env_string("GATEWAY_TIER", "")
            .parse()
            .map_err(|e: String| anyhow::anyhow!("GATEWAY_TIER: {e}"))?;
        let domain: Domain = env_string("GATEWAY_DOMAIN", Domain::Internal.as_str())
            .parse()
            .map_err(|e: String| anyhow::anyhow!("GATEWAY_DOMAIN: {e}"))?;

        Ok(Config {
            server: ServerConfig {
                host: env_string("AUDITGATE_HOST", DEFAULT_SERVER_HOST),
                port: env_parse("AUDITGATE_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parse(
                    "AUDITGATE_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            database: DatabaseConfig {
                url: env_string("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_parse(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_parse(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_parse(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_parse(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            audit: AuditConfig {
                broker_url: std::env::var("AUDIT_BROKER_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                topic: env_string("AUDIT_TOPIC", DEFAULT_TOPIC),
                queue_capacity: env_parse("AUDIT_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY),
                max_in_flight: env_parse("AUDIT_MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT),
                publish_timeout_secs: env_parse(
                    "AUDIT_PUBLISH_TIMEOUT",
                    DEFAULT_AUDIT_PUBLISH_TIMEOUT_SECS,
                ),
            },
            gateway: GatewayConfig {
                shared_secret: env_string("GATEWAY_SHARED_SECRET", ""),
                mandatory_headers: split_list(&env_string(
                    "GATEWAY_MANDATORY_HEADERS",
                    DEFAULT_MANDATORY_HEADERS,
                )),
                tier,
                core_channel: env_string("GATEWAY_CORE_CHANNEL", ""),
                domain,
            },
            cors: CorsConfig {
                allowed_origins: split_list(&env_string(
                    "CORS_ALLOWED_ORIGINS",
                    DEFAULT_CORS_ALLOWED_ORIGIN,
                )),
                allow_credentials: env_parse("CORS_ALLOW_CREDENTIALS", true),
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.audit.topic.trim().is_empty() {
            anyhow::bail!("Audit topic cannot be empty");
        }
        if self.audit.queue_capacity == 0 {
            anyhow::bail!("Audit queue_capacity must be greater than 0");
        }
        if self.audit.max_in_flight == 0 {
            anyhow::bail!("Audit max_in_flight must be greater than 0");
        }
        if let Some(url) = &self.audit.broker_url {
            Url::parse(url).map_err(|e| anyhow::anyhow!("Invalid AUDIT_BROKER_URL '{url}': {e}"))?;
        } else {
            tracing::warn!("No audit broker configured - audit events will be written to the log");
        }

        if self.gateway.shared_secret.is_empty() {
            tracing::warn!(
                "No gateway shared secret configured - only requests without the secret header will pass"
            );
        }
        if self.gateway.tier == Tier::Core && self.gateway.core_channel.is_empty() {
            anyhow::bail!("GATEWAY_CORE_CHANNEL is required when GATEWAY_TIER is core");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            audit: AuditConfig {
                broker_url: None,
                topic: DEFAULT_TOPIC.to_string(),
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
                max_in_flight: DEFAULT_MAX_IN_FLIGHT,
                publish_timeout_secs: DEFAULT_AUDIT_PUBLISH_TIMEOUT_SECS,
            },
            gateway: GatewayConfig {
                shared_secret: String::new(),
                mandatory_headers: split_list(DEFAULT_MANDATORY_HEADERS),
                tier: Tier::NonCore,
                core_channel: String::new(),
                domain: Domain::Internal,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
        }
    }
}
