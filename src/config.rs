use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use log::warn;

use crate::data::RetentionPolicy;
use crate::error::ServiceError;

// Server Configuration
pub const DEFAULT_HTTP_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_WS_BIND_ADDRESS: &str = "0.0.0.0:7000";
pub const WS_PATH: &str = "/ws";
pub const STATS_INTERVAL_SECS: u64 = 60;

// Price stream Configuration
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const PRICE_UPPER_BOUND: f64 = 100.0;

// Broadcast Configuration
pub const DEFAULT_BROADCAST_CAPACITY: usize = 64;
pub const MAX_BROADCAST_CAPACITY: usize = 65_536;

// Message-socket Configuration
pub const STOCK_PRICES_ROUTE: &str = "stockPrices";
pub const OUTBOUND_QUEUE_SIZE: usize = 100;

pub struct Config {
    pub http_bind_address: String,
    pub ws_bind_address: String,
    pub log_level: String,
    pub retention: String,
    pub broadcast_capacity: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            http_bind_address: env::var("HTTP_BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_HTTP_BIND_ADDRESS.to_string()),
            ws_bind_address: env::var("WS_BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_WS_BIND_ADDRESS.to_string()),
            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string()),
            retention: env::var("STREAM_RETENTION")
                .unwrap_or_else(|_| RetentionPolicy::KeepAlive.as_str().to_string()),
            broadcast_capacity: env::var("BROADCAST_CAPACITY")
                .unwrap_or_else(|_| DEFAULT_BROADCAST_CAPACITY.to_string()),
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        let http: SocketAddr = self.http_bind_address.parse()
            .map_err(|e| ServiceError::Config(format!("Invalid HTTP_BIND_ADDRESS '{}': {}", self.http_bind_address, e)))?;
        let ws: SocketAddr = self.ws_bind_address.parse()
            .map_err(|e| ServiceError::Config(format!("Invalid WS_BIND_ADDRESS '{}': {}", self.ws_bind_address, e)))?;

        if http == ws {
            return Err(ServiceError::Config(format!(
                "HTTP and WebSocket listeners cannot share the address {}", http
            )));
        }

        let retention = self.retention_policy()?;
        self.channel_capacity()?;

        if retention == RetentionPolicy::StopWhenIdle {
            warn!("STREAM_RETENTION=stop_when_idle: idle symbol streams will be torn down");
        }

        Ok(())
    }

    pub fn retention_policy(&self) -> Result<RetentionPolicy, ServiceError> {
        self.retention.parse()
    }

    pub fn channel_capacity(&self) -> Result<usize, ServiceError> {
        match self.broadcast_capacity.parse::<usize>() {
            Ok(0) => Err(ServiceError::Config("BROADCAST_CAPACITY must be greater than zero".to_string())),
            Ok(capacity) if capacity > MAX_BROADCAST_CAPACITY => Err(ServiceError::Config(format!(
                "BROADCAST_CAPACITY {} exceeds the maximum of {}", capacity, MAX_BROADCAST_CAPACITY
            ))),
            Ok(capacity) => Ok(capacity),
            Err(e) => Err(ServiceError::Config(format!(
                "Invalid BROADCAST_CAPACITY '{}': {}", self.broadcast_capacity, e
            ))),
        }
    }

    pub fn log_config(&self) {
        println!("Server Configuration:");
        println!("  HTTP Bind Address: {}", self.http_bind_address);
        println!("  WebSocket Bind Address: {}", self.ws_bind_address);
        println!("  Log Level: {}", self.log_level);
        println!("  Stream Retention: {}", self.retention);
        println!("  Broadcast Capacity: {}", self.broadcast_capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> Config {
        Config {
            http_bind_address: DEFAULT_HTTP_BIND_ADDRESS.to_string(),
            ws_bind_address: DEFAULT_WS_BIND_ADDRESS.to_string(),
            log_level: "info".to_string(),
            retention: "keep_alive".to_string(),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY.to_string(),
        }
    }

    #[test]
    fn test_config_from_env() {
        let config = Config::from_env();
        assert!(!config.http_bind_address.is_empty());
        assert!(!config.ws_bind_address.is_empty());
        assert!(!config.log_level.is_empty());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.retention_policy().unwrap(), RetentionPolicy::KeepAlive);
        assert_eq!(config.channel_capacity().unwrap(), DEFAULT_BROADCAST_CAPACITY);
    }

    #[test]
    fn test_config_validation() {
        let mut config = default_config();
        config.ws_bind_address = config.http_bind_address.clone();
        assert!(config.validate().is_err());

        let mut config = default_config();
        config.http_bind_address = "not-an-address".to_string();
        assert!(config.validate().is_err());

        let mut config = default_config();
        config.broadcast_capacity = "0".to_string();
        assert!(config.validate().is_err());

        let mut config = default_config();
        config.broadcast_capacity = usize::MAX.to_string();
        assert!(config.validate().is_err());

        let mut config = default_config();
        config.broadcast_capacity = (MAX_BROADCAST_CAPACITY + 1).to_string();
        assert!(config.validate().is_err());

        let mut config = default_config();
        config.broadcast_capacity = MAX_BROADCAST_CAPACITY.to_string();
        assert!(config.validate().is_ok());

        let mut config = default_config();
        config.retention = "forever".to_string();
        assert!(config.validate().is_err());

        let mut config = default_config();
        config.retention = "stop_when_idle".to_string();
        assert!(config.validate().is_ok());
    }
}
