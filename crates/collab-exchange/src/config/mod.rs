use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::{FixedOffset, Offset, Utc};

use crate::marketplace::ledger::EscrowPolicy;

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
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let escrow_raw = env::var("APP_ESCROW_POLICY").unwrap_or_else(|_| "clamp".to_string());
        let escrow_policy = EscrowPolicy::parse(&escrow_raw)
            .ok_or(ConfigError::InvalidEscrowPolicy { value: escrow_raw })?;

        let offset_raw = env::var("APP_UTC_OFFSET").unwrap_or_else(|_| "+00:00".to_string());
        let utc_offset = parse_utc_offset(&offset_raw)
            .ok_or(ConfigError::InvalidUtcOffset { value: offset_raw })?;

        let leaderboard_limit = env::var("APP_LEADERBOARD_LIMIT")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<usize>()
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or(ConfigError::InvalidLeaderboardLimit)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            engine: EngineConfig {
                escrow_policy,
                utc_offset,
                leaderboard_limit,
            },
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

/// Knobs the marketplace engine is constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub escrow_policy: EscrowPolicy,
    /// Deployment timezone for calendar dates and week windows.
    pub utc_offset: FixedOffset,
    pub leaderboard_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            escrow_policy: EscrowPolicy::default(),
            utc_offset: Utc.fix(),
            leaderboard_limit: 5,
        }
    }
}

/// Accepts `Z`, `UTC`, or a signed `±HH:MM` offset.
pub fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return Some(Utc.fix());
    }
    trimmed.parse::<FixedOffset>().ok()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidEscrowPolicy { value: String },
    InvalidUtcOffset { value: String },
    InvalidLeaderboardLimit,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidEscrowPolicy { value } => write!(
                f,
                "APP_ESCROW_POLICY must be 'clamp' or 'strict' (got '{}')",
                value
            ),
            ConfigError::InvalidUtcOffset { value } => write!(
                f,
                "APP_UTC_OFFSET must look like +08:00, -05:30 or UTC (got '{}')",
                value
            ),
            ConfigError::InvalidLeaderboardLimit => {
                write!(f, "APP_LEADERBOARD_LIMIT must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidEscrowPolicy { .. }
            | ConfigError::InvalidUtcOffset { .. }
            | ConfigError::InvalidLeaderboardLimit => None,
        }
    }
}
