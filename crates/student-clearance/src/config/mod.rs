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
    pub login: LoginGuardConfig,
    pub clearance: ClearanceConfig,
    pub webhook: WebhookConfig,
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

        let max_attempts = positive_number("APP_LOGIN_MAX_ATTEMPTS", 5)?;
        let window_minutes = positive_number("APP_LOGIN_WINDOW_MINUTES", 15)?;
        let lock_minutes = positive_number("APP_LOCK_MINUTES", 30)?;
        let demo_password =
            env::var("APP_DEMO_PASSWORD").unwrap_or_else(|_| "password".to_string());

        let require_year_head = match env::var("APP_REQUIRE_YEAR_HEAD") {
            Ok(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidFlag {
                variable: "APP_REQUIRE_YEAR_HEAD",
            })?,
            Err(_) => true,
        };

        let webhook_url = env::var("APP_WEBHOOK_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let webhook_timeout = positive_number("APP_WEBHOOK_TIMEOUT_SECS", 10)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            login: LoginGuardConfig {
                max_attempts: max_attempts as u32,
                window: Duration::from_secs(window_minutes * 60),
                lock_duration: Duration::from_secs(lock_minutes * 60),
                demo_password,
            },
            clearance: ClearanceConfig { require_year_head },
            webhook: WebhookConfig {
                url: webhook_url,
                timeout: Duration::from_secs(webhook_timeout),
            },
        })
    }
}

fn positive_number(variable: &'static str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { variable })?,
        Err(_) => default,
    };

    if value == 0 {
        return Err(ConfigError::InvalidNumber { variable });
    }

    Ok(value)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
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

/// Brute-force protection thresholds for the login guard.
#[derive(Debug, Clone)]
pub struct LoginGuardConfig {
    pub max_attempts: u32,
    pub window: Duration,
    pub lock_duration: Duration,
    /// Shared credential for seeded demo accounts without their own password.
    pub demo_password: String,
}

impl Default for LoginGuardConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
            lock_duration: Duration::from_secs(30 * 60),
            demo_password: "password".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClearanceConfig {
    pub require_year_head: bool,
}

/// Outbound checkout notification endpoint.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str },
    InvalidFlag { variable: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} must be a positive whole number")
            }
            ConfigError::InvalidFlag { variable } => {
                write!(f, "{variable} must be one of true/false/yes/no/1/0")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidFlag { .. } => None,
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
        for variable in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LOGIN_MAX_ATTEMPTS",
            "APP_LOGIN_WINDOW_MINUTES",
            "APP_LOCK_MINUTES",
            "APP_DEMO_PASSWORD",
            "APP_REQUIRE_YEAR_HEAD",
            "APP_WEBHOOK_URL",
            "APP_WEBHOOK_TIMEOUT_SECS",
        ] {
            env::remove_var(variable);
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
        assert_eq!(config.login.max_attempts, 5);
        assert_eq!(config.login.window, Duration::from_secs(900));
        assert_eq!(config.login.lock_duration, Duration::from_secs(1800));
        assert_eq!(config.login.demo_password, "password");
        assert!(config.clearance.require_year_head);
        assert!(config.webhook.url.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn rejects_zero_attempt_budget() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_LOGIN_MAX_ATTEMPTS", "0");
        let err = AppConfig::load().expect_err("zero attempts rejected");
        assert!(err.to_string().contains("APP_LOGIN_MAX_ATTEMPTS"));
        reset_env();
    }

    #[test]
    fn parses_year_head_flag_and_webhook() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_REQUIRE_YEAR_HEAD", "no");
        env::set_var("APP_WEBHOOK_URL", "https://hooks.example.org/checkout");
        let config = AppConfig::load().expect("config loads");
        assert!(!config.clearance.require_year_head);
        assert_eq!(
            config.webhook.url.as_deref(),
            Some("https://hooks.example.org/checkout")
        );

        env::set_var("APP_REQUIRE_YEAR_HEAD", "maybe");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidFlag { .. })
        ));
        reset_env();
    }
}
