use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: HostConfig,
    pub assistant: AssistantConfig,
    pub storage: StorageConfig,
    pub relay: RelayConfig,
    pub login: LoginConfig,
    pub server: ServerConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Where the Host Shell lives and where it sends users once authenticated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub base_url: String,
    pub home_route: String,
}

/// The embedded assistant. `base_url` doubles as the postMessage target origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub token_key: String,
    pub user_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Offsets from the start of a relay cycle at which AUTH is (re)sent.
    pub retry_offsets_ms: Vec<u64>,
    pub cancel_on_ack: bool,
    pub enforce_inbound_origin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// `username:password` pairs accepted by the identity endpoints.
    pub users: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub secure_cookies: bool,
}

pub const DEFAULT_ASSISTANT_BASE_URL: &str = "http://localhost:5000";

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Host / assistant overrides
        if let Ok(v) = env::var("HOST_BASE_URL") {
            self.host.base_url = trim_url(&v);
        }
        if let Ok(v) = env::var("HOST_HOME_ROUTE") {
            self.host.home_route = v;
        }
        if let Ok(v) = env::var("ASSISTANT_BASE_URL") {
            let assistant = trim_url(&v);
            // The assistant is also the default CORS peer; keep the two in step
            // unless origins are set explicitly below.
            if self.security.cors_origins.contains(&self.assistant.base_url) {
                self.security.cors_origins.retain(|o| o != &self.assistant.base_url);
                self.security.cors_origins.push(assistant.clone());
            }
            self.assistant.base_url = assistant;
        }

        // Storage overrides
        if let Ok(v) = env::var("SESSION_TOKEN_KEY") {
            self.storage.token_key = v;
        }
        if let Ok(v) = env::var("SESSION_USER_KEY") {
            self.storage.user_key = v;
        }

        // Relay overrides
        if let Ok(v) = env::var("RELAY_RETRY_OFFSETS_MS") {
            let offsets: Vec<u64> = v
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if !offsets.is_empty() {
                self.relay.retry_offsets_ms = offsets;
            }
        }
        if let Ok(v) = env::var("RELAY_CANCEL_ON_ACK") {
            self.relay.cancel_on_ack = v.parse().unwrap_or(self.relay.cancel_on_ack);
        }
        if let Ok(v) = env::var("RELAY_ENFORCE_INBOUND_ORIGIN") {
            self.relay.enforce_inbound_origin = v.parse().unwrap_or(self.relay.enforce_inbound_origin);
        }

        // Login overrides
        if let Ok(v) = env::var("LOGIN_PROBE_TIMEOUT_MS") {
            self.login.probe_timeout_ms = v.parse().unwrap_or(self.login.probe_timeout_ms);
        }

        // Server overrides
        if let Some(port) = env::var("ISO_HUB_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.server.port = port;
        }
        if let Ok(v) = env::var("ISO_HUB_USERS") {
            self.server.users = parse_users(&v);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| trim_url(s.trim())).collect();
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_SECURE_COOKIES") {
            self.security.secure_cookies = v.parse().unwrap_or(self.security.secure_cookies);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            host: HostConfig {
                base_url: "http://localhost:3000".to_string(),
                home_route: "/".to_string(),
            },
            assistant: AssistantConfig {
                base_url: DEFAULT_ASSISTANT_BASE_URL.to_string(),
            },
            storage: StorageConfig::default(),
            relay: RelayConfig::default(),
            login: LoginConfig { probe_timeout_ms: 1500 },
            server: ServerConfig {
                port: 3000,
                users: vec![("demo".to_string(), "demo".to_string())],
            },
            security: SecurityConfig {
                cors_origins: vec![DEFAULT_ASSISTANT_BASE_URL.to_string()],
                jwt_secret: "iso-hub-development-secret".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                secure_cookies: false,
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            host: HostConfig {
                base_url: "https://staging.iso-hub.example.com".to_string(),
                home_route: "/".to_string(),
            },
            assistant: AssistantConfig {
                base_url: "https://staging.jacc.example.com".to_string(),
            },
            storage: StorageConfig::default(),
            relay: RelayConfig::default(),
            login: LoginConfig { probe_timeout_ms: 1500 },
            server: ServerConfig {
                port: 3000,
                users: Vec::new(),
            },
            security: SecurityConfig {
                cors_origins: vec!["https://staging.jacc.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                secure_cookies: true,
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            host: HostConfig {
                base_url: "https://iso-hub.example.com".to_string(),
                home_route: "/".to_string(),
            },
            assistant: AssistantConfig {
                base_url: "https://jacc.example.com".to_string(),
            },
            storage: StorageConfig::default(),
            relay: RelayConfig::default(),
            login: LoginConfig { probe_timeout_ms: 1000 },
            server: ServerConfig {
                port: 3000,
                users: Vec::new(),
            },
            security: SecurityConfig {
                cors_origins: vec!["https://jacc.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 8,
                secure_cookies: true,
            },
        }
    }

    pub fn jwt_secret_is_missing(&self) -> bool {
        self.security.jwt_secret.is_empty()
    }

    /// Absolute URL of the home route on the Host Shell.
    pub fn home_url(&self) -> String {
        join_route(&self.host.base_url, &self.host.home_route)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            token_key: "authToken".to_string(),
            user_key: "user".to_string(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            retry_offsets_ms: vec![0, 1000, 2000],
            cancel_on_ack: false,
            enforce_inbound_origin: false,
        }
    }
}

impl RelayConfig {
    pub fn retry_offsets(&self) -> Vec<Duration> {
        self.retry_offsets_ms.iter().map(|ms| Duration::from_millis(*ms)).collect()
    }
}

impl LoginConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn trim_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Join a base URL and a route without doubling or dropping the slash.
pub fn join_route(base_url: &str, route: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        route.trim_start_matches('/')
    )
}

fn parse_users(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (user, pass) = pair.trim().split_once(':')?;
            if user.is_empty() {
                return None;
            }
            Some((user.to_string(), pass.to_string()))
        })
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.assistant.base_url, DEFAULT_ASSISTANT_BASE_URL);
        assert_eq!(config.relay.retry_offsets_ms, vec![0, 1000, 2000]);
        assert!(!config.relay.cancel_on_ack);
        assert_eq!(config.storage.token_key, "authToken");
        assert_eq!(config.server.users.len(), 1);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(config.server.users.is_empty());
        assert!(config.security.secure_cookies);
        assert!(config.jwt_secret_is_missing());
    }

    #[test]
    fn test_home_url_joins_cleanly() {
        let mut config = AppConfig::development();
        config.host.base_url = "http://hub.local/".to_string();
        config.host.home_route = "/".to_string();
        assert_eq!(config.home_url(), "http://hub.local/");

        config.host.home_route = "dashboard".to_string();
        assert_eq!(config.home_url(), "http://hub.local/dashboard");
    }

    #[test]
    fn test_parse_users_skips_malformed_pairs() {
        let users = parse_users("alice:secret, bob:hunter2,broken,:nouser");
        assert_eq!(
            users,
            vec![
                ("alice".to_string(), "secret".to_string()),
                ("bob".to_string(), "hunter2".to_string()),
            ]
        );
    }

    #[test]
    fn test_retry_offsets_as_durations() {
        let relay = RelayConfig::default();
        assert_eq!(
            relay.retry_offsets(),
            vec![
                Duration::from_millis(0),
                Duration::from_secs(1),
                Duration::from_secs(2)
            ]
        );
    }
}
