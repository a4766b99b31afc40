use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub identity: IdentityConfig,
    pub profile: ProfileConfig,
    pub frontend: FrontendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Memory,
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// How the caller's IP is determined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// IP-echo endpoint queried by headless page sessions
    pub echo_url: String,
    pub timeout_secs: u64,
    pub trusted_proxy_mode: TrustedProxyMode,
    /// CIDR ranges of proxies whose forwarding headers are believed
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    /// Fixed number of proxy hops in front of the service
    #[serde(default)]
    pub num_trusted_proxies: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    None,
    Standard,
    Cloudflare,
}

/// Static content of the profile page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    pub image_url: String,
    pub welcome_message: String,
    pub welcome_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Path to directory containing static frontend files
    /// If None, uses the embedded page
    pub static_dir: Option<String>,
}

impl IdentityConfig {
    pub const DEFAULT_ECHO_URL: &'static str = "https://api.ipify.org?format=json";
    const DEFAULT_TIMEOUT_SECS: u64 = 5;
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            echo_url: Self::DEFAULT_ECHO_URL.to_string(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: vec![],
            num_trusted_proxies: None,
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            name: "John Linek Batalha".to_string(),
            image_url: "/perfil.png".to_string(),
            welcome_message: "Olá!👋 Obrigado pela visita, isso foi apenas um teste! 😉"
                .to_string(),
            welcome_delay_ms: 800,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str = std::env::var("STORE_BACKEND").unwrap_or_else(|_| "memory".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "memory" => DatabaseBackend::Memory,
            "sqlite" => DatabaseBackend::Sqlite,
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            other => {
                tracing::warn!(
                    "Unknown STORE_BACKEND '{other}', falling back to 'memory'. Supported values: memory, sqlite, postgres"
                );
                DatabaseBackend::Memory
            }
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./profile-board.db?mode=rwc".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("API_PORT must be a port number")?;

        let defaults = IdentityConfig::default();
        let echo_url = std::env::var("IDENTITY_ECHO_URL").unwrap_or(defaults.echo_url);
        let timeout_secs = std::env::var("IDENTITY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.timeout_secs);

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => TrustedProxyMode::None,
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::None
            }
        };

        let trusted_proxies = match std::env::var("TRUSTED_PROXIES") {
            Ok(list) => parse_cidr_list(&list)?,
            Err(_) => vec![],
        };

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("NUM_TRUSTED_PROXIES must be a non-negative integer")?;

        let profile_defaults = ProfileConfig::default();
        let profile = ProfileConfig {
            name: std::env::var("PROFILE_NAME").unwrap_or(profile_defaults.name),
            image_url: std::env::var("PROFILE_IMAGE_URL").unwrap_or(profile_defaults.image_url),
            welcome_message: std::env::var("WELCOME_MESSAGE")
                .unwrap_or(profile_defaults.welcome_message),
            welcome_delay_ms: std::env::var("WELCOME_DELAY_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(profile_defaults.welcome_delay_ms),
        };

        let frontend_static_dir = std::env::var("FRONTEND_STATIC_DIR").ok();

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            identity: IdentityConfig {
                echo_url,
                timeout_secs,
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
            },
            profile,
            frontend: FrontendConfig {
                static_dir: frontend_static_dir,
            },
        })
    }
}

/// Parse a comma-separated list of CIDR ranges; bare addresses become /32 or /128.
pub fn parse_cidr_list(list: &str) -> anyhow::Result<Vec<IpNet>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpNet>()
                .or_else(|_| s.parse::<std::net::IpAddr>().map(IpNet::from))
                .with_context(|| format!("invalid entry in TRUSTED_PROXIES: {s}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cidr_list() {
        let nets = parse_cidr_list("10.0.0.0/8, 192.168.1.1 ,2001:db8::/32,").unwrap();
        assert_eq!(nets.len(), 3);
        assert!(nets[1].contains(&"192.168.1.1".parse::<std::net::IpAddr>().unwrap()));
        assert_eq!(nets[1].prefix_len(), 32);
    }

    #[test]
    fn test_parse_cidr_list_rejects_garbage() {
        assert!(parse_cidr_list("10.0.0.0/8,not-an-ip").is_err());
    }

    #[test]
    fn test_profile_defaults() {
        let profile = ProfileConfig::default();
        assert_eq!(profile.welcome_delay_ms, 800);
        assert_eq!(profile.image_url, "/perfil.png");
    }
}
