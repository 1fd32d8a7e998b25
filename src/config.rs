use std::net::SocketAddr;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct ProviderKeys {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: SocketAddr,
    /// Base URL the browser reaches us on; OAuth redirect URIs hang off it.
    pub public_url: String,
    pub session_inactivity: time::Duration,
    pub secure_cookies: bool,
    pub allowed_origin: Option<String>,
    pub google: Option<ProviderKeys>,
    pub github: Option<ProviderKeys>,
    /// Provider keys (`"github.com:42"`) granted admin rights when they sign in.
    pub admins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub(crate) fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_owned());

        let bind_addr = or("BIND_ADDR", "0.0.0.0:8080");
        let bind_addr = bind_addr.parse().with_context(|| format!("BIND_ADDR={bind_addr}"))?;

        let minutes = or("SESSION_INACTIVITY_MINUTES", "60");
        let minutes: i64 = minutes.parse().with_context(|| format!("SESSION_INACTIVITY_MINUTES={minutes}"))?;

        let max_connections = or("DB_MAX_CONNECTIONS", "16");
        let db_max_connections = max_connections.parse().with_context(|| format!("DB_MAX_CONNECTIONS={max_connections}"))?;

        let secure_cookies = or("SECURE_COOKIES", "false");
        let secure_cookies = secure_cookies.parse().with_context(|| format!("SECURE_COOKIES={secure_cookies}"))?;

        let provider = |prefix: &str| {
            Some(ProviderKeys {
                client_id: var(&format!("{prefix}_CLIENT_ID"))?,
                client_secret: var(&format!("{prefix}_CLIENT_SECRET"))?,
            })
        };

        Ok(Config {
            database_url: or("DATABASE_URL", "sqlite://silentchoir.db"),
            db_max_connections,
            bind_addr,
            public_url: or("PUBLIC_URL", "http://localhost:8080").trim_end_matches('/').to_owned(),
            session_inactivity: time::Duration::minutes(minutes),
            secure_cookies,
            allowed_origin: var("ALLOWED_ORIGIN"),
            google: provider("GOOGLE"),
            github: provider("GITHUB"),
            admins: var("ADMINS")
                .map(|admins| {
                    admins
                        .split(',')
                        .map(str::trim)
                        .filter(|key| !key.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}
