//! Layered runtime configuration.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `config/pipeops.{toml,yaml}` (optional)
//! 3. `config/local.{toml,yaml}` (optional)
//! 4. environment, e.g. `PIPEOPS__AUTH__JWT_SECRET`

use chrono::Duration;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing::warn;

use pipeops_observability::TracingConfig;

const INSECURE_DEV_SECRET: &str = "pipeops-insecure-dev-secret";

/// Upper bound on `auth.session_ttl_minutes` (30 days).
pub const MAX_SESSION_TTL_MINUTES: i64 = 30 * 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub bind_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// HS256 signing secret. Empty means "development": an insecure fixed secret is used.
    pub jwt_secret: String,
    pub session_ttl_minutes: i64,
    pub cookie_name: String,
    pub sign_in_path: String,
    pub error_path: String,
    pub secure_cookie: bool,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapSettings {
    /// Create the built-in permissions, role types and roles on startup.
    pub seed_catalog: bool,
    pub admin_name: String,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub store: StoreSettings,
    pub bootstrap: BootstrapSettings,
    #[serde(default)]
    pub log: TracingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server: ServerSettings {
                bind_address: "0.0.0.0:8080".to_string(),
            },
            auth: AuthSettings {
                jwt_secret: String::new(),
                session_ttl_minutes: 8 * 60,
                cookie_name: "pipeops_session".to_string(),
                sign_in_path: "/auth/signin".to_string(),
                error_path: "/auth/error".to_string(),
                secure_cookie: false,
                bcrypt_cost: 12,
            },
            store: StoreSettings {
                backend: StoreBackend::Memory,
                database_url: None,
            },
            bootstrap: BootstrapSettings {
                seed_catalog: true,
                admin_name: "Administrator".to_string(),
                admin_email: None,
                admin_password: None,
            },
            log: TracingConfig::default(),
        }
    }
}

impl Settings {
    pub fn environment() -> Environment {
        Environment::default()
            .prefix("PIPEOPS")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    /// Load settings from the standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Self::defaults()?
            .add_source(File::with_name("config/pipeops").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Self::environment());

        builder.build()?.try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let d = Settings::default();
        Config::builder()
            .set_default("server.bind_address", d.server.bind_address)?
            .set_default("auth.jwt_secret", d.auth.jwt_secret)?
            .set_default("auth.session_ttl_minutes", d.auth.session_ttl_minutes)?
            .set_default("auth.cookie_name", d.auth.cookie_name)?
            .set_default("auth.sign_in_path", d.auth.sign_in_path)?
            .set_default("auth.error_path", d.auth.error_path)?
            .set_default("auth.secure_cookie", d.auth.secure_cookie)?
            .set_default("auth.bcrypt_cost", d.auth.bcrypt_cost)?
            .set_default("store.backend", "memory")?
            .set_default("bootstrap.seed_catalog", d.bootstrap.seed_catalog)?
            .set_default("bootstrap.admin_name", d.bootstrap.admin_name)
    }
}

impl AuthSettings {
    /// The signing secret, falling back to an insecure fixed value when unset.
    pub fn signing_secret(&self) -> &str {
        if self.jwt_secret.trim().is_empty() {
            warn!("auth.jwt_secret not set; using insecure dev default");
            INSECURE_DEV_SECRET
        } else {
            &self.jwt_secret
        }
    }

    /// Session lifetime, clamped to between one minute and `MAX_SESSION_TTL_MINUTES`.
    pub fn session_ttl(&self) -> Duration {
        let minutes = self.session_ttl_minutes.clamp(1, MAX_SESSION_TTL_MINUTES);
        if minutes != self.session_ttl_minutes {
            warn!(
                configured = self.session_ttl_minutes,
                effective = minutes,
                "auth.session_ttl_minutes out of range; clamped"
            );
        }
        Duration::minutes(minutes)
    }
}
