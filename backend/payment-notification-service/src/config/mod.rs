use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
    /// Storefront origin; callback redirects and CORS are built from it
    pub frontend_url: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub run_migrations: bool,
    /// Schema placed first on every connection's `search_path`
    pub schema: Option<String>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("run_migrations", &self.run_migrations)
            .field("schema", &self.schema)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HS256 shared secret of the upstream session issuer
    pub secret: String,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub tmn_code: String,
    pub hash_secret: String,
    pub pay_url: String,
    pub return_url: String,
    pub locale: String,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("tmn_code", &self.tmn_code)
            .field("hash_secret", &"[REDACTED]")
            .field("pay_url", &self.pay_url)
            .field("return_url", &self.return_url)
            .field("locale", &self.locale)
            .finish()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

fn env_required(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| AppError::Config(format!("{} must be set", key)))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port: u16 = env_parse("APP_PORT", 8000)?;
        let frontend_url = env_or("FE_APP_URL", "http://localhost:3000")
            .trim_end_matches('/')
            .to_string();

        Ok(Config {
            app: AppConfig {
                env: env_or("APP_ENV", "development"),
                host: env_or("APP_HOST", "0.0.0.0"),
                port,
                frontend_url,
            },
            database: DatabaseConfig {
                url: env_required("DATABASE_URL")?,
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: env_parse("DATABASE_MIN_CONNECTIONS", 2)?,
                acquire_timeout_secs: env_parse("DATABASE_ACQUIRE_TIMEOUT_SECS", 10)?,
                idle_timeout_secs: env_parse("DATABASE_IDLE_TIMEOUT_SECS", 600)?,
                run_migrations: env_parse("RUN_MIGRATIONS", true)?,
                schema: std::env::var("DATABASE_SCHEMA")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
            },
            jwt: JwtConfig {
                secret: env_required("JWT_SECRET")?,
            },
            gateway: GatewayConfig {
                tmn_code: env_required("VNP_TMN_CODE")?,
                hash_secret: env_required("VNP_HASH_SECRET")?,
                pay_url: env_or(
                    "VNP_URL",
                    "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html",
                ),
                return_url: env_or(
                    "VNP_RETURN_URL",
                    &format!("http://localhost:{}/api/v1/payments/return", port),
                ),
                locale: env_or("VNP_LOCALE", "vn"),
            },
        })
    }
}
