use std::net::SocketAddr;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub cors: CorsConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Longest token lifetime accepted from configuration: one year.
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

/// Parses an optional variable; absent means `default`, present but malformed is an error.
fn parse_var<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has invalid value {v:?}: {e}")),
    }
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    parse_var(key, std::env::var(key).ok(), default)
}

/// Splits a comma separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: env_or("JWT_ISSUER", "sheshape"),
            audience: env_or("JWT_AUDIENCE", "sheshape-users"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60)?,
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14)?,
        };
        let cors = CorsConfig {
            allowed_origins: parse_origins(&env_or(
                "CORS_ALLOWED_ORIGINS",
                "http://localhost:3000",
            )),
        };
        let config = Self {
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 10)?,
            host: env_or("APP_HOST", "0.0.0.0"),
            port: env_parse("APP_PORT", 8080)?,
            jwt,
            cors,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (key, minutes) in [
            ("JWT_TTL_MINUTES", self.jwt.ttl_minutes),
            ("JWT_REFRESH_TTL_MINUTES", self.jwt.refresh_ttl_minutes),
        ] {
            if !(1..=MAX_TTL_MINUTES).contains(&minutes) {
                anyhow::bail!("{key} must be between 1 and {MAX_TTL_MINUTES}, got {minutes}");
            }
        }
        // Credentialed CORS cannot use a wildcard origin.
        if self.cors.allowed_origins.iter().any(|o| o == "*") {
            anyhow::bail!("CORS_ALLOWED_ORIGINS must list explicit origins; \"*\" is not allowed");
        }
        if self.db_max_connections == 0 {
            anyhow::bail!("DB_MAX_CONNECTIONS must be at least 1");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}
