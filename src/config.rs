use std::str::FromStr;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub session_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
}

/// Cookie transport and reset-token delivery settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub cookie_secure: bool,
    /// Echo the reset token in the forgot-password response. Demo deployments only.
    pub expose_reset_token: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "tasknest".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "tasknest-users".into()),
            session_ttl_minutes: env_or("JWT_SESSION_TTL_MINUTES", 60 * 24 * 30)?,
            reset_ttl_minutes: env_or("JWT_RESET_TTL_MINUTES", 10)?,
        };
        let auth = AuthConfig {
            cookie_name: std::env::var("AUTH_COOKIE_NAME").unwrap_or_else(|_| "jwt".into()),
            cookie_secure: env_or("AUTH_COOKIE_SECURE", false)?,
            expose_reset_token: env_or("AUTH_EXPOSE_RESET_TOKEN", false)?,
        };
        Ok(Self {
            database_url,
            jwt,
            auth,
        })
    }

    pub fn test() -> Self {
        Self {
            database_url: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                session_ttl_minutes: 60,
                reset_ttl_minutes: 10,
            },
            auth: AuthConfig {
                cookie_name: "jwt".into(),
                cookie_secure: false,
                expose_reset_token: true,
            },
        }
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}"))
}
