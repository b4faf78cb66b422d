use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

use crate::services::ring::TrustedDomain;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub relay: RelaySettings,
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Administrator settings of the relay. Read-only for the lifetime of a flow.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Seconds a relay token stays valid.
    pub timeout_seconds: i64,
    /// Ordered ring of `scheme://host` entries.
    pub domains: Vec<String>,
    /// Replace an existing session on a hop instead of keeping it.
    pub force_logout: bool,
    pub enable_extra_logging: bool,
    /// Terminal destination once the ring closes; front page when empty.
    pub redirect_success: String,
    /// Destination when a request cannot be placed in the ring.
    pub redirect_error: String,
    pub hash_salt: SecretString,
    pub default_language: String,
    pub languages: Vec<String>,
    /// Routes whose logins must not start a relay.
    pub excluded_login_routes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secure_cookie: bool,
    pub inactivity_hours: i64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub relay_attempts: u32,
    pub relay_window_seconds: u64,
    pub login_attempts: u32,
    pub login_window_seconds: u64,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = RelayConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("login-relay"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
            },
            relay: RelaySettings {
                timeout_seconds: parse_env("RELAY_TIMEOUT_SECONDS", "60", is_prod)?,
                domains: parse_list(&get_env("RELAY_DOMAINS", None, is_prod)?),
                force_logout: parse_env("RELAY_FORCE_LOGOUT", "false", is_prod)?,
                enable_extra_logging: parse_env("RELAY_ENABLE_EXTRA_LOGGING", "false", is_prod)?,
                redirect_success: get_env("RELAY_REDIRECT_SUCCESS", Some(""), is_prod)?,
                redirect_error: get_env("RELAY_REDIRECT_ERROR", Some(""), is_prod)?,
                hash_salt: SecretString::new(get_env("RELAY_HASH_SALT", None, true)?),
                default_language: get_env("RELAY_DEFAULT_LANGUAGE", Some("en"), is_prod)?,
                languages: parse_list(&get_env("RELAY_LANGUAGES", Some("en"), is_prod)?),
                excluded_login_routes: parse_list(&get_env(
                    "RELAY_EXCLUDED_LOGIN_ROUTES",
                    Some("user.reset,relay.login"),
                    is_prod,
                )?),
            },
            session: SessionConfig {
                secure_cookie: parse_env("SESSION_SECURE_COOKIE", "false", is_prod)?,
                inactivity_hours: parse_env("SESSION_INACTIVITY_HOURS", "24", is_prod)?,
            },
            rate_limit: RateLimitConfig {
                relay_attempts: parse_env("RATE_LIMIT_RELAY_ATTEMPTS", "60", is_prod)?,
                relay_window_seconds: parse_env("RATE_LIMIT_RELAY_WINDOW_SECONDS", "60", is_prod)?,
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "5", is_prod)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        self.relay.validate()?;

        if self.session.inactivity_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_INACTIVITY_HOURS must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if !self.session.secure_cookie {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "SESSION_SECURE_COOKIE must be enabled in production"
                )));
            }

            if self.relay.domains.iter().any(|d| d.starts_with("http://")) {
                tracing::error!("Relay ring contains plain http domains in production");
            }
        }

        Ok(())
    }
}

impl RelaySettings {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.domains.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RELAY_DOMAINS must list at least one domain"
            )));
        }

        if let Some(bad) = self
            .domains
            .iter()
            .find(|d| !(d.starts_with("https://") || d.starts_with("http://")))
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Relay domain '{}' must include the url scheme",
                bad
            )));
        }

        for domain in self.duplicate_domains() {
            tracing::warn!(domain = %domain, "Ignoring repeated relay domain");
        }

        if self.timeout_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RELAY_TIMEOUT_SECONDS must be positive"
            )));
        }

        if self.hash_salt.expose_secret().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RELAY_HASH_SALT must not be empty"
            )));
        }

        if !self.languages.contains(&self.default_language) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RELAY_DEFAULT_LANGUAGE '{}' is not in RELAY_LANGUAGES",
                self.default_language
            )));
        }

        Ok(())
    }

    /// Ring entries that repeat an earlier one once normalized. The ring
    /// keeps the first occurrence.
    pub fn duplicate_domains(&self) -> Vec<TrustedDomain> {
        let mut seen: Vec<TrustedDomain> = Vec::new();
        let mut repeated = Vec::new();
        for domain in self.domains.iter().filter_map(|raw| TrustedDomain::parse(raw)) {
            if seen.contains(&domain) {
                repeated.push(domain);
            } else {
                seen.push(domain);
            }
        }
        repeated
    }

    /// Debug-tier logging is only emitted when extra logging is enabled.
    pub fn extra_logging(&self) -> bool {
        self.enable_extra_logging
    }
}

/// Split a list setting on newlines or commas, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.replace("\r\n", "\n")
        .split(['\n', ','])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
