use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Organization-wide settings shared by every request.
///
/// Loaded once at startup and handed to handlers through `AppState`.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct OrganizationSettings {
    pub name: String,
    pub contact_email: Option<String>,
    pub default_lab_capacity: i32,
    pub default_service_capacity: i32,
    pub default_course_capacity: i32,
    pub default_technician_load: i32,
    pub default_summer_trainees: i32,
    pub auto_approve_registrations: bool,
}

impl Default for OrganizationSettings {
    fn default() -> Self {
        Self {
            name: "Research Institute".to_string(),
            contact_email: None,
            default_lab_capacity: 10,
            default_service_capacity: 5,
            default_course_capacity: 30,
            default_technician_load: 3,
            default_summer_trainees: 10,
            auto_approve_registrations: false,
        }
    }
}

/// Credentials for the administrator created on first start.
#[derive(Clone, Debug)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub request_timeout: Duration,
    pub actor_cache_ttl: Duration,
    pub log_dir: Option<PathBuf>,
    pub organization: OrganizationSettings,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Config {
    /// Load the configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = non_empty("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let defaults = OrganizationSettings::default();
        let organization = OrganizationSettings {
            name: non_empty("ORG_NAME").unwrap_or(defaults.name),
            contact_email: non_empty("ORG_CONTACT_EMAIL"),
            default_lab_capacity: parse_or("DEFAULT_LAB_CAPACITY", defaults.default_lab_capacity)?,
            default_service_capacity: parse_or(
                "DEFAULT_SERVICE_CAPACITY",
                defaults.default_service_capacity,
            )?,
            default_course_capacity: parse_or(
                "DEFAULT_COURSE_CAPACITY",
                defaults.default_course_capacity,
            )?,
            default_technician_load: parse_or(
                "DEFAULT_TECHNICIAN_LOAD",
                defaults.default_technician_load,
            )?,
            default_summer_trainees: parse_or(
                "DEFAULT_SUMMER_TRAINEES",
                defaults.default_summer_trainees,
            )?,
            auto_approve_registrations: parse_or("AUTO_APPROVE_REGISTRATIONS", false)?,
        };

        for (name, value) in [
            ("DEFAULT_LAB_CAPACITY", organization.default_lab_capacity),
            ("DEFAULT_SERVICE_CAPACITY", organization.default_service_capacity),
            ("DEFAULT_COURSE_CAPACITY", organization.default_course_capacity),
            ("DEFAULT_TECHNICIAN_LOAD", organization.default_technician_load),
            ("DEFAULT_SUMMER_TRAINEES", organization.default_summer_trainees),
        ] {
            if value < 1 {
                return Err(ConfigError::Invalid { name, value: value.to_string() });
            }
        }

        let bootstrap_admin = match (non_empty("ADMIN_EMAIL"), non_empty("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            _ => None,
        };

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            jwt_secret,
            bind_addr: parse_or("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            request_timeout: Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 30)?),
            actor_cache_ttl: Duration::from_secs(parse_or("ACTOR_CACHE_TTL_SECS", 60)?),
            log_dir: non_empty("LOG_DIR").map(PathBuf::from),
            organization,
            bootstrap_admin,
        })
    }

    /// Configuration for tests and local tooling: in-memory store, fixed secret.
    pub fn for_testing(jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: None,
            database_max_connections: 1,
            jwt_secret: jwt_secret.into(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            request_timeout: Duration::from_secs(10),
            actor_cache_ttl: Duration::from_secs(60),
            log_dir: None,
            organization: OrganizationSettings::default(),
            bootstrap_admin: None,
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organization_defaults() {
        let settings = OrganizationSettings::default();
        assert_eq!(settings.default_lab_capacity, 10);
        assert_eq!(settings.default_service_capacity, 5);
        assert_eq!(settings.default_course_capacity, 30);
        assert_eq!(settings.default_technician_load, 3);
        assert_eq!(settings.default_summer_trainees, 10);
        assert!(!settings.auto_approve_registrations);
    }

    #[test]
    fn testing_config_uses_memory_store() {
        let config = Config::for_testing("secret");
        assert!(config.database_url.is_none());
        assert_eq!(config.jwt_secret, "secret");
    }
}
