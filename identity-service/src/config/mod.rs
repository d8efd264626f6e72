use secrecy::{ExposeSecret, SecretString};
use service_core::config::ServerConfig;
use service_core::error::AppError;
use service_core::observability::{LogFormat, TracingConfig};
use std::env;

/// Minimum HS256 key length accepted in production.
pub const MIN_PROD_SECRET_BYTES: usize = 32;
/// Upper bound on `ACCESS_TOKEN_TTL_MINUTES` (one day).
pub const MAX_ACCESS_TOKEN_TTL_MINUTES: i64 = 24 * 60;
/// Upper bound on `REFRESH_TOKEN_TTL_DAYS` (one year).
pub const MAX_REFRESH_TOKEN_TTL_DAYS: i64 = 365;

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub server: ServerConfig,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub otlp_endpoint: Option<String>,
    /// `None` in dev means the in-memory identity store.
    pub database: Option<DatabaseConfig>,
    pub token: TokenConfig,
    pub hashing: HashingConfig,
    pub google: Option<GoogleOAuthConfig>,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: SecretString,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub signing_secret: SecretString,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl GoogleOAuthConfig {
    pub const DEFAULT_AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    pub const DEFAULT_TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";
    pub const DEFAULT_USERINFO_URL: &'static str = "https://www.googleapis.com/oauth2/v2/userinfo";
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    /// Shared secret for the trusted `/oauth` assertion endpoint; the route is
    /// not mounted without it.
    pub federation_api_key: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub auth_attempts: u32,
    pub auth_window_seconds: u64,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let server = ServerConfig::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let database = match optional_env("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url: SecretString::new(url),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1")?,
            }),
            None if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_URL is required in production but not set"
                )))
            }
            None => None,
        };

        let google = match optional_env("GOOGLE_CLIENT_ID") {
            Some(client_id) => Some(GoogleOAuthConfig {
                client_id,
                client_secret: SecretString::new(get_env("GOOGLE_CLIENT_SECRET", None, is_prod)?),
                redirect_uri: get_env("GOOGLE_REDIRECT_URI", None, is_prod)?,
                auth_url: get_env(
                    "GOOGLE_AUTH_URL",
                    Some(GoogleOAuthConfig::DEFAULT_AUTH_URL),
                    false,
                )?,
                token_url: get_env(
                    "GOOGLE_TOKEN_URL",
                    Some(GoogleOAuthConfig::DEFAULT_TOKEN_URL),
                    false,
                )?,
                userinfo_url: get_env(
                    "GOOGLE_USERINFO_URL",
                    Some(GoogleOAuthConfig::DEFAULT_USERINFO_URL),
                    false,
                )?,
            }),
            None => None,
        };

        let config = IdentityConfig {
            server,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), false)?,
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            log_format: get_env("LOG_FORMAT", Some("json"), false)?
                .parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            otlp_endpoint: optional_env("OTLP_ENDPOINT"),
            database,
            token: TokenConfig {
                // Required in every environment: the process must not start without it.
                signing_secret: SecretString::new(get_env("JWT_SECRET", None, true)?),
                access_token_ttl_minutes: parse_env("ACCESS_TOKEN_TTL_MINUTES", "15")?,
                refresh_token_ttl_days: parse_env("REFRESH_TOKEN_TTL_DAYS", "7")?,
            },
            hashing: HashingConfig {
                memory_kib: parse_env(
                    "PASSWORD_HASH_MEMORY_KIB",
                    &argon2::Params::DEFAULT_M_COST.to_string(),
                )?,
                iterations: parse_env(
                    "PASSWORD_HASH_ITERATIONS",
                    &argon2::Params::DEFAULT_T_COST.to_string(),
                )?,
                parallelism: parse_env(
                    "PASSWORD_HASH_PARALLELISM",
                    &argon2::Params::DEFAULT_P_COST.to_string(),
                )?,
            },
            google,
            security: SecurityConfig {
                allowed_origins: split_origins(&get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?),
                federation_api_key: optional_env("FEDERATION_API_KEY").map(SecretString::new),
            },
            rate_limit: RateLimitConfig {
                auth_attempts: parse_env("RATE_LIMIT_AUTH_ATTEMPTS", "10")?,
                auth_window_seconds: parse_env("RATE_LIMIT_AUTH_WINDOW_SECONDS", "60")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.server.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "APP__PORT must be greater than 0"
            )));
        }

        if !(1..=MAX_ACCESS_TOKEN_TTL_MINUTES).contains(&self.token.access_token_ttl_minutes) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ACCESS_TOKEN_TTL_MINUTES must be between 1 and {}",
                MAX_ACCESS_TOKEN_TTL_MINUTES
            )));
        }

        if !(1..=MAX_REFRESH_TOKEN_TTL_DAYS).contains(&self.token.refresh_token_ttl_days) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REFRESH_TOKEN_TTL_DAYS must be between 1 and {}",
                MAX_REFRESH_TOKEN_TTL_DAYS
            )));
        }

        let secret_len = self.token.signing_secret.expose_secret().len();
        if secret_len == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must not be empty"
            )));
        }

        if self.environment == Environment::Prod {
            if secret_len < MIN_PROD_SECRET_BYTES {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be at least {} bytes in production",
                    MIN_PROD_SECRET_BYTES
                )));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }
        } else if secret_len < MIN_PROD_SECRET_BYTES {
            tracing::warn!("JWT_SECRET is shorter than {} bytes", MIN_PROD_SECRET_BYTES);
        }

        Ok(())
    }

    pub fn tracing(&self) -> TracingConfig {
        TracingConfig {
            service_name: self.service_name.clone(),
            log_level: self.log_level.clone(),
            format: self.log_format,
            otlp_endpoint: self.otlp_endpoint.clone(),
        }
    }
}

fn get_env(key: &str, default: Option<&str>, required: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => match default {
            Some(def) if !required => Ok(def.to_string()),
            _ => Err(AppError::ConfigError(anyhow::anyhow!(
                "{} is required but not set",
                key
            ))),
        },
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(default), false)?;
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, e))
    })
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
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

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IdentityConfig {
        IdentityConfig {
            server: ServerConfig::default(),
            environment: Environment::Dev,
            service_name: "identity-service".to_string(),
            service_version: "test".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            otlp_endpoint: None,
            database: None,
            token: TokenConfig {
                signing_secret: SecretString::new("x".repeat(MIN_PROD_SECRET_BYTES)),
                access_token_ttl_minutes: 15,
                refresh_token_ttl_days: 7,
            },
            hashing: HashingConfig::default(),
            google: None,
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
                federation_api_key: None,
            },
            rate_limit: RateLimitConfig {
                auth_attempts: 10,
                auth_window_seconds: 60,
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_ttls() {
        let mut c = config();
        c.token.access_token_ttl_minutes = 0;
        assert!(c.validate().is_err());

        let mut c = config();
        c.token.refresh_token_ttl_days = -1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_ttls() {
        let mut c = config();
        c.token.access_token_ttl_minutes = MAX_ACCESS_TOKEN_TTL_MINUTES;
        c.token.refresh_token_ttl_days = MAX_REFRESH_TOKEN_TTL_DAYS;
        assert!(c.validate().is_ok());

        let mut c = config();
        c.token.access_token_ttl_minutes = MAX_ACCESS_TOKEN_TTL_MINUTES + 1;
        assert!(c.validate().is_err());

        let mut c = config();
        c.token.refresh_token_ttl_days = 100_000_000;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_secret() {
        let mut c = config();
        c.token.signing_secret = SecretString::new(String::new());
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_prod_requires_long_secret_and_explicit_origins() {
        let mut c = config();
        c.environment = Environment::Prod;
        c.token.signing_secret = SecretString::new("short".to_string());
        assert!(c.validate().is_err());

        let mut c = config();
        c.environment = Environment::Prod;
        c.security.allowed_origins = vec!["*".to_string()];
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_split_origins_ignores_blanks() {
        assert_eq!(
            split_origins("http://a.com, ,http://b.com"),
            vec!["http://a.com".to_string(), "http://b.com".to_string()]
        );
    }
}
