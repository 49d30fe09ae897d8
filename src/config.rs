use serde::Deserialize;
use thiserror::Error;

/// HS256 needs a key at least as long as its 256-bit output.
pub const MIN_SECRET_BYTES: usize = 32;

/// One year.
pub const MAX_TTL_MINUTES: i64 = 525_600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("JWT_SECRET must be at least 32 bytes, got {0}")]
    SecretTooShort(usize),

    #[error("JWT_TTL_MINUTES must be between 1 and 525600, got {0}")]
    InvalidTtl(i64),

    #[error("JWT_TTL_MINUTES is not a whole number: {0:?}")]
    UnparsableTtl(String),

    #[error("BOOTSTRAP_ADMIN_USERNAME and BOOTSTRAP_ADMIN_PASSWORD must be set together")]
    IncompleteAdmin,
}

#[derive(Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

impl JwtConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::SecretTooShort(self.secret.len()));
        }
        if !(1..=MAX_TTL_MINUTES).contains(&self.ttl_minutes) {
            return Err(ConfigError::InvalidTtl(self.ttl_minutes));
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// No URL means the in-memory store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub admin: Option<AdminBootstrap>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = get("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let jwt = JwtConfig {
            secret: get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| "taskboard".into()),
            audience: get("JWT_AUDIENCE").unwrap_or_else(|| "taskboard-users".into()),
            ttl_minutes: match get("JWT_TTL_MINUTES") {
                Some(raw) => raw
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| ConfigError::UnparsableTtl(raw.clone()))?,
                None => 60,
            },
        };
        jwt.validate()?;

        let admin = match (
            get("BOOTSTRAP_ADMIN_USERNAME"),
            get("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(AdminBootstrap { username, password }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteAdmin),
        };

        Ok(Self {
            database_url,
            jwt,
            admin,
        })
    }
}
