use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use anyhow::{Result, bail};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

const PLACEHOLDER_SECRET: &str = "changethis";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "local" => Ok(Environment::Local),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(format!("unknown environment {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: Environment,
    pub database_path: String,
    pub redis_url: Option<String>,
    pub jwt_secret: SecretString,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub password_hash_rounds: u32,
    pub frontend_host: String,
    pub backend_host: String,
    pub cors_origins: Vec<String>,
    pub mail_relay_url: Option<String>,
    pub emails_from: String,
    pub first_superuser: Option<String>,
    pub first_superuser_password: Option<SecretString>,
    pub policy_sweep_seconds: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        let frontend_host: String = try_load("FRONTEND_HOST", "http://localhost:5173")?;

        let config = Self {
            port: try_load("RUST_PORT", "8000")?,
            environment: try_load("ENVIRONMENT", "local")?,
            database_path: try_load("DATABASE_PATH", "yugantar.db")?,
            redis_url: optional("REDIS_URL"),
            jwt_secret: read_secret("JWT_SECRET")
                .map(SecretString::from)
                .unwrap_or_else(|| SecretString::from(PLACEHOLDER_SECRET)),
            access_token_minutes: try_load("ACCESS_TOKEN_EXPIRE_MINUTES", "15")?,
            refresh_token_days: try_load("REFRESH_TOKEN_EXPIRE_DAYS", "7")?,
            password_hash_rounds: try_load("PASSWORD_HASH_ROUNDS", "600000")?,
            backend_host: try_load("BACKEND_HOST", "http://localhost:8000")?,
            cors_origins: cors_origins(&frontend_host),
            frontend_host,
            mail_relay_url: optional("MAIL_RELAY_URL"),
            emails_from: try_load("EMAILS_FROM", "noreply@yugantar.local")?,
            first_superuser: optional("FIRST_SUPERUSER"),
            first_superuser_password: read_secret("FIRST_SUPERUSER_PASSWORD").map(SecretString::from),
            policy_sweep_seconds: try_load("POLICY_SWEEP_SECONDS", "300")?,
        };

        config.check_secrets()?;

        Ok(config)
    }

    fn check_secrets(&self) -> Result<()> {
        let mut secrets = vec![("JWT_SECRET", &self.jwt_secret)];
        if let Some(password) = &self.first_superuser_password {
            secrets.push(("FIRST_SUPERUSER_PASSWORD", password));
        }

        for (name, secret) in secrets {
            if secret.expose_secret() != PLACEHOLDER_SECRET {
                continue;
            }

            if self.environment == Environment::Local {
                warn!("{name} is \"{PLACEHOLDER_SECRET}\", change it before deploying");
            } else {
                bail!("{name} is \"{PLACEHOLDER_SECRET}\", set a real value for {:?}", self.environment);
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            environment: Environment::Local,
            database_path: "yugantar.db".into(),
            redis_url: None,
            jwt_secret: SecretString::from(PLACEHOLDER_SECRET),
            access_token_minutes: 15,
            refresh_token_days: 7,
            password_hash_rounds: 600_000,
            frontend_host: "http://localhost:5173".into(),
            backend_host: "http://localhost:8000".into(),
            cors_origins: vec!["http://localhost:5173".into()],
            mail_relay_url: None,
            emails_from: "noreply@yugantar.local".into(),
            first_superuser: None,
            first_superuser_password: None,
            policy_sweep_seconds: 300,
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn optional(key: &str) -> Option<String> {
    let value = var(key);
    if value.is_none() {
        info!("{key} not set");
    }

    value
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let value = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    match value.parse() {
        Ok(parsed) => Ok(parsed),
        Err(e) => {
            warn!("Invalid {key} value: {e}");
            bail!("Environment misconfigured: {key}")
        }
    }
}

/// Docker secret first, then the environment.
fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    match read_to_string(&path) {
        Ok(secret) => Some(secret.trim().to_string()),
        Err(e) => {
            info!("Failed to read {secret_name} from file: {e}, trying environment");
            var(secret_name)
        }
    }
}

fn cors_origins(frontend_host: &str) -> Vec<String> {
    let mut origins: Vec<String> = var("BACKEND_CORS_ORIGINS")
        .map(|list| {
            list.split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let frontend = frontend_host.trim_end_matches('/').to_string();
    if !origins.contains(&frontend) {
        origins.push(frontend);
    }

    origins
}
