//! # Revoked tokens
//!
//! Logging out revokes the presented token's `jti` until the token would have
//! expired anyway.
//!
//! ## Redis
//!
//! When `REDIS_URL` is set each revoked id is a plain key with a TTL:
//! `revoked:<jti>`. Redis drops the key once the token is dead, so the set never
//! grows past the number of live revoked tokens.
//!
//! ## In process
//!
//! Without Redis the ids live in a map that is pruned on every revoke. Good
//! enough for a single instance, lost on restart.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tracing::{info, warn};

use crate::error::AppError;

const KEY_PREFIX: &str = "revoked:";

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, redis::RedisError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;

    client.get_connection_manager_with_config(config).await
}

#[derive(Clone)]
pub enum Sessions {
    Redis(ConnectionManager),
    Memory(Arc<Mutex<HashMap<String, DateTime<Utc>>>>),
}

impl Sessions {
    pub fn memory() -> Self {
        Sessions::Memory(Arc::default())
    }

    /// Redis when configured and reachable, the in-process map otherwise.
    pub async fn connect(redis_url: Option<&str>) -> Self {
        let Some(url) = redis_url else {
            info!("No REDIS_URL, keeping revoked tokens in memory");
            return Self::memory();
        };

        match init_redis(url).await {
            Ok(connection) => {
                info!("Revoked tokens stored in Redis");
                Sessions::Redis(connection)
            }
            Err(e) => {
                warn!("Redis unavailable ({e}), keeping revoked tokens in memory");
                Self::memory()
            }
        }
    }

    pub async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        let now = Utc::now();
        if expires_at <= now {
            return Ok(());
        }

        match self {
            Sessions::Redis(connection) => {
                let ttl = (expires_at - now).num_seconds().max(1) as u64;
                let mut connection = connection.clone();

                let _: () = connection
                    .set_ex(format!("{KEY_PREFIX}{jti}"), 1, ttl)
                    .await?;
            }
            Sessions::Memory(revoked) => {
                let mut revoked = revoked
                    .lock()
                    .map_err(|_| AppError::Internal("session lock poisoned".into()))?;

                revoked.retain(|_, until| *until > now);
                revoked.insert(jti.to_string(), expires_at);
            }
        }

        Ok(())
    }

    pub async fn is_revoked(&self, jti: &str) -> Result<bool, AppError> {
        match self {
            Sessions::Redis(connection) => {
                let mut connection = connection.clone();

                Ok(connection.exists(format!("{KEY_PREFIX}{jti}")).await?)
            }
            Sessions::Memory(revoked) => {
                let revoked = revoked
                    .lock()
                    .map_err(|_| AppError::Internal("session lock poisoned".into()))?;

                Ok(revoked.get(jti).is_some_and(|until| *until > Utc::now()))
            }
        }
    }
}
