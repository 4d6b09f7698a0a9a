use async_trait::async_trait;
use redis::AsyncCommands;

use crate::billing::models::sub::SubscriptionRecord;
use crate::common::error::{AppError, Res};

/// Keyed store holding the latest subscription snapshot per user.
/// Single-key reads and writes, last-write-wins.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Res<Option<SubscriptionRecord>>;
    async fn set(&self, record: &SubscriptionRecord) -> Res<()>;
}

pub fn connect(redis_url: &str) -> deadpool_redis::Pool {
    let cfg = deadpool_redis::Config::from_url(redis_url);
    cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .expect("Failed to create pool of Redis connections")
}

/// Redis-backed [`SubscriptionStore`], one JSON value per user.
pub struct RedisSubscriptionStore {
    pool: deadpool_redis::Pool,
}

impl RedisSubscriptionStore {
    pub fn new(pool: deadpool_redis::Pool) -> Self {
        RedisSubscriptionStore { pool }
    }

    fn key(user_id: &str) -> String {
        format!("subscription:{}", user_id)
    }

    async fn conn(&self) -> Res<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Internal(format!("Redis pool error: {}", e)))
    }
}

#[async_trait]
impl SubscriptionStore for RedisSubscriptionStore {
    async fn get(&self, user_id: &str) -> Res<Option<SubscriptionRecord>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(Self::key(user_id)).await.map_err(AppError::from)?;

        raw.map(|payload| {
            serde_json::from_str(&payload).map_err(|e| {
                AppError::Internal(format!(
                    "Corrupt subscription record for {}: {}",
                    user_id, e
                ))
            })
        })
        .transpose()
    }

    async fn set(&self, record: &SubscriptionRecord) -> Res<()> {
        let payload = serde_json::to_string(record)
            .map_err(|e| AppError::Internal(format!("Failed to encode subscription: {}", e)))?;

        let mut conn = self.conn().await?;
        let _: () = conn
            .set(Self::key(&record.user_id), payload)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }
}
