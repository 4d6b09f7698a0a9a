use async_trait::async_trait;
use redis::AsyncCommands;

/// Channel the reload signal is published on. Subscribers elsewhere in the
/// host application treat any message as "subscription data changed".
pub const RELOAD_TOPIC: &str = "reload";

/// Fire-and-forget notification that subscription data changed.
/// Injected from the composition root; failures are logged, never surfaced.
#[async_trait]
pub trait ReloadPublisher: Send + Sync {
    async fn publish_reload(&self);
}

/// Publishes the reload signal over Redis pub/sub.
pub struct RedisReloadPublisher {
    pool: deadpool_redis::Pool,
}

impl RedisReloadPublisher {
    pub fn new(pool: deadpool_redis::Pool) -> Self {
        RedisReloadPublisher { pool }
    }
}

#[async_trait]
impl ReloadPublisher for RedisReloadPublisher {
    async fn publish_reload(&self) {
        let result: Result<(), String> = async {
            let mut conn = self.pool.get().await.map_err(|e| e.to_string())?;
            let _: i64 = conn
                .publish(RELOAD_TOPIC, "now")
                .await
                .map_err(|e| e.to_string())?;
            Ok(())
        }
        .await;

        if let Err(err) = result {
            log::error!("Failed to publish reload signal: {}", err);
        }
    }
}
