use uuid::Uuid;

use bazar_shared::clients::redis::RedisClient;

/// Presence entries expire on their own if a process dies without running
/// disconnect cleanup. Heartbeats and identify refresh the TTL.
const PRESENCE_TTL_SECS: i64 = 120;

fn presence_key(user_id: Uuid) -> String {
    format!("presence:chat:{user_id}")
}

/// Register one socket connection. A user may hold several connections at
/// once (phone plus web), so presence is a Redis set of socket ids.
pub async fn register(redis: &RedisClient, user_id: Uuid, socket_id: &str) {
    let key = presence_key(user_id);
    if let Err(e) = redis.sadd(&key, socket_id).await {
        tracing::warn!(error = %e, user_id = %user_id, "presence register failed");
        return;
    }
    let _ = redis.expire(&key, PRESENCE_TTL_SECS).await;
}

/// Drop one socket connection; the user stays online while other sockets
/// remain in the set.
pub async fn unregister(redis: &RedisClient, user_id: Uuid, socket_id: &str) {
    if let Err(e) = redis.srem(&presence_key(user_id), socket_id).await {
        tracing::warn!(error = %e, user_id = %user_id, "presence unregister failed");
    }
}

/// Refresh the TTL without touching membership.
pub async fn touch(redis: &RedisClient, user_id: Uuid) {
    let _ = redis.expire(&presence_key(user_id), PRESENCE_TTL_SECS).await;
}

pub async fn is_online(redis: &RedisClient, user_id: Uuid) -> bool {
    redis
        .scard(&presence_key(user_id))
        .await
        .map(|n| n > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_per_user() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_ne!(presence_key(a), presence_key(b));
        assert!(presence_key(a).starts_with("presence:chat:"));
    }
}
