//! Per-IP referral counters consulted before the database count.
//!
//! Two backends are available:
//! - **memory**: `moka` cache local to the process, entries expire after 24h
//! - **redis**: `INCR` + `EXPIRE`, shared by every worker (feature `redis`)
//!
//! ```bash
//! REFERRAL_THROTTLE_BACKEND=redis   # memory (default), redis
//! REDIS_URL=redis://localhost:6379
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;

/// Counting window for referral attempts.
pub const WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum ThrottleError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait IpThrottle: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Counts one referral attempt from `ip` and returns the attempts seen in
    /// the current window, this one included.
    async fn hit(&self, ip: &str) -> Result<u64, ThrottleError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ThrottleBackend {
    #[default]
    Memory,
    #[cfg(feature = "redis")]
    Redis,
}

impl ThrottleBackend {
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("REFERRAL_THROTTLE_BACKEND").unwrap_or_default())
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            #[cfg(feature = "redis")]
            "redis" => Self::Redis,
            _ => Self::Memory,
        }
    }
}

/// Builds the throttle selected by `REFERRAL_THROTTLE_BACKEND`.
pub async fn create_ip_throttle() -> Result<Arc<dyn IpThrottle>, ThrottleError> {
    match ThrottleBackend::from_env() {
        ThrottleBackend::Memory => Ok(Arc::new(MemoryIpThrottle::new())),
        #[cfg(feature = "redis")]
        ThrottleBackend::Redis => Ok(Arc::new(RedisIpThrottle::from_env().await?)),
    }
}

#[derive(Clone, Debug)]
pub struct MemoryIpThrottle {
    counters: moka::sync::Cache<String, Arc<AtomicU64>>,
}

impl Default for MemoryIpThrottle {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIpThrottle {
    pub fn new() -> Self {
        Self::with_window(WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            counters: moka::sync::Cache::builder()
                .max_capacity(100_000)
                .time_to_live(window)
                .build(),
        }
    }
}

#[async_trait]
impl IpThrottle for MemoryIpThrottle {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn hit(&self, ip: &str) -> Result<u64, ThrottleError> {
        let counter = self
            .counters
            .get_with(ip.to_string(), || Arc::new(AtomicU64::new(0)));
        Ok(counter.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[cfg(feature = "redis")]
pub use redis_backend::RedisIpThrottle;

#[cfg(feature = "redis")]
mod redis_backend {
    use std::sync::Arc;

    use async_trait::async_trait;
    use futures::lock::Mutex;
    use redis::{AsyncCommands, Client, aio::MultiplexedConnection};

    use super::{IpThrottle, ThrottleError, WINDOW};

    const KEY_PREFIX: &str = "affiliate:referral:ip:";

    #[derive(Clone)]
    pub struct RedisIpThrottle {
        conn: Arc<Mutex<MultiplexedConnection>>,
    }

    impl RedisIpThrottle {
        pub async fn new(url: &str) -> Result<Self, ThrottleError> {
            let client =
                Client::open(url).map_err(|e| ThrottleError::Connection(e.to_string()))?;
            let conn = client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| ThrottleError::Connection(e.to_string()))?;
            Ok(Self {
                conn: Arc::new(Mutex::new(conn)),
            })
        }

        pub async fn from_env() -> Result<Self, ThrottleError> {
            let url = std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string());
            Self::new(&url).await
        }

        fn key(ip: &str) -> String {
            format!("{KEY_PREFIX}{ip}")
        }
    }

    #[async_trait]
    impl IpThrottle for RedisIpThrottle {
        fn backend_name(&self) -> &'static str {
            "redis"
        }

        async fn hit(&self, ip: &str) -> Result<u64, ThrottleError> {
            let key = Self::key(ip);
            let mut conn = self.conn.lock().await;
            let count: u64 = conn
                .incr(&key, 1u64)
                .await
                .map_err(|e| ThrottleError::Backend(e.to_string()))?;
            if count == 1 {
                let _: () = conn
                    .expire(&key, WINDOW.as_secs() as i64)
                    .await
                    .map_err(|e| ThrottleError::Backend(e.to_string()))?;
            }
            Ok(count)
        }
    }
}
