// State Store Port (Interface)
//
// Key-value store with atomic list operations. Each individual operation is
// atomic; there are no multi-key transactions. Correctness above this layer
// comes from monotone state transitions plus the reconciliation sweep.

use async_trait::async_trait;

use crate::error::Result;

/// Raw key-value + list store
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Upsert with optional expiry (milliseconds)
    async fn put(&self, key: &str, value: &str, ttl_ms: Option<i64>) -> Result<()>;

    /// Fetch a value; `None` when the key is absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// All live keys under a prefix
    async fn scan(&self, prefix: &str) -> Result<Vec<String>>;

    async fn list_push_tail(&self, key: &str, value: &str) -> Result<()>;

    async fn list_pop_head(&self, key: &str) -> Result<Option<String>>;

    async fn list_len(&self, key: &str) -> Result<i64>;

    async fn list_snapshot(&self, key: &str) -> Result<Vec<String>>;

    /// Backend liveness probe
    async fn ping(&self) -> Result<()>;
}

pub mod memory {
    //! In-process store for tests and single-process deployments.
    //!
    //! TTL expiry is lazy and driven by the injected clock so tests can
    //! advance a mock `TimeProvider` and observe records vanish.

    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::error::{AppError, Result};
    use crate::port::TimeProvider;

    use super::StateStore;

    struct Entry {
        value: String,
        expires_at: Option<i64>,
    }

    pub struct MemoryStateStore {
        time_provider: Arc<dyn TimeProvider>,
        kv: Mutex<HashMap<String, Entry>>,
        lists: Mutex<HashMap<String, VecDeque<String>>>,
        offline: AtomicBool,
    }

    impl MemoryStateStore {
        pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                time_provider,
                kv: Mutex::new(HashMap::new()),
                lists: Mutex::new(HashMap::new()),
                offline: AtomicBool::new(false),
            }
        }

        /// Simulate a backend outage: every operation fails until cleared
        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn check_online(&self) -> Result<()> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(AppError::StoreUnavailable(
                    "memory store marked offline".to_string(),
                ));
            }
            Ok(())
        }

        fn expired(&self, entry: &Entry) -> bool {
            entry
                .expires_at
                .is_some_and(|at| self.time_provider.now_millis() >= at)
        }
    }

    #[async_trait]
    impl StateStore for MemoryStateStore {
        async fn put(&self, key: &str, value: &str, ttl_ms: Option<i64>) -> Result<()> {
            self.check_online()?;
            let expires_at = ttl_ms.map(|ttl| self.time_provider.now_millis() + ttl);
            let mut kv = self.kv.lock().expect("state store lock poisoned");
            kv.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at,
                },
            );
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.check_online()?;
            let mut kv = self.kv.lock().expect("state store lock poisoned");
            let expired = kv.get(key).map(|e| self.expired(e));
            match expired {
                Some(true) => {
                    kv.remove(key);
                    Ok(None)
                }
                Some(false) => Ok(kv.get(key).map(|e| e.value.clone())),
                None => Ok(None),
            }
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.check_online()?;
            self.kv
                .lock()
                .expect("state store lock poisoned")
                .remove(key);
            Ok(())
        }

        async fn scan(&self, prefix: &str) -> Result<Vec<String>> {
            self.check_online()?;
            let mut kv = self.kv.lock().expect("state store lock poisoned");
            let expired: Vec<String> = kv
                .iter()
                .filter(|(_, e)| self.expired(e))
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired {
                kv.remove(&key);
            }
            let mut keys: Vec<String> = kv
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            keys.sort();
            Ok(keys)
        }

        async fn list_push_tail(&self, key: &str, value: &str) -> Result<()> {
            self.check_online()?;
            self.lists
                .lock()
                .expect("state store lock poisoned")
                .entry(key.to_string())
                .or_default()
                .push_back(value.to_string());
            Ok(())
        }

        async fn list_pop_head(&self, key: &str) -> Result<Option<String>> {
            self.check_online()?;
            Ok(self
                .lists
                .lock()
                .expect("state store lock poisoned")
                .get_mut(key)
                .and_then(|l| l.pop_front()))
        }

        async fn list_len(&self, key: &str) -> Result<i64> {
            self.check_online()?;
            Ok(self
                .lists
                .lock()
                .expect("state store lock poisoned")
                .get(key)
                .map(|l| l.len() as i64)
                .unwrap_or(0))
        }

        async fn list_snapshot(&self, key: &str) -> Result<Vec<String>> {
            self.check_online()?;
            Ok(self
                .lists
                .lock()
                .expect("state store lock poisoned")
                .get(key)
                .map(|l| l.iter().cloned().collect())
                .unwrap_or_default())
        }

        async fn ping(&self) -> Result<()> {
            self.check_online()
        }
    }

}
