// Identifier port
//
// New job and agent records get their ids minted here. Production hands out
// random UUIDs; tests swap in a counter so record keys sort predictably and
// assertions can name ids up front.

/// Mints opaque unique identifiers for new records
pub trait IdProvider: Send + Sync {
    fn generate_id(&self) -> String;
}

/// Random UUID v4 ids (production)
#[derive(Default)]
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

pub mod mocks {
    use super::IdProvider;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Prefix + counter ids (job-1, job-2, ...) for deterministic tests
    pub struct SequentialIdProvider {
        prefix: String,
        counter: AtomicU64,
    }

    impl SequentialIdProvider {
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                counter: AtomicU64::new(1),
            }
        }
    }

    impl IdProvider for SequentialIdProvider {
        fn generate_id(&self) -> String {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            format!("{}-{}", self.prefix, n)
        }
    }
}
