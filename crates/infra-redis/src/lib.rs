// Farmhand Infrastructure - Redis Adapter
// Implements: StateStore

mod store;

pub use store::RedisStateStore;

// Note: redis::RedisError conversion is wrapped in a helper here
// (orphan rules forbid From<redis::RedisError> for AppError in this crate)
