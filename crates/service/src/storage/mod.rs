//! Durable key-value storage.
//!
//! [`DurableKv`] wraps a [`StorageProvider`] chosen once by the
//! [`BackendSelector`]: the host-injected provider when one is present,
//! otherwise the JSON file fallback in [`json_map_store`]. Every read and
//! write goes through a [`RetryPolicy`].

pub mod backend;
pub mod json_map_store;
pub mod kv;
pub mod memory;
pub mod provider;
pub mod retry;
pub mod sanitize;
pub mod write_queue;

pub use backend::{Backend, BackendConfig, BackendKind, BackendSelector};
pub use kv::DurableKv;
pub use memory::MemoryProvider;
pub use provider::{HostProbe, StaticHost, StorageProvider};
pub use retry::RetryPolicy;
pub use sanitize::{sanitize_key, MAX_KEY_LEN};
pub use write_queue::{FlushReport, WriteQueue, WriteQueueError};
