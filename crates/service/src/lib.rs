//! Service layer for the Sahaay front-end.
//! - `storage`: the durable key-value store and its backends.
//! - `records`: typed consent and chat-history records on top of the store.
//! - `ai`: chat-completion client.

pub mod errors;
pub mod observability;
pub mod storage;
pub mod records;
pub mod ai;
