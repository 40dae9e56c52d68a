//! cloudfs-adapter: local/remote file-system reconciliation
//!
//! Keeps the adapter tree that bridges internal node ids and platform
//! alternate ids, tracks local copy relationships in a persistent link store,
//! serves validated file revisions, hydrates placeholders on demand and
//! carries platform change events through a decorator pipeline.

pub mod concurrency;
pub mod config;
pub mod copy;
pub mod error;
pub mod events;
pub mod hydration;
pub mod logging;
pub mod revision;
pub mod store;
pub mod tooling;
pub mod tree;
pub mod types;
