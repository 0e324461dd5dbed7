//! Adapters behind the domain ports.

pub mod http_gateway;
pub mod in_memory;
pub mod notifier;
pub mod offline;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
