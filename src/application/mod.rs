//! Application layer: turns inbound payloads into ledger changes.
//!
//! `reconcile` holds the per-event decisions and never touches storage. `engine` wraps it with
//! locking, the callback queue and side effects; `payments` and `provider` add the flows the
//! shop starts itself.

pub mod checksum;
pub mod engine;
pub mod locks;
pub mod normalizer;
pub mod payments;
pub mod provider;
pub mod reconcile;
pub mod requests;
