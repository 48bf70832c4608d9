//! Reference [`StorageBackend`](xfer_core::backend::StorageBackend) implementations.
//!
//! Only a local-disk backend ships in this crate, as a reference implementation
//! exercised by the integration tests; object-store, remote-FTS, encrypted-local
//! and HTTP-fronted backends are pluggable storage providers out of scope here.

pub mod local;
