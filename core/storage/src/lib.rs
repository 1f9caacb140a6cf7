//! Remote and local storage for MovieSync.
//!
//! This module provides a trait-based interface to the hosted movie service
//! (`MovieProvider`) and durable named slots for offline state (`LocalStore`).
//!
//! # Design Principles
//! - Unified error semantics: transport failures are `Error::Network`,
//!   rejected requests are `Error::Remote` or `Error::NotFound`
//! - Async operations: all I/O operations are async
//! - In-memory implementations of both traits for tests and development

pub mod http;
pub mod local;
pub mod memory;
pub mod provider;

pub use http::HttpProvider;
pub use local::{FileStore, LocalStore, MemoryStore, MIRROR_SLOT, PENDING_SLOT};
pub use memory::{Availability, MemoryProvider, RemoteCall};
pub use provider::{MovieProvider, ProbeOutcome};
