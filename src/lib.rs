//! shardkv-server: a sharded in-memory key-value store behind a RESP server
//!
//! # Architecture
//!
//! - Fixed power-of-two set of `RwLock` shards, keys routed by 32-bit FNV-1a
//! - Multi-key commands lock every involved shard in ascending shard order
//! - mio-driven accept loop, one blocking thread per connection
//! - Streaming RESP decoder and single-buffer reply encoder
//! - Graceful shutdown from an API call or SIGINT/SIGTERM/SIGHUP/SIGQUIT

/// Registry of live client sessions
pub mod client_registry;

/// Configuration management for the server
pub mod config;

/// Error types and result aliases
pub mod error;

/// Per-connection sessions
pub mod network;

/// Redis protocol (RESP) implementation and command dispatch
pub mod protocol;

/// Server runtime: accept loop and shutdown
pub mod server;

/// Sharded storage and multi-key locking
pub mod store;

pub use client_registry::{ClientInfo, ClientRegistry};
pub use config::Config;
pub use error::{Error, Result};
pub use network::Session;
pub use protocol::{CommandTable, Database, Decoder, Executor, Reply};
pub use server::{Server, ServerState, ShutdownSignal};
pub use store::{LockSet, ReadLocks, ShardedStore, WriteLocks};
