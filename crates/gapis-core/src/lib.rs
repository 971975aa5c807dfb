//! gapis Core - Domain model, ports and configuration
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Node` (remote entry snapshot), `SyncPath`, `RemoteId`, `FileHash`
//! - **Port definitions** - Traits for adapters: `IRemoteStore`, `ILocalFileSystem`
//! - **Configuration** - YAML-backed `Config` with validation
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure data types with no I/O.
//! Ports define trait interfaces that adapter crates implement; the sync
//! engine only ever talks to those traits.

pub mod config;
pub mod domain;
pub mod ports;
