//! Storage is organized through [store::PersistentStore].
//! The basic idea is:
//!  - The store is a flat key-value space of json values shared by the tracker and the cli.
//!  - [snapshot] maps the whole usage state onto those keys and validates it on the way back.
//!  - [file_store::FileStore] is the durable realization, [memory_store::MemoryStore] is used
//!    when nothing needs to survive the process.

pub mod entities;
pub mod file_store;
pub mod memory_store;
pub mod snapshot;
pub mod store;
