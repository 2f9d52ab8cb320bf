/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! # fixline Store
//!
//! Message persistence for the fixline FIX session engine.
//!
//! This crate provides:
//! - **MessageStore trait**: Sent messages and session counters
//! - **MemoryStore**: In-memory store for tests and transient sessions
//! - **FileStore**: Append-only, fsynced log per session identity

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::{MessageStore, StoredMessage};
