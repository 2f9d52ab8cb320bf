/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! # fixline Engine
//!
//! Process-level supervision of FIX sessions.
//!
//! This crate provides:
//! - **Engine**: Registry of sessions keyed by identity, one transport each
//! - **Connection driver**: Runs a session over any `AsyncRead + AsyncWrite`
//! - **Heartbeat scheduler**: Periodic timer task per connection
//! - **Builder API**: Fluent configuration for engine setup

pub mod builder;
pub mod connection;
pub mod registry;
pub mod scheduler;

pub use builder::EngineBuilder;
pub use registry::{DuplicatePolicy, Engine, SessionHandle};
pub use scheduler::HeartbeatScheduler;
