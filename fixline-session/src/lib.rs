/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! # fixline Session
//!
//! FIX session layer protocol implementation for the fixline engine.
//!
//! This crate provides:
//! - **State machine**: Pure session FSM producing transitions and actions
//! - **Sequence management**: Inbound and outbound counters with gap detection
//! - **Heartbeat handling**: Heartbeat/TestRequest supervision
//! - **Recovery**: Gap fill and ResendRequest processing
//! - **Engine**: [`SessionEngine`] driving one session over any byte transport
//! - **Configuration**: Session configuration options

pub mod application;
pub mod config;
pub mod engine;
pub mod heartbeat;
pub mod messages;
pub mod sequence;
pub mod state;

pub use application::{Application, NoOpApplication, RejectReason, SessionEvent};
pub use config::{ResendRange, SessionConfig, SessionConfigBuilder, SessionRole};
pub use engine::SessionEngine;
pub use heartbeat::{HeartbeatAction, HeartbeatManager};
pub use sequence::{SequenceCheck, SequenceTracker};
pub use state::{Action, SessionState, Transition, Trigger};
