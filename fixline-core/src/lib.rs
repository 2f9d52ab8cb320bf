/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! # fixline Core
//!
//! Core types, data model and error definitions for the fixline FIX engine.
//!
//! This crate provides the building blocks used across all fixline crates:
//! - **Error types**: One `thiserror` enum per layer, aggregated by `FixError`
//! - **Field types**: `FieldTag`, `FieldRef`, `FieldValue`, and typed conversion
//!   through `FieldConvert` / `FixField`
//! - **Data model**: `FieldMap`, `Group` / `GroupSpec`, `Message`, `MsgType`
//! - **Core types**: `SeqNum`, `Timestamp`, `CompId`, `SessionId`
//!
//! ## Untyped Storage
//!
//! Field values are held as raw bytes; interpretation is applied by the
//! consumer, so a message decoded against one dictionary can be re-encoded
//! byte-for-byte without knowing every field's type.

pub mod error;
pub mod field;
pub mod fieldmap;
pub mod group;
pub mod message;
pub mod tags;
pub mod types;

pub use error::{
    DecodeError, EncodeError, FieldMapError, FixError, Result, SessionError, StoreError,
};
pub use field::{FieldConvert, FieldRef, FieldTag, FieldValue, FixField};
pub use fieldmap::{FieldMap, Slot};
pub use group::{Group, GroupSpec};
pub use message::{Message, MsgType};
pub use types::{CompId, SeqNum, SessionId, SessionRejectReason, Timestamp};
