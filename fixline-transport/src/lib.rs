/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! # fixline Transport
//!
//! Byte-stream framing for the fixline engine.
//!
//! This crate provides:
//! - **Codec**: Tokio codec splitting a stream into whole FIX frames
//! - **Resynchronisation**: Garbage before `8=` is skipped, frames with a
//!   wrong BodyLength are cut at their trailer

pub mod codec;

pub use codec::{CodecError, DEFAULT_MAX_MESSAGE_SIZE, FixCodec};
