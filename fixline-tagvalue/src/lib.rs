/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! # fixline Tag-Value
//!
//! FIX tag=value encoding and decoding for the fixline engine.
//!
//! ## Features
//!
//! - **Zero-copy tokenizing**: Field values reference the original buffer
//! - **Dictionary-driven decoding**: Header, body and trailer placement and
//!   repeating groups come from a [`Dictionary`](fixline_dictionary::Dictionary)
//! - **Length-prefixed data**: `Data` fields may carry SOH
//! - **Strict framing**: BodyLength, CheckSum and field order are verified

pub mod checksum;
pub mod decoder;
pub mod encoder;
pub mod tokenizer;
pub mod wire;

pub use checksum::{calculate_checksum, format_checksum, parse_checksum};
pub use decoder::{Decoder, decode};
pub use encoder::{Encoder, encode};
pub use tokenizer::{HeaderPeek, SOH, Tokenizer, peek_header};
pub use wire::WireFormat;
