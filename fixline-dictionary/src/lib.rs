/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! # fixline Dictionary
//!
//! Runtime FIX dictionaries for the fixline engine.
//!
//! This crate provides:
//! - **Schema definitions**: Field, member, group and message definitions
//! - **Layouts**: Declared field order, required tags and group schemas per section
//! - **Dictionary parsing**: QuickFIX XML format loader
//! - **Session dictionary**: Built-in header, trailer and administrative messages
//! - **Typed conversion**: `Dictionary::convert` maps a raw value to a `FieldValue`

pub mod error;
pub mod loader;
pub mod schema;
pub mod session;

pub use error::DictionaryError;
pub use schema::{
    Dictionary, FieldDef, FieldType, GroupDef, Layout, Member, MessageCategory, MessageDef,
    Version,
};
