/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! # fixline
//!
//! A FIX protocol session engine for Rust.
//!
//! fixline establishes and maintains stateful, sequenced, recoverable FIX
//! sessions over any byte stream, on top of a generic dictionary-driven
//! message model.
//!
//! ## Features
//!
//! - **Generic messages**: One `Message`/`FieldMap` type driven by a runtime dictionary
//! - **Repeating groups**: Decoded and encoded from the dictionary's group schemas
//! - **Recovery**: Gap detection, ResendRequest, GapFill and PossDup replay
//! - **Liveness**: Heartbeat and TestRequest supervision
//! - **Durability**: Messages are stored before they reach the wire
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fixline::prelude::*;
//!
//! let engine = EngineBuilder::new()
//!     .with_application(MyApplication)
//!     .add_session(SessionConfig::new(
//!         CompId::new("SERVER").unwrap(),
//!         CompId::new("CLIENT").unwrap(),
//!         "FIX.4.4",
//!     ))
//!     .build()
//!     .await?;
//!
//! let (socket, _) = listener.accept().await?;
//! engine.accept(socket).await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: Messages, field maps, groups, types and errors
//! - [`dictionary`]: Runtime dictionaries and the QuickFIX XML loader
//! - [`tagvalue`]: Tag=value encoding and decoding
//! - [`session`]: Session layer protocol implementation
//! - [`store`]: Message persistence and storage
//! - [`transport`]: Stream framing
//! - [`engine`]: Session registry and connection driver

pub mod core {
    //! Messages, field maps, groups, types and errors.
    pub use fixline_core::*;
}

pub mod dictionary {
    //! Runtime dictionaries and the QuickFIX XML loader.
    pub use fixline_dictionary::*;
}

pub mod tagvalue {
    //! Tag=value encoding and decoding.
    pub use fixline_tagvalue::*;
}

pub mod session {
    //! Session layer protocol implementation.
    pub use fixline_session::*;
}

pub mod store {
    //! Message persistence and storage.
    pub use fixline_store::*;
}

pub mod transport {
    //! Stream framing.
    pub use fixline_transport::*;
}

pub mod engine {
    //! Session registry and connection driver.
    pub use fixline_engine::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Core types
    pub use fixline_core::{
        CompId, DecodeError, EncodeError, FieldMap, FieldMapError, FieldValue, FixError, Group,
        GroupSpec, Message, MsgType, Result, SeqNum, SessionError, SessionId, StoreError,
        Timestamp, tags,
    };

    // Dictionary
    pub use fixline_dictionary::{Dictionary, FieldType, Version};

    // Tag-value encoding
    pub use fixline_tagvalue::{WireFormat, decode, encode};

    // Session
    pub use fixline_session::{
        Application, NoOpApplication, RejectReason, SessionConfig, SessionEngine, SessionEvent,
        SessionRole, SessionState,
    };

    // Store
    pub use fixline_store::{FileStore, MemoryStore, MessageStore};

    // Engine
    pub use fixline_engine::{DuplicatePolicy, Engine, EngineBuilder};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_round_trip() {
        let dict = Dictionary::session(Version::Fix44);
        let mut msg = Message::new(MsgType::TestRequest);
        msg.header_mut().set_field(tags::BEGIN_STRING, "FIX.4.4");
        msg.header_mut().set_field(tags::SENDER_COMP_ID, "A");
        msg.header_mut().set_field(tags::TARGET_COMP_ID, "B");
        msg.header_mut().set_as(tags::MSG_SEQ_NUM, &SeqNum::new(1));
        msg.header_mut().set_field(tags::SENDING_TIME, "20240101-00:00:00.000");
        msg.set_field(tags::TEST_REQ_ID, "ID1");

        let wire = msg.to_wire_with(&dict).unwrap();
        assert_eq!(Message::from_wire(&wire, &dict).unwrap(), msg);
    }

    #[test]
    fn test_version() {
        let version = Version::Fix44;
        assert_eq!(version.begin_string(), "FIX.4.4");
    }
}
