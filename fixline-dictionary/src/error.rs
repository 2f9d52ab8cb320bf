/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Dictionary loading errors.

use thiserror::Error;

/// Errors raised while building a [`Dictionary`](crate::Dictionary).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DictionaryError {
    /// The document is not well-formed XML.
    #[error("xml parse error: {0}")]
    Xml(String),

    /// A required attribute is absent.
    #[error("no `{attribute}` attribute in `{element}` element")]
    MissingAttribute {
        /// Element name.
        element: String,
        /// Attribute name.
        attribute: String,
    },

    /// A required child element is absent.
    #[error("no `{child}` child in `{parent}` element")]
    MissingElement {
        /// Parent element name.
        parent: String,
        /// Child element name.
        child: String,
    },

    /// An attribute holds an unusable value.
    #[error("invalid `{attribute}` value `{value}`")]
    InvalidAttribute {
        /// Attribute name.
        attribute: String,
        /// Offending value.
        value: String,
    },

    /// A member refers to a field that is not declared.
    #[error("unknown field `{0}`")]
    UnknownField(String),

    /// A member refers to a component that is not declared.
    #[error("unknown component `{0}`")]
    UnknownComponent(String),

    /// Components include each other.
    #[error("component `{0}` includes itself")]
    RecursiveComponent(String),

    /// The version attributes name no supported FIX version.
    #[error("unsupported FIX version: {0}")]
    UnsupportedVersion(String),

    /// The dictionary file could not be read.
    #[error("io error: {0}")]
    Io(String),

    /// The dictionary defines no messages.
    #[error("dictionary defines no messages")]
    Empty,
}

impl From<std::io::Error> for DictionaryError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
