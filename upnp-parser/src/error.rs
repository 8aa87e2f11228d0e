//! Error types for XML parsing operations

use thiserror::Error;

/// Errors that can occur during XML parsing operations
#[derive(Error, Debug)]
pub enum ParseError {
    /// The XML reader rejected the document
    #[error("XML deserialization failed: {0}")]
    XmlDeserializationFailed(String),

    /// Invalid XML structure
    #[error("Invalid XML structure: {0}")]
    InvalidXmlStructure(String),

    /// Missing required element
    #[error("Missing required element: {0}")]
    MissingRequiredElement(String),
}

impl From<quick_xml::Error> for ParseError {
    fn from(error: quick_xml::Error) -> Self {
        ParseError::XmlDeserializationFailed(error.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ParseError {
    fn from(error: quick_xml::events::attributes::AttrError) -> Self {
        ParseError::XmlDeserializationFailed(error.to_string())
    }
}

/// Result type alias for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;
