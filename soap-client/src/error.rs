//! Error types for the SOAP client

use thiserror::Error;

/// Errors that can occur during SOAP and GENA communication
#[derive(Debug, Error)]
pub enum SoapError {
    /// Transport-level failure: connect, send, or reading the response body
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The device answered, but not with something we could use.
    ///
    /// Covers non-success HTTP status codes, malformed XML, and a missing
    /// `{action}Response` element. The raw response body is kept for diagnostics.
    #[error("Protocol error: {message}")]
    Protocol {
        /// What went wrong
        message: String,
        /// Raw response body as received (may be empty)
        body: String,
    },

    /// SOAP fault returned by the device, with the UPnP error detail when present
    #[error("SOAP fault: error code {code} ({description})")]
    Fault {
        /// UPnP error code, 500 when the device did not provide one
        code: u16,
        /// UPnP error description, empty when absent
        description: String,
        /// Raw response body
        body: String,
    },
}

impl SoapError {
    pub(crate) fn protocol(message: impl Into<String>, body: impl Into<String>) -> Self {
        SoapError::Protocol {
            message: message.into(),
            body: body.into(),
        }
    }

    /// Whether this error belongs to the protocol class (everything except transport failures)
    pub fn is_protocol_error(&self) -> bool {
        !matches!(self, SoapError::Network(_))
    }

    /// The raw response body, if the device sent one
    pub fn body(&self) -> Option<&str> {
        match self {
            SoapError::Network(_) => None,
            SoapError::Protocol { body, .. } | SoapError::Fault { body, .. } => Some(body),
        }
    }
}
