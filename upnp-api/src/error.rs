use soap_client::SoapError;
use thiserror::Error;
use upnp_discovery::DiscoveryError;

/// Errors from service-level operations
///
/// Wraps the wire-level errors of the SOAP client and the description model
/// and adds the failures that only make sense once a service is known, such
/// as asking a rendering service for a port mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The device could not be reached or the connection failed mid-request
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The device answered with something unusable
    ///
    /// Non-success status codes, malformed envelopes and missing response
    /// elements all land here. The raw body is kept for diagnostics.
    #[error("Protocol error: {message}")]
    ProtocolError { message: String, body: String },

    /// SOAP fault returned by device, with the raw fault envelope
    #[error("SOAP fault: error code {code} ({description})")]
    SoapFault {
        code: u16,
        description: String,
        body: String,
    },

    /// Building or resolving the description model failed
    #[error("Description error: {0}")]
    Description(#[from] DiscoveryError),

    /// A facet was requested for a service of another type
    #[error("Unsupported service: expected {expected}, found {found}")]
    UnsupportedService { expected: String, found: String },

    /// A successful response lacked an output argument or carried an
    /// unparseable value
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ApiError {
    pub(crate) fn missing_argument(action: &str, name: &str) -> Self {
        Self::InvalidResponse(format!("{action}Response has no {name}"))
    }

    /// Whether the device answered at all (everything except network failures)
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::ProtocolError { .. } | Self::SoapFault { .. })
    }

    /// UPnP error code when the device returned a SOAP fault
    pub fn fault_code(&self) -> Option<u16> {
        match self {
            Self::SoapFault { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Raw response body for errors where the device answered
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::ProtocolError { body, .. } | Self::SoapFault { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Convert from the SOAP client's error type
impl From<SoapError> for ApiError {
    fn from(error: SoapError) -> Self {
        match error {
            SoapError::Network(msg) => ApiError::NetworkError(msg),
            SoapError::Protocol { message, body } => ApiError::ProtocolError { message, body },
            SoapError::Fault { code, description, body } => ApiError::SoapFault {
                code,
                description,
                body,
            },
        }
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
