//! Private SOAP client for UPnP device communication
//!
//! This crate provides a minimal SOAP client for invoking actions on UPnP
//! services, plus the GENA verbs (SUBSCRIBE / UNSUBSCRIBE) used to manage event
//! subscriptions. It works on absolute URLs only; resolving a service's relative
//! control and event paths is left to the caller.
//!
//! Every request builds its headers from scratch, so a single client can be
//! shared across threads freely.

mod envelope;
mod error;

pub use envelope::{build_envelope, parse_response, ActionArgument, ActionResponse};
pub use error::SoapError;

use std::time::Duration;
use tracing::debug;

const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Response from a UPnP subscription request
#[derive(Debug, Clone)]
pub struct SubscriptionResponse {
    /// Subscription ID returned by the device
    pub sid: String,
    /// Actual timeout granted by the device (in seconds)
    pub timeout_seconds: u32,
}

/// Configuration for [`SoapClient`]
#[derive(Debug, Clone)]
pub struct SoapClientConfig {
    /// Value sent in the `USER-AGENT` header
    /// Default: "<os>/1.0 UPnP/1.1 upnp-cp/<version>"
    pub user_agent: String,

    /// TCP connect timeout
    /// Default: 5 seconds
    pub connect_timeout: Duration,

    /// Read timeout for the response
    /// Default: 10 seconds
    pub read_timeout: Duration,

    /// Add the HTTP extension framework headers (`MAN` + `01-SOAPACTION`)
    /// for devices that refuse plain SOAP requests.
    /// Default: false
    pub mandatory_extension: bool,
}

impl Default for SoapClientConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            mandatory_extension: false,
        }
    }
}

impl SoapClientConfig {
    /// Configuration for devices that require the mandatory extension headers
    pub fn legacy_extension() -> Self {
        Self {
            mandatory_extension: true,
            ..Default::default()
        }
    }
}

/// The client identification string used for SOAP and SSDP traffic
pub fn default_user_agent() -> String {
    format!(
        "{}/1.0 UPnP/1.1 upnp-cp/{}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    )
}

/// A minimal SOAP client for UPnP device communication
#[derive(Debug, Clone)]
pub struct SoapClient {
    agent: ureq::Agent,
    config: SoapClientConfig,
}

impl SoapClient {
    /// Create a new SOAP client with default configuration
    pub fn new() -> Self {
        Self::with_config(SoapClientConfig::default())
    }

    /// Create a SOAP client with a custom configuration
    pub fn with_config(config: SoapClientConfig) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(config.connect_timeout)
                .timeout_read(config.read_timeout)
                .build(),
            config,
        }
    }

    pub fn config(&self) -> &SoapClientConfig {
        &self.config
    }

    /// Invoke `action` on the service reachable at `control_url`.
    ///
    /// # Arguments
    /// * `control_url` - Absolute URL of the service's control endpoint
    /// * `service_type` - Service type URN, used as the body element namespace
    /// * `action` - Action name, e.g. "AddPortMapping"
    /// * `arguments` - Input arguments, in the order the service declares them
    ///
    /// # Errors
    /// `SoapError::Network` when the request cannot be carried out,
    /// `SoapError::Fault` when the device answers with a SOAP fault, and
    /// `SoapError::Protocol` for any other unusable answer.
    pub fn call(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        arguments: &[ActionArgument],
    ) -> Result<ActionResponse, SoapError> {
        let body = build_envelope(service_type, action, arguments);
        let soap_action = format!("\"{service_type}#{action}\"");

        debug!(url = control_url, action, "posting SOAP action");

        let mut request = self
            .agent
            .post(control_url)
            .set("CACHE-CONTROL", "no-store")
            .set("PRAGMA", "no-cache")
            .set("CONTENT-TYPE", "text/xml; charset=\"utf-8\"")
            .set("USER-AGENT", &self.config.user_agent)
            .set("SOAPACTION", &soap_action);

        if self.config.mandatory_extension {
            request = request
                .set("MAN", &format!("\"{SOAP_ENVELOPE_NS}\"; ns=01"))
                .set("01-SOAPACTION", &soap_action);
        }

        let response = match request.send_string(&body) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let text = response.into_string().unwrap_or_default();
                return Err(match envelope::parse_fault(&text) {
                    Some((fault_code, description)) => SoapError::Fault {
                        code: fault_code,
                        description,
                        body: text,
                    },
                    None => SoapError::protocol(format!("{action} failed: HTTP {code}"), text),
                });
            }
            Err(e) => return Err(SoapError::Network(e.to_string())),
        };

        let xml_text = response
            .into_string()
            .map_err(|e| SoapError::Network(e.to_string()))?;

        parse_response(xml_text, action)
    }

    /// Subscribe to UPnP events for a service
    ///
    /// # Arguments
    /// * `event_url` - Absolute URL of the service's event subscription endpoint
    /// * `callback_url` - URL where events should be sent
    /// * `timeout_seconds` - Requested subscription timeout in seconds
    ///
    /// # Returns
    /// A `SubscriptionResponse` containing the SID and actual timeout
    pub fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse, SoapError> {
        debug!(url = event_url, callback = callback_url, "sending SUBSCRIBE");

        let response = self
            .agent
            .request("SUBSCRIBE", event_url)
            .set("USER-AGENT", &self.config.user_agent)
            .set("CALLBACK", &format!("<{callback_url}>"))
            .set("NT", "upnp:event")
            .set("TIMEOUT", &format!("Second-{timeout_seconds}"))
            .call()
            .map_err(|e| gena_error("SUBSCRIBE", e))?;

        let sid = response
            .header("SID")
            .map(str::trim)
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| {
                SoapError::protocol("Missing SID header in SUBSCRIBE response", "")
            })?
            .to_string();

        let actual_timeout_seconds = response
            .header("TIMEOUT")
            .and_then(parse_timeout_header)
            .unwrap_or(timeout_seconds);

        Ok(SubscriptionResponse {
            sid,
            timeout_seconds: actual_timeout_seconds,
        })
    }

    /// Renew an existing UPnP subscription
    ///
    /// # Returns
    /// The actual timeout granted by the device
    pub fn renew_subscription(
        &self,
        event_url: &str,
        sid: &str,
        timeout_seconds: u32,
    ) -> Result<u32, SoapError> {
        debug!(url = event_url, sid, "renewing subscription");

        let response = self
            .agent
            .request("SUBSCRIBE", event_url)
            .set("USER-AGENT", &self.config.user_agent)
            .set("SID", sid)
            .set("TIMEOUT", &format!("Second-{timeout_seconds}"))
            .call()
            .map_err(|e| gena_error("SUBSCRIBE renewal", e))?;

        Ok(response
            .header("TIMEOUT")
            .and_then(parse_timeout_header)
            .unwrap_or(timeout_seconds))
    }

    /// Cancel a UPnP subscription
    pub fn unsubscribe(&self, event_url: &str, sid: &str) -> Result<(), SoapError> {
        debug!(url = event_url, sid, "sending UNSUBSCRIBE");

        self.agent
            .request("UNSUBSCRIBE", event_url)
            .set("USER-AGENT", &self.config.user_agent)
            .set("SID", sid)
            .call()
            .map_err(|e| gena_error("UNSUBSCRIBE", e))?;

        Ok(())
    }
}

impl Default for SoapClient {
    fn default() -> Self {
        Self::new()
    }
}

fn gena_error(verb: &str, error: ureq::Error) -> SoapError {
    match error {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            SoapError::protocol(format!("{verb} failed: HTTP {code}"), body)
        }
        other => SoapError::Network(other.to_string()),
    }
}

/// Parse a GENA `TIMEOUT` header ("Second-1800"). "infinite" is not a number and yields `None`.
fn parse_timeout_header(value: &str) -> Option<u32> {
    let value = value.trim();
    let prefix = value.get(..7)?;
    if !prefix.eq_ignore_ascii_case("Second-") {
        return None;
    }
    value[7..].trim().parse::<u32>().ok()
}
