//! SOAP envelope construction and response extraction.

use crate::error::SoapError;
use quick_xml::escape::escape;
use xmltree::{Element, XMLNode};

/// A single `<name>value</name>` argument of a SOAP action.
///
/// Values are XML-escaped when the envelope is built. Use [`ActionArgument::raw`]
/// only for values that are already well-formed XML fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionArgument {
    name: String,
    value: String,
    raw: bool,
}

impl ActionArgument {
    /// Create an argument whose value will be escaped
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            raw: false,
        }
    }

    /// Create an argument whose value is inserted verbatim
    pub fn raw(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            raw: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        out.push('>');
        if self.raw {
            out.push_str(&self.value);
        } else {
            out.push_str(&escape(self.value.as_str()));
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl<N: Into<String>, V: Into<String>> From<(N, V)> for ActionArgument {
    fn from((name, value): (N, V)) -> Self {
        ActionArgument::new(name, value)
    }
}

/// Build the full SOAP envelope for `action` on `service_type`.
///
/// Arguments are emitted in exactly the order given.
pub fn build_envelope(service_type: &str, action: &str, arguments: &[ActionArgument]) -> String {
    let mut payload = String::new();
    for argument in arguments {
        argument.write_to(&mut payload);
    }

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">"#,
            "<s:Body>",
            r#"<u:{action} xmlns:u="{service_type}">{payload}</u:{action}>"#,
            "</s:Body>",
            "</s:Envelope>"
        ),
        action = action,
        service_type = service_type,
        payload = payload
    )
}

/// Parsed response of a successful action call.
#[derive(Debug, Clone)]
pub struct ActionResponse {
    body: String,
    element: Element,
}

impl ActionResponse {
    /// Raw response body as received from the device
    pub fn body(&self) -> &str {
        &self.body
    }

    /// The `{action}Response` element
    pub fn element(&self) -> &Element {
        &self.element
    }

    /// Text of the named output argument; `Some("")` when present but empty
    pub fn get(&self, name: &str) -> Option<String> {
        self.element
            .get_child(name)
            .map(|child| child.get_text().map(|t| t.into_owned()).unwrap_or_default())
    }

    /// All output arguments in document order
    pub fn arguments(&self) -> Vec<(String, String)> {
        self.element
            .children
            .iter()
            .filter_map(|node| match node {
                XMLNode::Element(child) => Some((
                    child.name.clone(),
                    child.get_text().map(|t| t.into_owned()).unwrap_or_default(),
                )),
                _ => None,
            })
            .collect()
    }
}

/// Parse a response body and extract `{action}Response` or the SOAP fault.
pub fn parse_response(body: String, action: &str) -> Result<ActionResponse, SoapError> {
    let xml = match Element::parse(body.as_bytes()) {
        Ok(xml) => xml,
        Err(e) => return Err(SoapError::protocol(format!("XML parsing error: {e}"), body)),
    };

    let Some(soap_body) = xml.get_child("Body") else {
        return Err(SoapError::protocol("Missing SOAP Body", body));
    };

    if let Some(fault) = soap_body.get_child("Fault") {
        let (code, description) = fault_detail(fault);
        return Err(SoapError::Fault {
            code,
            description,
            body,
        });
    }

    let response_name = format!("{action}Response");
    match soap_body.get_child(response_name.as_str()) {
        Some(element) => {
            let element = element.clone();
            Ok(ActionResponse { body, element })
        }
        None => Err(SoapError::protocol(
            format!("Missing {response_name} element"),
            body,
        )),
    }
}

/// Try to read a SOAP fault out of an error response body.
pub(crate) fn parse_fault(body: &str) -> Option<(u16, String)> {
    let xml = Element::parse(body.as_bytes()).ok()?;
    let fault = xml.get_child("Body")?.get_child("Fault")?;
    Some(fault_detail(fault))
}

fn fault_detail(fault: &Element) -> (u16, String) {
    // Some firmwares spell the detail element "UpnPError"
    let upnp_error = fault
        .get_child("detail")
        .and_then(|d| d.get_child("UPnPError").or_else(|| d.get_child("UpnPError")));

    let code = upnp_error
        .and_then(|e| e.get_child("errorCode"))
        .and_then(|c| c.get_text())
        .and_then(|t| t.trim().parse::<u16>().ok())
        .unwrap_or(500);

    let description = upnp_error
        .and_then(|e| e.get_child("errorDescription"))
        .and_then(|d| d.get_text())
        .or_else(|| fault.get_child("faultstring").and_then(|s| s.get_text()))
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    (code, description)
}
