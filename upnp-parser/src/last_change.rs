//! LastChange event decoding.
//!
//! AVTransport, RenderingControl and friends do not event their state variables
//! directly. They send a single `LastChange` property whose text is an escaped
//! `<Event>` document grouping changes per instance:
//!
//! ```xml
//! <Event xmlns="urn:schemas-upnp-org:metadata-1-0/RCS/">
//!   <InstanceID val="0">
//!     <Volume channel="Master" val="24"/>
//!     <Mute channel="Master" val="0"/>
//!   </InstanceID>
//! </Event>
//! ```

use crate::error::{ParseError, ParseResult};
use crate::property_set::{parse_property_set, PropertySet};
use crate::xml_decode::{collect_attributes, local_name, unescape_entities};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::collections::BTreeMap;

/// A single changed property inside an instance, with all of its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeProperty {
    /// Local element name, e.g. "Volume"
    pub name: String,
    /// Every attribute on the element, e.g. `channel` and `val`
    pub attributes: BTreeMap<String, String>,
}

impl ChangeProperty {
    /// The `val` attribute
    ///
    /// Attribute escaping inside the `<Event>` document is removed exactly
    /// once. Devices that escape metadata twice, sending
    /// `val="&amp;lt;DIDL-Lite…"`, yield `&lt;DIDL-Lite…` here; callers that
    /// read DIDL-Lite metadata must unescape such values themselves.
    pub fn value(&self) -> Option<&str> {
        self.attribute("val")
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// All property changes reported for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeInstance {
    pub instance_id: u32,
    pub properties: Vec<ChangeProperty>,
}

impl ChangeInstance {
    /// First property with the given name
    pub fn property(&self, name: &str) -> Option<&ChangeProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// All properties with the given name (one per channel, for instance)
    pub fn properties_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a ChangeProperty> + 'a {
        self.properties.iter().filter(move |p| p.name == name)
    }
}

/// A fully decoded NOTIFY body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// The outer property set
    pub properties: PropertySet,
    /// Decoded `LastChange` instances, empty when the service does not use LastChange
    pub instances: Vec<ChangeInstance>,
}

/// Decode a NOTIFY body: the property set, plus the LastChange document if present.
pub fn parse_notification(body: &str) -> ParseResult<Notification> {
    let properties = parse_property_set(body)?;
    let instances = match properties.get("LastChange") {
        Some(last_change) => parse_event_document(&unescape_entities(&last_change.raw))?,
        None => Vec::new(),
    };
    Ok(Notification {
        properties,
        instances,
    })
}

/// Decode the LastChange property of a NOTIFY body into its instances.
///
/// # Errors
///
/// `MissingRequiredElement` when the body carries no LastChange property, and
/// any structural error of the outer or embedded document.
pub fn parse_last_change(body: &str) -> ParseResult<Vec<ChangeInstance>> {
    let properties = parse_property_set(body)?;
    let last_change = properties
        .get("LastChange")
        .ok_or_else(|| ParseError::MissingRequiredElement("LastChange".to_string()))?;
    parse_event_document(&unescape_entities(&last_change.raw))
}

/// Parse an already unescaped `<Event>` document.
pub fn parse_event_document(xml: &str) -> ParseResult<Vec<ChangeInstance>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut depth = 0usize;
    let mut saw_root = false;
    let mut current: Option<ChangeInstance> = None;
    let mut instances = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                match depth {
                    1 => saw_root = expect_event_root(&e)?,
                    2 => current = instance_start(&e)?,
                    3 => {
                        if let Some(instance) = current.as_mut() {
                            instance.properties.push(change_property(&e)?);
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => match depth {
                0 => saw_root = expect_event_root(&e)?,
                1 => {
                    if let Some(instance) = instance_start(&e)? {
                        instances.push(instance);
                    }
                }
                2 => {
                    if let Some(instance) = current.as_mut() {
                        instance.properties.push(change_property(&e)?);
                    }
                }
                _ => {}
            },
            Event::End(_) => {
                if depth == 2 {
                    if let Some(instance) = current.take() {
                        instances.push(instance);
                    }
                }
                depth = depth.checked_sub(1).ok_or_else(|| {
                    ParseError::InvalidXmlStructure("unbalanced end tag".to_string())
                })?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(ParseError::MissingRequiredElement("Event".to_string()));
    }
    if depth != 0 {
        return Err(ParseError::InvalidXmlStructure(
            "event document ended with unclosed elements".to_string(),
        ));
    }

    Ok(instances)
}

fn expect_event_root(e: &BytesStart<'_>) -> ParseResult<bool> {
    let name = local_name(e.name().as_ref())?;
    if name == "Event" {
        Ok(true)
    } else {
        Err(ParseError::InvalidXmlStructure(format!(
            "expected Event root element, found {name}"
        )))
    }
}

/// `Some` for an `InstanceID` element, `None` for any other element at that level.
fn instance_start(e: &BytesStart<'_>) -> ParseResult<Option<ChangeInstance>> {
    if local_name(e.name().as_ref())? != "InstanceID" {
        return Ok(None);
    }
    let attributes = collect_attributes(e.attributes())?;
    let instance_id = attributes
        .get("val")
        .and_then(|v| v.trim().parse::<u32>().ok())
        .ok_or_else(|| {
            ParseError::InvalidXmlStructure("InstanceID without a numeric val".to_string())
        })?;
    Ok(Some(ChangeInstance {
        instance_id,
        properties: Vec::new(),
    }))
}

fn change_property(e: &BytesStart<'_>) -> ParseResult<ChangeProperty> {
    Ok(ChangeProperty {
        name: local_name(e.name().as_ref())?,
        attributes: collect_attributes(e.attributes())?,
    })
}
