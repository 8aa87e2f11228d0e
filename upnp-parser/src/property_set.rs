//! GENA `e:propertyset` parsing.

use crate::error::{ParseError, ParseResult};
use crate::xml_decode::local_name;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;

/// One evented state variable from a property set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    /// State variable name (local name of the element)
    pub name: String,
    /// Text content with XML escaping removed
    pub value: String,
    /// Text content exactly as it appeared in the document
    #[serde(skip)]
    pub raw: String,
}

/// Decoded body of a GENA NOTIFY request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropertySet {
    pub properties: Vec<Property>,
}

impl PropertySet {
    /// First property with the given name
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Parse a NOTIFY body into its properties, in document order.
///
/// Markup nested directly inside a property value (unescaped XML) is kept out
/// of the value; only character data is collected.
pub fn parse_property_set(xml: &str) -> ParseResult<PropertySet> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut saw_root = false;
    let mut in_property = false;
    let mut current: Option<Property> = None;
    let mut nested_depth = 0usize;
    let mut properties = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = local_name(e.name().as_ref())?;
                if current.is_some() {
                    nested_depth += 1;
                } else if in_property {
                    current = Some(Property {
                        name,
                        value: String::new(),
                        raw: String::new(),
                    });
                } else if name == "property" {
                    in_property = true;
                } else if name == "propertyset" {
                    saw_root = true;
                }
            }
            Event::Empty(e) => {
                if in_property && current.is_none() {
                    properties.push(Property {
                        name: local_name(e.name().as_ref())?,
                        value: String::new(),
                        raw: String::new(),
                    });
                } else if !in_property && local_name(e.name().as_ref())? == "propertyset" {
                    saw_root = true;
                }
            }
            Event::Text(t) => {
                if let Some(property) = current.as_mut() {
                    if nested_depth == 0 {
                        let raw = std::str::from_utf8(&t).map_err(|e| {
                            ParseError::InvalidXmlStructure(format!("non UTF-8 text: {e}"))
                        })?;
                        property.raw.push_str(raw);
                        property.value.push_str(&t.unescape()?);
                    }
                }
            }
            Event::CData(c) => {
                if let Some(property) = current.as_mut() {
                    let text = String::from_utf8(c.into_inner().into_owned()).map_err(|e| {
                        ParseError::InvalidXmlStructure(format!("non UTF-8 CDATA: {e}"))
                    })?;
                    property.raw.push_str(&text);
                    property.value.push_str(&text);
                }
            }
            Event::End(e) => {
                if current.is_some() {
                    if nested_depth > 0 {
                        nested_depth -= 1;
                    } else if let Some(property) = current.take() {
                        properties.push(property);
                    }
                } else if local_name(e.name().as_ref())? == "property" {
                    in_property = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(ParseError::MissingRequiredElement("propertyset".to_string()));
    }
    if current.is_some() || in_property {
        return Err(ParseError::InvalidXmlStructure(
            "property set ended inside a property".to_string(),
        ));
    }

    Ok(PropertySet { properties })
}
