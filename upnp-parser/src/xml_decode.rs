//! XML decoding helpers shared by the property-set and LastChange parsers.
//!
//! UPnP devices embed whole XML documents inside the text of a GENA property,
//! escaped with character entities. Decoding happens in two stages: the outer
//! property set is read normally, then the escaped text is unescaped and parsed
//! as a document of its own.

use crate::error::{ParseError, ParseResult};
use quick_xml::events::attributes::Attributes;
use std::collections::BTreeMap;

/// Undo the entity escaping applied to an embedded document.
///
/// Only `&lt;`, `&gt;` and `&quot;` are replaced. `&amp;` is left alone so that
/// ampersands inside attribute values of the embedded document stay well-formed.
pub fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
}

/// Local part of a possibly prefixed XML name (`e:property` -> `property`).
pub fn local_name(name: &[u8]) -> ParseResult<String> {
    let local = match name.iter().position(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    };
    std::str::from_utf8(local)
        .map(str::to_string)
        .map_err(|e| ParseError::InvalidXmlStructure(format!("non UTF-8 element name: {e}")))
}

/// Collect every attribute (minus namespace declarations) into a name -> value map.
pub fn collect_attributes(attributes: Attributes<'_>) -> ParseResult<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for attribute in attributes {
        let attribute = attribute?;
        let key = attribute.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let name = local_name(key)?;
        let value = attribute.unescape_value()?.into_owned();
        map.insert(name, value);
    }
    Ok(map)
}
