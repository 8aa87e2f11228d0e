//! # upnp-parser
//!
//! Parsing of the event payloads a UPnP device pushes to a control point.
//!
//! A GENA NOTIFY body is an `e:propertyset` of evented state variables. Most
//! AV services wrap all of their changes into one `LastChange` variable holding
//! an escaped `<Event>` document; [`parse_notification`] decodes both layers.
//!
//! ```rust
//! use upnp_parser::parse_last_change;
//!
//! let body = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
//!   <e:property><LastChange>&lt;Event&gt;&lt;InstanceID val=&quot;0&quot;&gt;&lt;TransportState val=&quot;PLAYING&quot;/&gt;&lt;/InstanceID&gt;&lt;/Event&gt;</LastChange></e:property>
//! </e:propertyset>"#;
//!
//! let instances = parse_last_change(body).unwrap();
//! assert_eq!(instances[0].property("TransportState").unwrap().value(), Some("PLAYING"));
//! ```

pub mod error;
pub mod last_change;
pub mod property_set;
pub mod xml_decode;

pub use error::{ParseError, ParseResult};
pub use last_change::{
    parse_event_document, parse_last_change, parse_notification, ChangeInstance,
    ChangeProperty, Notification,
};
pub use property_set::{parse_property_set, Property, PropertySet};
