//! Device description model.
//!
//! A root description document (`urn:schemas-upnp-org:device-1-0`) is parsed
//! into an immutable tree. The root owns its devices, each device owns its
//! embedded devices, icons and services. Upward links (`parent()`, `root()`,
//! `device()`) are weak and return `None` once the tree has been dropped.

use crate::error::{DiscoveryError, Result};
use serde::Deserialize;
use std::sync::{Arc, Weak};
use url::Url;

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RootXml {
    #[serde(rename = "specVersion", default)]
    spec_version: Option<SpecVersion>,
    #[serde(rename = "URLBase", default)]
    url_base: Option<String>,
    device: DeviceXml,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceXml {
    device_type: String,
    friendly_name: Option<String>,
    manufacturer: Option<String>,
    #[serde(rename = "manufacturerURL")]
    manufacturer_url: Option<String>,
    model_description: Option<String>,
    model_name: Option<String>,
    model_number: Option<String>,
    #[serde(rename = "modelURL")]
    model_url: Option<String>,
    serial_number: Option<String>,
    #[serde(rename = "UDN")]
    udn: String,
    #[serde(rename = "UPC")]
    upc: Option<String>,
    #[serde(rename = "presentationURL")]
    presentation_url: Option<String>,
    icon_list: Option<IconListXml>,
    service_list: Option<ServiceListXml>,
    device_list: Option<DeviceListXml>,
}

#[derive(Debug, Deserialize)]
struct IconListXml {
    #[serde(rename = "icon", default)]
    icons: Vec<IconXml>,
}

#[derive(Debug, Deserialize)]
struct IconXml {
    mimetype: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    depth: Option<u32>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ServiceListXml {
    #[serde(rename = "service", default)]
    services: Vec<ServiceXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceXml {
    service_type: String,
    service_id: String,
    #[serde(rename = "SCPDURL", default)]
    scpd_url: String,
    #[serde(rename = "controlURL", default)]
    control_url: String,
    #[serde(rename = "eventSubURL", default)]
    event_sub_url: String,
}

#[derive(Debug, Deserialize)]
struct DeviceListXml {
    #[serde(rename = "device", default)]
    devices: Vec<DeviceXml>,
}

// ---------------------------------------------------------------------------
// Public model
// ---------------------------------------------------------------------------

/// UPnP architecture version declared by the description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct SpecVersion {
    #[serde(default)]
    pub major: u32,
    #[serde(default)]
    pub minor: u32,
}

#[derive(Debug)]
struct RootInner {
    location: String,
    base_url: Url,
    spec_version: SpecVersion,
    device: Arc<Device>,
    http: reqwest::blocking::Client,
}

/// Root of a device description tree.
///
/// Cloning is cheap; all clones share the same tree and HTTP client.
#[derive(Debug, Clone)]
pub struct RootDevice {
    inner: Arc<RootInner>,
}

/// A device or embedded device.
#[derive(Debug)]
pub struct Device {
    pub device_type: String,
    pub friendly_name: Option<String>,
    pub manufacturer: Option<String>,
    pub manufacturer_url: Option<String>,
    pub model_description: Option<String>,
    pub model_name: Option<String>,
    pub model_number: Option<String>,
    pub model_url: Option<String>,
    pub serial_number: Option<String>,
    pub udn: String,
    pub upc: Option<String>,
    pub presentation_url: Option<String>,
    pub devices: Vec<Arc<Device>>,
    pub icons: Vec<Icon>,
    pub services: Vec<Service>,
    parent: Weak<Device>,
    root: Weak<RootInner>,
}

/// A service offered by a device. URLs are kept exactly as advertised; use
/// the `*_endpoint` resolvers for absolute URLs.
#[derive(Debug, Clone)]
pub struct Service {
    pub service_type: String,
    pub service_id: String,
    pub control_url: String,
    pub event_sub_url: String,
    pub scpd_url: String,
    device: Weak<Device>,
    root: Weak<RootInner>,
}

#[derive(Debug, Clone)]
pub struct Icon {
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub depth: Option<u32>,
    pub url: String,
    device: Weak<Device>,
    root: Weak<RootInner>,
}

impl RootDevice {
    /// Fetch the description at `location` and build the tree.
    ///
    /// # Errors
    ///
    /// `NetworkError` if the request fails or the status is not a success,
    /// `ParseError` if the document cannot be understood.
    pub fn fetch(location: &str, http: &reqwest::blocking::Client) -> Result<Self> {
        let response = http
            .get(location)
            .send()
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to fetch device description: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::NetworkError(format!(
                "Device description at {} returned HTTP {}",
                location, status
            )));
        }

        let xml = response
            .text()
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to read response body: {}", e)))?;

        Self::from_xml(location, &xml, http.clone())
    }

    /// Build the tree from an already retrieved description document.
    pub fn from_xml(location: &str, xml: &str, http: reqwest::blocking::Client) -> Result<Self> {
        let root: RootXml = quick_xml::de::from_str(xml)
            .map_err(|e| DiscoveryError::ParseError(format!("Failed to parse device XML: {}", e)))?;

        let location_url = Url::parse(location)
            .map_err(|e| DiscoveryError::ParseError(format!("Invalid location {}: {}", location, e)))?;

        let base_url = match root.url_base.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            Some(base) => Url::parse(base).unwrap_or_else(|e| {
                tracing::debug!("ignoring unusable URLBase {}: {}", base, e);
                location_url.clone()
            }),
            None => location_url,
        };

        let RootXml { spec_version, device, .. } = root;
        let inner = Arc::new_cyclic(|root_ref: &Weak<RootInner>| RootInner {
            location: location.to_string(),
            base_url,
            spec_version: spec_version.unwrap_or_default(),
            device: build_device(device, Weak::new(), root_ref),
            http,
        });

        Ok(Self { inner })
    }

    /// URL the description was fetched from
    pub fn location(&self) -> &str {
        &self.inner.location
    }

    /// `URLBase` if the description declared one, otherwise the location
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn spec_version(&self) -> SpecVersion {
        self.inner.spec_version
    }

    /// The top-level device
    pub fn device(&self) -> &Arc<Device> {
        &self.inner.device
    }

    /// Client used to fetch this description, reusable for its SCPDs and icons
    pub fn http_client(&self) -> &reqwest::blocking::Client {
        &self.inner.http
    }

    /// All devices in depth-first pre-order, starting with the root device
    pub fn devices(&self) -> Vec<Arc<Device>> {
        let mut out = Vec::new();
        collect_devices(&self.inner.device, &mut out);
        out
    }

    /// First device (root included) whose type matches, ignoring case
    pub fn find_device(&self, device_type: &str) -> Option<Arc<Device>> {
        self.inner.device.find_device(device_type)
    }

    /// First service anywhere in the tree whose type matches, ignoring case
    pub fn find_service(&self, service_type: &str) -> Option<&Service> {
        self.inner.device.find_service(service_type)
    }

    pub fn find_service_by_id(&self, service_id: &str) -> Option<&Service> {
        self.inner.device.find_service_by_id(service_id)
    }

    /// Retrieve the service's SCPD document as text.
    pub fn fetch_scpd(&self, service: &Service) -> Result<String> {
        let url = self.resolve(&service.scpd_url)?;
        let response = self
            .inner
            .http
            .get(url)
            .send()
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to fetch SCPD: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::NetworkError(format!("SCPD request returned HTTP {}", status)));
        }
        response
            .text()
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to read SCPD body: {}", e)))
    }

    /// Resolve a URL from the description against the base URL
    pub fn resolve(&self, relative: &str) -> Result<Url> {
        resolve_against(&self.inner.base_url, relative)
    }
}

impl Device {
    /// Enclosing device, `None` for the root device
    pub fn parent(&self) -> Option<Arc<Device>> {
        self.parent.upgrade()
    }

    pub fn root(&self) -> Option<RootDevice> {
        self.root.upgrade().map(|inner| RootDevice { inner })
    }

    /// Search this device and its embedded devices, depth-first pre-order
    pub fn find_device(self: &Arc<Self>, device_type: &str) -> Option<Arc<Device>> {
        if self.device_type.eq_ignore_ascii_case(device_type) {
            return Some(Arc::clone(self));
        }
        self.devices.iter().find_map(|child| child.find_device(device_type))
    }

    /// Search this device's services, then each embedded device in order
    pub fn find_service(&self, service_type: &str) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| s.service_type.eq_ignore_ascii_case(service_type))
            .or_else(|| self.devices.iter().find_map(|child| child.find_service(service_type)))
    }

    pub fn find_service_by_id(&self, service_id: &str) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| s.service_id.eq_ignore_ascii_case(service_id))
            .or_else(|| self.devices.iter().find_map(|child| child.find_service_by_id(service_id)))
    }
}

impl Service {
    /// Owning device, if the tree is still alive
    pub fn device(&self) -> Option<Arc<Device>> {
        self.device.upgrade()
    }

    pub fn root(&self) -> Option<RootDevice> {
        self.root.upgrade().map(|inner| RootDevice { inner })
    }

    /// Absolute control URL
    pub fn control_endpoint(&self) -> Result<Url> {
        self.resolve(&self.control_url)
    }

    /// Absolute event subscription URL
    pub fn event_endpoint(&self) -> Result<Url> {
        self.resolve(&self.event_sub_url)
    }

    pub fn scpd_endpoint(&self) -> Result<Url> {
        self.resolve(&self.scpd_url)
    }

    fn resolve(&self, relative: &str) -> Result<Url> {
        let root = self
            .root
            .upgrade()
            .ok_or_else(|| DiscoveryError::ParseError("device description has been dropped".to_string()))?;
        resolve_against(&root.base_url, relative)
    }
}

impl Icon {
    pub fn device(&self) -> Option<Arc<Device>> {
        self.device.upgrade()
    }

    pub fn root(&self) -> Option<RootDevice> {
        self.root.upgrade().map(|inner| RootDevice { inner })
    }

    pub fn endpoint(&self) -> Result<Url> {
        let root = self
            .root
            .upgrade()
            .ok_or_else(|| DiscoveryError::ParseError("device description has been dropped".to_string()))?;
        resolve_against(&root.base_url, &self.url)
    }
}

fn build_device(xml: DeviceXml, parent: Weak<Device>, root: &Weak<RootInner>) -> Arc<Device> {
    Arc::new_cyclic(|me: &Weak<Device>| {
        let icons = xml
            .icon_list
            .map(|list| list.icons)
            .unwrap_or_default()
            .into_iter()
            .map(|icon| Icon {
                mime_type: icon.mimetype,
                width: icon.width,
                height: icon.height,
                depth: icon.depth,
                url: icon.url.trim().to_string(),
                device: me.clone(),
                root: root.clone(),
            })
            .collect();

        let services = xml
            .service_list
            .map(|list| list.services)
            .unwrap_or_default()
            .into_iter()
            .map(|service| Service {
                service_type: service.service_type.trim().to_string(),
                service_id: service.service_id.trim().to_string(),
                control_url: service.control_url.trim().to_string(),
                event_sub_url: service.event_sub_url.trim().to_string(),
                scpd_url: service.scpd_url.trim().to_string(),
                device: me.clone(),
                root: root.clone(),
            })
            .collect();

        let devices = xml
            .device_list
            .map(|list| list.devices)
            .unwrap_or_default()
            .into_iter()
            .map(|child| build_device(child, me.clone(), root))
            .collect();

        Device {
            device_type: xml.device_type.trim().to_string(),
            friendly_name: xml.friendly_name,
            manufacturer: xml.manufacturer,
            manufacturer_url: xml.manufacturer_url,
            model_description: xml.model_description,
            model_name: xml.model_name,
            model_number: xml.model_number,
            model_url: xml.model_url,
            serial_number: xml.serial_number,
            udn: xml.udn.trim().to_string(),
            upc: xml.upc,
            presentation_url: xml.presentation_url,
            devices,
            icons,
            services,
            parent,
            root: root.clone(),
        }
    })
}

fn collect_devices(device: &Arc<Device>, out: &mut Vec<Arc<Device>>) {
    out.push(Arc::clone(device));
    for child in &device.devices {
        collect_devices(child, out);
    }
}

fn resolve_against(base: &Url, relative: &str) -> Result<Url> {
    base.join(relative)
        .map_err(|e| DiscoveryError::ParseError(format!("Cannot resolve {} against {}: {}", relative, base, e)))
}
