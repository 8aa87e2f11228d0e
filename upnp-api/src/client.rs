use soap_client::{ActionArgument, ActionResponse, SoapClient, SoapClientConfig, SubscriptionResponse};
use tracing::debug;
use upnp_discovery::Service;

use crate::Result;

/// Invokes actions and manages event subscriptions on discovered services.
///
/// Endpoints are resolved from the description tree the [`Service`] belongs
/// to, so a service whose tree has been dropped can no longer be used.
///
/// ```rust,no_run
/// use upnp_api::UpnpClient;
///
/// let client = UpnpClient::new();
/// for root in upnp_api::upnp_discovery::get() {
///     if let Some(service) = root.find_service("urn:schemas-upnp-org:service:WANIPConnection:1") {
///         let response = client.post_action(service, "GetExternalIPAddress", &[])?;
///         println!("{:?}", response.get("NewExternalIPAddress"));
///     }
/// }
/// # Ok::<(), upnp_api::ApiError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct UpnpClient {
    soap_client: SoapClient,
}

impl UpnpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SoapClientConfig) -> Self {
        Self::with_soap_client(SoapClient::with_config(config))
    }

    /// Create a client around an existing SOAP client
    pub fn with_soap_client(soap_client: SoapClient) -> Self {
        Self { soap_client }
    }

    pub fn soap_client(&self) -> &SoapClient {
        &self.soap_client
    }

    /// Invoke `action` on `service`, sending `arguments` in the given order.
    pub fn post_action(
        &self,
        service: &Service,
        action: &str,
        arguments: &[ActionArgument],
    ) -> Result<ActionResponse> {
        let control_url = service.control_endpoint()?;
        debug!(service = %service.service_type, action, "posting action");

        Ok(self
            .soap_client
            .call(control_url.as_str(), &service.service_type, action, arguments)?)
    }

    /// Subscribe `callback_url` to the service's events for `timeout_seconds`.
    ///
    /// The lease is not renewed automatically; call [`renew`](Self::renew)
    /// before `timeout_seconds` of the response runs out.
    pub fn subscribe(
        &self,
        service: &Service,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse> {
        let event_url = service.event_endpoint()?;
        let response = self
            .soap_client
            .subscribe(event_url.as_str(), callback_url, timeout_seconds)?;

        debug!(
            service = %service.service_type,
            sid = %response.sid,
            timeout = response.timeout_seconds,
            "subscribed"
        );
        Ok(response)
    }

    /// Extend the lease of `sid`; returns the timeout granted by the device
    pub fn renew(&self, service: &Service, sid: &str, timeout_seconds: u32) -> Result<u32> {
        let event_url = service.event_endpoint()?;
        Ok(self
            .soap_client
            .renew_subscription(event_url.as_str(), sid, timeout_seconds)?)
    }

    pub fn unsubscribe(&self, service: &Service, sid: &str) -> Result<()> {
        let event_url = service.event_endpoint()?;
        Ok(self.soap_client.unsubscribe(event_url.as_str(), sid)?)
    }
}
