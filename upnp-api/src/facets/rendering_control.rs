//! RenderingControl facet for media renderers

use soap_client::ActionArgument;
use upnp_discovery::Service;

use super::{check_service, required_bool, required_parsed};
use crate::{Result, UpnpClient};

const ACCEPTED: &[&str] = &["RenderingControl"];

/// The channel every renderer supports
pub const MASTER_CHANNEL: &str = "Master";

/// Volume and mute on a renderer's RenderingControl service
#[derive(Debug, Clone, Copy)]
pub struct RenderingControl<'a> {
    client: &'a UpnpClient,
    service: &'a Service,
}

impl<'a> RenderingControl<'a> {
    pub fn try_from_service(client: &'a UpnpClient, service: &'a Service) -> Result<Self> {
        check_service(service, ACCEPTED)?;
        Ok(Self { client, service })
    }

    pub fn service(&self) -> &'a Service {
        self.service
    }

    /// Current volume of `channel`. The range is device specific, commonly 0-100.
    pub fn get_volume(&self, instance_id: u32, channel: &str) -> Result<u16> {
        let response = self
            .client
            .post_action(self.service, "GetVolume", &channel_args(instance_id, channel))?;
        required_parsed(&response, "GetVolume", "CurrentVolume")
    }

    pub fn set_volume(&self, instance_id: u32, channel: &str, volume: u16) -> Result<()> {
        let mut args = channel_args(instance_id, channel);
        args.push(ActionArgument::new("DesiredVolume", volume.to_string()));
        self.client.post_action(self.service, "SetVolume", &args)?;
        Ok(())
    }

    pub fn get_mute(&self, instance_id: u32, channel: &str) -> Result<bool> {
        let response = self
            .client
            .post_action(self.service, "GetMute", &channel_args(instance_id, channel))?;
        required_bool(&response, "GetMute", "CurrentMute")
    }

    pub fn set_mute(&self, instance_id: u32, channel: &str, mute: bool) -> Result<()> {
        let mut args = channel_args(instance_id, channel);
        args.push(ActionArgument::new("DesiredMute", if mute { "1" } else { "0" }));
        self.client.post_action(self.service, "SetMute", &args)?;
        Ok(())
    }
}

fn channel_args(instance_id: u32, channel: &str) -> Vec<ActionArgument> {
    vec![
        ActionArgument::new("InstanceID", instance_id.to_string()),
        ActionArgument::new("Channel", channel),
    ]
}
