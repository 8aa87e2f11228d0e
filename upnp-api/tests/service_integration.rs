//! Service-level tests: endpoints come from a description tree whose
//! location points at a mock device.

use mockito::{Matcher, Server, ServerGuard};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use upnp_api::facets::{
    AvTransport, ConnectionManager, PortMapping, PortMappingProtocol, RenderingControl, SeekTarget,
    TransportState, WanIpConnection, MASTER_CHANNEL,
};
use upnp_api::{ActionArgument, ApiError, RootDevice, UpnpClient};

const WAN_IP: &str = "urn:schemas-upnp-org:service:WANIPConnection:1";
const WAN_PPP: &str = "urn:schemas-upnp-org:service:WANPPPConnection:1";
const AVT: &str = "urn:schemas-upnp-org:service:AVTransport:1";
const RCS: &str = "urn:schemas-upnp-org:service:RenderingControl:1";
const CMS: &str = "urn:schemas-upnp-org:service:ConnectionManager:1";

const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Living Room</friendlyName>
    <UDN>uuid:renderer-1</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
        <SCPDURL>/avt.xml</SCPDURL>
        <controlURL>/ctl/avt</controlURL>
        <eventSubURL>/evt/avt</eventSubURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:RenderingControl</serviceId>
        <SCPDURL>/rcs.xml</SCPDURL>
        <controlURL>ctl/rcs</controlURL>
        <eventSubURL>evt/rcs</eventSubURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ConnectionManager:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:ConnectionManager</serviceId>
        <SCPDURL>/cms.xml</SCPDURL>
        <controlURL>/ctl/cms</controlURL>
        <eventSubURL>/evt/cms</eventSubURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:WANConnectionDevice:1</deviceType>
        <UDN>uuid:wan-1</UDN>
        <serviceList>
          <service>
            <serviceType>urn:schemas-upnp-org:service:WANIPConnection:1</serviceType>
            <serviceId>urn:upnp-org:serviceId:WANIPConn1</serviceId>
            <SCPDURL>/wanip.xml</SCPDURL>
            <controlURL>/ctl/wanip</controlURL>
            <eventSubURL>/evt/wanip</eventSubURL>
          </service>
          <service>
            <serviceType>urn:schemas-upnp-org:service:WANPPPConnection:1</serviceType>
            <serviceId>urn:upnp-org:serviceId:WANPPPConn1</serviceId>
            <SCPDURL>/wanppp.xml</SCPDURL>
            <controlURL>/ctl/wanppp</controlURL>
            <eventSubURL>/evt/wanppp</eventSubURL>
          </service>
        </serviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

fn device(server: &ServerGuard) -> RootDevice {
    let location = format!("{}/dev/desc.xml", server.url());
    RootDevice::from_xml(&location, DESCRIPTION, reqwest::blocking::Client::new())
        .expect("description should parse")
}

fn ok_envelope(service_type: &str, action: &str, inner: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
  <s:Body><u:{action}Response xmlns:u="{service_type}">{inner}</u:{action}Response></s:Body>
</s:Envelope>"#
    )
}

fn fault_envelope(code: u16, description: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
  <s:Body>
    <s:Fault>
      <faultcode>s:Client</faultcode>
      <faultstring>UPnPError</faultstring>
      <detail>
        <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
          <errorCode>{code}</errorCode>
          <errorDescription>{description}</errorDescription>
        </UPnPError>
      </detail>
    </s:Fault>
  </s:Body>
</s:Envelope>"#
    )
}

#[test]
fn test_post_action_resolves_control_url() {
    let mut server = Server::new();
    let root = device(&server);
    let service = root.find_service(WAN_IP).unwrap();

    let mock = server
        .mock("POST", "/ctl/wanip")
        .match_header("soapaction", format!("\"{WAN_IP}#AddPortMapping\"").as_str())
        .match_body(Matcher::Regex(
            "<NewProtocol>TCP</NewProtocol><NewExternalPort>4788</NewExternalPort>".to_string(),
        ))
        .with_status(200)
        .with_body(ok_envelope(WAN_IP, "AddPortMapping", ""))
        .create();

    let client = UpnpClient::new();
    let args = [
        ActionArgument::new("NewProtocol", "TCP"),
        ActionArgument::new("NewExternalPort", "4788"),
    ];
    client.post_action(service, "AddPortMapping", &args).unwrap();
    mock.assert();
}

#[test]
fn test_relative_control_url_resolves_against_location() {
    let mut server = Server::new();
    let root = device(&server);
    let service = root.find_service(RCS).unwrap();

    let mock = server
        .mock("POST", "/dev/ctl/rcs")
        .with_status(200)
        .with_body(ok_envelope(RCS, "GetVolume", "<CurrentVolume>42</CurrentVolume>"))
        .create();

    let client = UpnpClient::new();
    let rendering = RenderingControl::try_from_service(&client, service).unwrap();
    assert_eq!(rendering.get_volume(0, MASTER_CHANNEL).unwrap(), 42);
    mock.assert();
}

#[test]
fn test_facet_conversion_checks_service_type() {
    let server = Server::new();
    let root = device(&server);
    let client = UpnpClient::new();

    let wan_ip = root.find_service(WAN_IP).unwrap();
    let wan_ppp = root.find_service(WAN_PPP).unwrap();
    let avt = root.find_service(AVT).unwrap();

    assert!(WanIpConnection::try_from_service(&client, wan_ip).is_ok());
    assert!(WanIpConnection::try_from_service(&client, wan_ppp).is_ok());
    assert!(AvTransport::try_from_service(&client, avt).is_ok());

    match WanIpConnection::try_from_service(&client, avt) {
        Err(ApiError::UnsupportedService { expected, found }) => {
            assert_eq!(expected, "WANIPConnection or WANPPPConnection");
            assert_eq!(found, AVT);
        }
        other => panic!("expected UnsupportedService, got {other:?}"),
    }
    assert!(matches!(
        RenderingControl::try_from_service(&client, avt),
        Err(ApiError::UnsupportedService { .. })
    ));
    assert!(matches!(
        ConnectionManager::try_from_service(&client, wan_ip),
        Err(ApiError::UnsupportedService { .. })
    ));
}

#[test]
fn test_wan_ip_connection_actions() {
    let mut server = Server::new();
    let root = device(&server);
    let client = UpnpClient::new();
    let wan = WanIpConnection::try_from_service(&client, root.find_service(WAN_PPP).unwrap()).unwrap();

    let external = server
        .mock("POST", "/ctl/wanppp")
        .match_header("soapaction", format!("\"{WAN_PPP}#GetExternalIPAddress\"").as_str())
        .with_status(200)
        .with_body(ok_envelope(
            WAN_PPP,
            "GetExternalIPAddress",
            "<NewExternalIPAddress>198.51.100.4</NewExternalIPAddress>",
        ))
        .create();
    assert_eq!(
        wan.get_external_ip_address().unwrap(),
        Some(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 4)))
    );
    external.assert();

    let add = server
        .mock("POST", "/ctl/wanppp")
        .match_header("soapaction", format!("\"{WAN_PPP}#AddPortMapping\"").as_str())
        .match_body(Matcher::Regex(
            "<NewRemoteHost></NewRemoteHost><NewExternalPort>4788</NewExternalPort>\
             <NewProtocol>UDP</NewProtocol><NewInternalPort>4788</NewInternalPort>\
             <NewInternalClient>192.168.1.20</NewInternalClient><NewEnabled>1</NewEnabled>\
             <NewPortMappingDescription>a &amp; b</NewPortMappingDescription>\
             <NewLeaseDuration>0</NewLeaseDuration>"
                .to_string(),
        ))
        .with_status(200)
        .with_body(ok_envelope(WAN_PPP, "AddPortMapping", ""))
        .create();
    let mapping = PortMapping::new(PortMappingProtocol::Udp, 4788, "192.168.1.20").with_description("a & b");
    wan.add_port_mapping(&mapping).unwrap();
    add.assert();
}

#[test]
fn test_port_mapping_table_walk_stops_at_invalid_index() {
    let mut server = Server::new();
    let root = device(&server);
    let client = UpnpClient::new();
    let wan = WanIpConnection::try_from_service(&client, root.find_service(WAN_IP).unwrap()).unwrap();

    let entry = server
        .mock("POST", "/ctl/wanip")
        .match_body(Matcher::Regex("<NewPortMappingIndex>0</NewPortMappingIndex>".to_string()))
        .with_status(200)
        .with_body(ok_envelope(
            WAN_IP,
            "GetGenericPortMappingEntry",
            "<NewRemoteHost></NewRemoteHost><NewExternalPort>8080</NewExternalPort>\
             <NewProtocol>TCP</NewProtocol><NewInternalPort>80</NewInternalPort>\
             <NewInternalClient>192.168.1.5</NewInternalClient><NewEnabled>1</NewEnabled>\
             <NewPortMappingDescription>web</NewPortMappingDescription>\
             <NewLeaseDuration>0</NewLeaseDuration>",
        ))
        .create();
    let end = server
        .mock("POST", "/ctl/wanip")
        .match_body(Matcher::Regex("<NewPortMappingIndex>1</NewPortMappingIndex>".to_string()))
        .with_status(500)
        .with_body(fault_envelope(713, "SpecifiedArrayIndexInvalid"))
        .create();

    let mappings = wan.port_mappings().unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].external_port, 8080);
    assert_eq!(mappings[0].internal_port, 80);
    assert_eq!(mappings[0].description, "web");
    entry.assert();
    end.assert();
}

#[test]
fn test_fault_surfaces_code() {
    let mut server = Server::new();
    let root = device(&server);
    let client = UpnpClient::new();
    let wan = WanIpConnection::try_from_service(&client, root.find_service(WAN_IP).unwrap()).unwrap();

    let _mock = server
        .mock("POST", "/ctl/wanip")
        .with_status(500)
        .with_body(fault_envelope(718, "ConflictInMappingEntry"))
        .create();

    let err = wan
        .add_port_mapping(&PortMapping::new(PortMappingProtocol::Tcp, 22, "192.168.1.9"))
        .unwrap_err();
    assert_eq!(err.fault_code(), Some(718));
    assert!(err.is_protocol_error());
    assert!(err.body().unwrap().contains("<errorCode>718</errorCode>"));
}

#[test]
fn test_av_transport_actions() {
    let mut server = Server::new();
    let root = device(&server);
    let client = UpnpClient::new();
    let avt = AvTransport::try_from_service(&client, root.find_service(AVT).unwrap()).unwrap();

    let set_uri = server
        .mock("POST", "/ctl/avt")
        .match_header("soapaction", format!("\"{AVT}#SetAVTransportURI\"").as_str())
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("<InstanceID>0</InstanceID><CurrentURI>http://10.0.0.2:3400/media/x.mp3</CurrentURI>".to_string()),
            Matcher::Regex("<CurrentURIMetaData>&lt;DIDL-Lite/&gt;</CurrentURIMetaData>".to_string()),
        ]))
        .with_status(200)
        .with_body(ok_envelope(AVT, "SetAVTransportURI", ""))
        .create();
    avt.set_av_transport_uri(0, "http://10.0.0.2:3400/media/x.mp3", "<DIDL-Lite/>")
        .unwrap();
    set_uri.assert();

    let seek = server
        .mock("POST", "/ctl/avt")
        .match_header("soapaction", format!("\"{AVT}#Seek\"").as_str())
        .match_body(Matcher::Regex("<Unit>REL_TIME</Unit><Target>0:01:35</Target>".to_string()))
        .with_status(200)
        .with_body(ok_envelope(AVT, "Seek", ""))
        .create();
    avt.seek(0, SeekTarget::RelTime(Duration::from_secs(95))).unwrap();
    seek.assert();

    let info = server
        .mock("POST", "/ctl/avt")
        .match_header("soapaction", format!("\"{AVT}#GetTransportInfo\"").as_str())
        .with_status(200)
        .with_body(ok_envelope(
            AVT,
            "GetTransportInfo",
            "<CurrentTransportState>PAUSED_PLAYBACK</CurrentTransportState>\
             <CurrentTransportStatus>OK</CurrentTransportStatus><CurrentSpeed>1</CurrentSpeed>",
        ))
        .create();
    let transport = avt.get_transport_info(0).unwrap();
    assert_eq!(transport.state, TransportState::PausedPlayback);
    assert_eq!(transport.status, "OK");
    info.assert();

    let position = server
        .mock("POST", "/ctl/avt")
        .match_header("soapaction", format!("\"{AVT}#GetPositionInfo\"").as_str())
        .with_status(200)
        .with_body(ok_envelope(
            AVT,
            "GetPositionInfo",
            "<Track>1</Track><TrackDuration>0:03:21</TrackDuration>\
             <TrackMetaData>NOT_IMPLEMENTED</TrackMetaData><TrackURI>http://x/y.mp3</TrackURI>\
             <RelTime>0:00:42</RelTime><AbsTime>NOT_IMPLEMENTED</AbsTime>\
             <RelCount>2147483647</RelCount><AbsCount>2147483647</AbsCount>",
        ))
        .create();
    let info = avt.get_position_info(0).unwrap();
    assert_eq!(info.track, 1);
    assert_eq!(info.track_duration, Some(Duration::from_secs(201)));
    assert_eq!(info.rel_time, Some(Duration::from_secs(42)));
    assert_eq!(info.abs_time, None);
    assert_eq!(info.track_metadata, "");
    position.assert();

    assert!(matches!(
        avt.set_av_transport_uri(0, "  ", ""),
        Err(ApiError::InvalidParameter(_))
    ));
}

#[test]
fn test_rendering_control_mute() {
    let mut server = Server::new();
    let root = device(&server);
    let client = UpnpClient::new();
    let rendering = RenderingControl::try_from_service(&client, root.find_service(RCS).unwrap()).unwrap();

    let set = server
        .mock("POST", "/dev/ctl/rcs")
        .match_body(Matcher::Regex(
            "<InstanceID>0</InstanceID><Channel>Master</Channel><DesiredMute>1</DesiredMute>".to_string(),
        ))
        .with_status(200)
        .with_body(ok_envelope(RCS, "SetMute", ""))
        .create();
    rendering.set_mute(0, MASTER_CHANNEL, true).unwrap();
    set.assert();

    let get = server
        .mock("POST", "/dev/ctl/rcs")
        .match_header("soapaction", format!("\"{RCS}#GetMute\"").as_str())
        .with_status(200)
        .with_body(ok_envelope(RCS, "GetMute", "<CurrentMute>1</CurrentMute>"))
        .create();
    assert!(rendering.get_mute(0, MASTER_CHANNEL).unwrap());
    get.assert();
}

#[test]
fn test_missing_output_argument() {
    let mut server = Server::new();
    let root = device(&server);
    let client = UpnpClient::new();
    let rendering = RenderingControl::try_from_service(&client, root.find_service(RCS).unwrap()).unwrap();

    let _mock = server
        .mock("POST", "/dev/ctl/rcs")
        .with_status(200)
        .with_body(ok_envelope(RCS, "GetVolume", ""))
        .create();

    assert!(matches!(
        rendering.get_volume(0, MASTER_CHANNEL),
        Err(ApiError::InvalidResponse(_))
    ));
}

#[test]
fn test_connection_manager_protocol_info() {
    let mut server = Server::new();
    let root = device(&server);
    let client = UpnpClient::new();
    let cms = ConnectionManager::try_from_service(&client, root.find_service(CMS).unwrap()).unwrap();

    let _mock = server
        .mock("POST", "/ctl/cms")
        .match_header("soapaction", format!("\"{CMS}#GetProtocolInfo\"").as_str())
        .with_status(200)
        .with_body(ok_envelope(
            CMS,
            "GetProtocolInfo",
            "<Source></Source><Sink>http-get:*:audio/mpeg:*,http-get:*:audio/flac:*</Sink>",
        ))
        .create();

    let info = cms.get_protocol_info().unwrap();
    assert!(info.source.is_empty());
    assert_eq!(info.sink.len(), 2);
    assert!(info.sink_supports("audio/flac"));
}

#[test]
fn test_subscription_lifecycle() {
    let mut server = Server::new();
    let root = device(&server);
    let service = root.find_service(AVT).unwrap();
    let client = UpnpClient::new();

    let subscribe = server
        .mock("SUBSCRIBE", "/evt/avt")
        .match_header("nt", "upnp:event")
        .match_header("callback", "<http://10.0.0.2:3400/events/avt>")
        .match_header("timeout", "Second-300")
        .with_status(200)
        .with_header("SID", "uuid:sub-42")
        .with_header("TIMEOUT", "Second-180")
        .create();
    let response = client
        .subscribe(service, "http://10.0.0.2:3400/events/avt", 300)
        .unwrap();
    assert_eq!(response.sid, "uuid:sub-42");
    assert_eq!(response.timeout_seconds, 180);
    subscribe.assert();

    let renew = server
        .mock("SUBSCRIBE", "/evt/avt")
        .match_header("sid", "uuid:sub-42")
        .match_header("nt", Matcher::Missing)
        .match_header("callback", Matcher::Missing)
        .with_status(200)
        .with_header("SID", "uuid:sub-42")
        .with_header("TIMEOUT", "Second-300")
        .create();
    assert_eq!(client.renew(service, "uuid:sub-42", 300).unwrap(), 300);
    renew.assert();

    let unsubscribe = server
        .mock("UNSUBSCRIBE", "/evt/avt")
        .match_header("sid", "uuid:sub-42")
        .with_status(200)
        .create();
    client.unsubscribe(service, "uuid:sub-42").unwrap();
    unsubscribe.assert();
}

#[test]
fn test_service_outliving_its_tree() {
    let server = Server::new();
    let service = device(&server).find_service(AVT).cloned().unwrap();

    let err = UpnpClient::new()
        .post_action(&service, "Play", &[])
        .unwrap_err();
    assert!(matches!(err, ApiError::Description(_)));
}
