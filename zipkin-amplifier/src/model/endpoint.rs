use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

/// The network context of a node in the service graph.
#[derive(TypedBuilder, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Lower-case service name.
    #[builder(setter(strip_option, into), default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// IPv4 address of the host.
    #[builder(setter(strip_option), default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4Addr>,
    /// IPv6 address of the host.
    #[builder(setter(strip_option), default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<Ipv6Addr>,
    /// Listen port or client-side port.
    #[builder(setter(strip_option), default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Endpoint {
    /// Creates an endpoint for `service_name`, optionally bound to an address.
    pub fn new(service_name: String, socket_addr: Option<SocketAddr>) -> Self {
        match socket_addr {
            Some(SocketAddr::V4(v4)) => Endpoint::builder()
                .service_name(service_name)
                .ipv4(*v4.ip())
                .port(v4.port())
                .build(),
            Some(SocketAddr::V6(v6)) => Endpoint::builder()
                .service_name(service_name)
                .ipv6(*v6.ip())
                .port(v6.port())
                .build(),
            None => Endpoint::builder().service_name(service_name).build(),
        }
    }
}
