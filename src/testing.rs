//! Test doubles for the router and port collaborators

use bytes::Bytes;
use std::sync::{Arc, Mutex};

use crate::network::{Datagram, LinkKind, Port, PortAddress, PortResult};
use crate::router::Router;
use crate::zone::ZoneInformationTable;

/// Port that records every datagram sent through it
pub struct RecordingPort {
    pub address: PortAddress,
    pub kind: LinkKind,
    sent: Mutex<Vec<(u16, u8, Datagram)>>,
}

impl RecordingPort {
    /// EtherTalk port whose own network is the bottom of its range
    pub fn new(network_min: u16, network_max: u16, node: u8) -> Arc<Self> {
        Self::with_address(
            LinkKind::EtherTalk,
            PortAddress { network: network_min, node, network_min, network_max },
        )
    }

    pub fn with_address(kind: LinkKind, address: PortAddress) -> Arc<Self> {
        Arc::new(Self {
            address,
            kind,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<(u16, u8, Datagram)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Port for RecordingPort {
    fn name(&self) -> &str {
        "recording"
    }

    fn network(&self) -> u16 {
        self.address.network
    }

    fn node(&self) -> u8 {
        self.address.node
    }

    fn network_min(&self) -> u16 {
        self.address.network_min
    }

    fn network_max(&self) -> u16 {
        self.address.network_max
    }

    fn multicast_address(&self, zone_name: &[u8]) -> Bytes {
        self.kind.multicast_address(zone_name)
    }

    fn send(&self, network: u16, node: u8, datagram: Datagram) {
        self.sent.lock().unwrap().push((network, node, datagram));
    }

    fn start(self: Arc<Self>, _router: Arc<dyn Router>) -> PortResult<()> {
        Ok(())
    }

    fn stop(&self) -> PortResult<()> {
        Ok(())
    }
}

/// Router that records routed datagrams instead of delivering them
#[derive(Default)]
pub struct RecordingRouter {
    zone_information_table: ZoneInformationTable,
    routed: Mutex<Vec<Datagram>>,
}

impl RecordingRouter {
    /// Router whose table holds the given `(zone, networks)` pairs, in order
    pub fn with_zones(zones: &[(&str, &[u16])]) -> Arc<Self> {
        let router = Self::default();
        for (zone_name, networks) in zones {
            router
                .zone_information_table
                .add_networks(zone_name.as_bytes(), networks.iter().copied())
                .unwrap();
        }
        Arc::new(router)
    }

    pub fn routed(&self) -> Vec<Datagram> {
        self.routed.lock().unwrap().clone()
    }
}

impl Router for RecordingRouter {
    fn route(&self, datagram: Datagram) {
        self.routed.lock().unwrap().push(datagram);
    }

    fn inbound(&self, _datagram: Datagram, _rx_port: Arc<dyn Port>) {}

    fn zone_information_table(&self) -> &ZoneInformationTable {
        &self.zone_information_table
    }
}

/// A request datagram from node 42 on `source_network`, socket 253
pub fn request(source_network: u16, ddp_type: u8, data: Bytes) -> Datagram {
    Datagram {
        hop_count: 0,
        destination_network: source_network,
        source_network,
        destination_node: 0xFF,
        source_node: 42,
        destination_socket: crate::protocol::ZIP_SAS,
        source_socket: 253,
        ddp_type,
        data,
    }
}
