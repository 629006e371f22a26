//! Router ports
//!
//! A port is the router's attachment to one AppleTalk network. It knows the
//! network range it serves, its own address on that network, and how zone
//! names map onto link-layer multicast addresses.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use thiserror::Error;

use super::datagram::{ddp_checksum, Datagram};
use super::virtual_network::{FrameHandler, ReceiverId, VirtualNetwork};
use crate::router::Router;
use crate::zone::ucase;

/// First five bytes of every EtherTalk zone multicast address
pub const ELAP_MULTICAST_PREFIX: [u8; 5] = [0x09, 0x00, 0x07, 0x00, 0x00];

/// Highest last byte of an EtherTalk zone multicast address
pub const ELAP_MULTICAST_ADDR_MAX: u8 = 0xFC;

/// Port errors
#[derive(Error, Debug)]
pub enum PortError {
    #[error("Port already started")]
    AlreadyStarted,

    #[error("Port not started")]
    NotStarted,
}

pub type PortResult<T> = Result<T, PortError>;

/// Link layer a port speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    EtherTalk,
    LocalTalk,
}

impl LinkKind {
    /// Multicast address for a zone; empty when the link has none
    pub fn multicast_address(&self, zone_name: &[u8]) -> Bytes {
        match self {
            LinkKind::EtherTalk => {
                let index = ddp_checksum(&ucase(zone_name)) % (ELAP_MULTICAST_ADDR_MAX as u16 + 1);
                let mut address = ELAP_MULTICAST_PREFIX.to_vec();
                address.push(index as u8);
                address.into()
            }
            LinkKind::LocalTalk => Bytes::new(),
        }
    }
}

/// A router port
pub trait Port: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// This port's own network number, zero until known
    fn network(&self) -> u16;

    /// This port's own node number, zero until known
    fn node(&self) -> u8;

    fn network_min(&self) -> u16;

    fn network_max(&self) -> u16;

    /// Multicast address for the given zone on this port's link
    fn multicast_address(&self, zone_name: &[u8]) -> Bytes;

    /// Send a datagram to a node reachable through this port
    fn send(&self, network: u16, node: u8, datagram: Datagram);

    /// Attach to the link and start handing inbound datagrams to `router`
    fn start(self: Arc<Self>, router: Arc<dyn Router>) -> PortResult<()>;

    /// Detach from the link
    fn stop(&self) -> PortResult<()>;
}

/// Static addressing of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAddress {
    pub network: u16,
    pub node: u8,
    pub network_min: u16,
    pub network_max: u16,
}

/// Port attached to a [`VirtualNetwork`], exchanging long-header datagrams
pub struct VirtualPort {
    name: String,
    kind: LinkKind,
    address: PortAddress,
    virtual_network: Arc<VirtualNetwork>,
    receiver: Mutex<Option<ReceiverId>>,
}

impl VirtualPort {
    pub fn new(
        name: impl Into<String>,
        kind: LinkKind,
        address: PortAddress,
        virtual_network: Arc<VirtualNetwork>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            address,
            virtual_network,
            receiver: Mutex::new(None),
        }
    }

    fn receive_frame(self: &Arc<Self>, router: &Arc<dyn Router>, frame: Bytes) {
        let datagram = match Datagram::from_long_header_bytes(&frame, true) {
            Ok(datagram) => datagram,
            Err(e) => {
                tracing::trace!("{}: dropping bad frame: {}", self.name, e);
                return;
            }
        };

        // the link only passes up what is addressed to us or broadcast
        let node = datagram.destination_node;
        if !matches!(node, 0x00 | 0xFF) && node != self.address.node {
            return;
        }

        let rx_port: Arc<dyn Port> = Arc::clone(self) as Arc<dyn Port>;
        router.inbound(datagram, rx_port);
    }
}

impl Port for VirtualPort {
    fn name(&self) -> &str {
        &self.name
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
        let Some(receiver) = *self.receiver.lock().unwrap_or_else(PoisonError::into_inner) else {
            tracing::debug!(
                "{}: not started, dropping datagram to {}.{}",
                self.name,
                network,
                node
            );
            return;
        };

        // the medium is a broadcast bus, receivers filter on the datagram's own node
        match datagram.as_long_header_bytes(true) {
            Ok(frame) => self.virtual_network.send_frame(frame, receiver),
            Err(e) => tracing::warn!(
                "{}: cannot encode datagram to {}.{}: {}",
                self.name,
                network,
                node,
                e
            ),
        }
    }

    fn start(self: Arc<Self>, router: Arc<dyn Router>) -> PortResult<()> {
        let mut receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        if receiver.is_some() {
            return Err(PortError::AlreadyStarted);
        }

        let port: Weak<Self> = Arc::downgrade(&self);
        let handler: FrameHandler = Arc::new(move |frame| {
            if let Some(port) = port.upgrade() {
                port.receive_frame(&router, frame);
            }
        });
        *receiver = Some(self.virtual_network.plug(handler));
        tracing::info!(
            "Port {} up: network {} node {} range {}-{}",
            self.name,
            self.address.network,
            self.address.node,
            self.address.network_min,
            self.address.network_max
        );
        Ok(())
    }

    fn stop(&self) -> PortResult<()> {
        let id = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(PortError::NotStarted)?;
        self.virtual_network.unplug(id);
        tracing::info!("Port {} down", self.name);
        Ok(())
    }
}
