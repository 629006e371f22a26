//! Router
//!
//! The router owns the ports, the services and the zone information table.
//! Routing-table maintenance is not implemented: [`StaticRouter`] delivers
//! only to networks its own ports are attached to.

use std::sync::Arc;
use thiserror::Error;

use crate::network::{Datagram, Port, PortError};
use crate::service::{Service, ServiceError};
use crate::zone::ZoneInformationTable;

/// Router errors
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Port error: {0}")]
    Port(#[from] PortError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

pub type RouterResult<T> = Result<T, RouterError>;

/// What services and ports need from the router they are attached to
pub trait Router: Send + Sync {
    /// Send an originated datagram toward its destination
    ///
    /// Hop count must be zero and source network/node are filled in from the
    /// outgoing port. Undeliverable datagrams are discarded.
    fn route(&self, datagram: Datagram);

    /// Called by a port for each datagram it receives
    fn inbound(&self, datagram: Datagram, rx_port: Arc<dyn Port>);

    fn zone_information_table(&self) -> &ZoneInformationTable;
}

/// Router that reaches only its directly attached networks
pub struct StaticRouter {
    name: String,
    ports: Vec<Arc<dyn Port>>,
    /// (static socket, service); services without a socket receive nothing
    services: Vec<(Option<u8>, Arc<dyn Service>)>,
    zone_information_table: ZoneInformationTable,
}

impl StaticRouter {
    pub fn new(
        name: impl Into<String>,
        ports: Vec<Arc<dyn Port>>,
        services: Vec<(Option<u8>, Arc<dyn Service>)>,
    ) -> Self {
        Self {
            name: name.into(),
            ports,
            services,
            zone_information_table: ZoneInformationTable::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ports(&self) -> &[Arc<dyn Port>] {
        &self.ports
    }

    /// Start ports, then services
    pub async fn start(self: &Arc<Self>) -> RouterResult<()> {
        let router: Arc<dyn Router> = Arc::clone(self) as Arc<dyn Router>;
        for port in &self.ports {
            Arc::clone(port).start(Arc::clone(&router))?;
        }
        for (_, service) in &self.services {
            service.start(Arc::clone(&router)).await?;
        }
        tracing::info!("Router {} started", self.name);
        Ok(())
    }

    /// Stop services, then ports
    pub async fn stop(&self) -> RouterResult<()> {
        for (_, service) in &self.services {
            service.stop().await?;
        }
        for port in &self.ports {
            port.stop()?;
        }
        tracing::info!("Router {} stopped", self.name);
        Ok(())
    }

    /// Port whose network range contains `network`
    fn port_for_network(&self, network: u16) -> Option<&Arc<dyn Port>> {
        self.ports.iter().find(|port| {
            port.network_min() != 0 && (port.network_min()..=port.network_max()).contains(&network)
        })
    }

    /// Deliver a datagram to the service listening on its destination socket
    fn deliver(&self, datagram: Datagram, rx_port: Arc<dyn Port>) {
        let socket = datagram.destination_socket;
        match self.services.iter().find(|(sas, _)| *sas == Some(socket)) {
            Some((_, service)) => service.inbound(datagram, rx_port),
            None => tracing::trace!("{}: no service on socket {}", self.name, socket),
        }
    }

    fn is_port_address(port: &Arc<dyn Port>, datagram: &Datagram) -> bool {
        datagram.destination_network == port.network() && datagram.destination_node == port.node()
    }

    fn forward(&self, datagram: Datagram, originating: bool) {
        if originating {
            if datagram.hop_count != 0 {
                tracing::warn!(
                    "{}: originated datagram has hop count {}",
                    self.name,
                    datagram.hop_count
                );
                return;
            }
            if datagram.destination_network == 0 {
                tracing::warn!("{}: originated datagram has no destination network", self.name);
                return;
            }
        }

        if datagram.destination_network == 0 {
            return;
        }

        let Some(port) = self.port_for_network(datagram.destination_network) else {
            tracing::trace!("{}: no route to network {}", self.name, datagram.destination_network);
            return;
        };

        let datagram = if originating {
            if port.network() == 0 || port.node() == 0 {
                return;
            }
            datagram.with_source(port.network(), port.node())
        } else {
            datagram
        };

        // any-router address and our own port address are the control plane's business
        if datagram.destination_node == 0x00 || Self::is_port_address(port, &datagram) {
            return;
        }

        port.send(datagram.destination_network, datagram.destination_node, datagram);
    }
}

impl Router for StaticRouter {
    fn route(&self, datagram: Datagram) {
        self.forward(datagram, true);
    }

    fn inbound(&self, datagram: Datagram, rx_port: Arc<dyn Port>) {
        // network zero means "this network", which the port knows
        let datagram = if rx_port.network() != 0 {
            let network = rx_port.network();
            match (datagram.destination_network, datagram.source_network) {
                (0, 0) => datagram.with_networks(network, network),
                (0, source) => datagram.with_networks(network, source),
                (destination, 0) => datagram.with_networks(destination, network),
                _ => datagram,
            }
        } else {
            datagram
        };

        if datagram.destination_network == 0 || datagram.destination_network == rx_port.network() {
            let node = datagram.destination_node;
            if matches!(node, 0x00 | 0xFF) || node == rx_port.node() {
                self.deliver(datagram, rx_port);
            }
            return;
        }

        if let Some(port) = self.port_for_network(datagram.destination_network) {
            if Self::is_port_address(port, &datagram) {
                self.deliver(datagram, rx_port);
                return;
            } else if datagram.destination_node == 0x00 {
                self.deliver(datagram, rx_port);
                return;
            } else if datagram.destination_node == 0xFF {
                self.deliver(datagram.clone(), Arc::clone(&rx_port));
            }
        }

        self.forward(datagram, false);
    }

    fn zone_information_table(&self) -> &ZoneInformationTable {
        &self.zone_information_table
    }
}
