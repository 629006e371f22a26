//! Request handlers of the ZIP responder

use bytes::{Bytes, BytesMut};
use std::sync::Arc;

use super::ZipResponder;
use crate::network::{Datagram, Port};
use crate::protocol::{
    decode_get_net_info_request, decode_query, encode_atp_zone_response, encode_get_net_info_reply,
    put_zone_entry, query_reply_payloads, AtpRequest, CodecResult, GetNetInfoReply, NetInfoFlags,
    ZoneListPage, ATP_DDP_TYPE, ZIP_DDP_TYPE, ZIP_SAS,
};
use crate::router::Router;
use crate::zone::ucase;

impl ZipResponder {
    /// ZIP Query: zone lists of the requested networks
    pub(super) fn query(&self, router: &dyn Router, datagram: &Datagram) -> CodecResult<()> {
        let query = decode_query(&datagram.data)?;
        let zit = router.zone_information_table();

        let zones: Vec<(u16, Bytes)> = query
            .networks
            .iter()
            .flat_map(|&network| {
                zit.zones_in_network(network)
                    .into_iter()
                    .map(move |zone_name| (network, zone_name))
            })
            .collect();

        // count is bounded by the one-byte count field of the request
        let requested = query.networks.len() as u8;
        let payloads = query_reply_payloads(requested, &zones, self.max_data_length);
        tracing::debug!(
            "ZIP: query for {} network(s) from {}.{}: {} zone(s) in {} reply datagram(s)",
            requested,
            datagram.source_network,
            datagram.source_node,
            zones.len(),
            payloads.len()
        );
        for payload in payloads {
            router.route(Datagram::reply_to(datagram, ZIP_DDP_TYPE, payload));
        }
        Ok(())
    }

    /// ZIP GetNetInfo: network range, zone validity and multicast address
    pub(super) fn get_net_info(
        &self,
        router: &dyn Router,
        datagram: &Datagram,
        rx_port: &Arc<dyn Port>,
    ) -> CodecResult<()> {
        let (network_min, network_max) = (rx_port.network_min(), rx_port.network_max());
        if rx_port.network() == 0 || network_min == 0 || network_max == 0 {
            tracing::trace!("ZIP: GetNetInfo on port {} without a network range", rx_port.name());
            return Ok(());
        }

        let request = decode_get_net_info_request(&datagram.data)?;
        let given_ucase = ucase(&request.zone_name);

        let mut flags = NetInfoFlags {
            zone_invalid: true,
            use_broadcast: false,
            only_one_zone: true,
        };
        let mut default_zone: Option<Bytes> = None;
        let mut multicast_address = Bytes::new();
        let mut zone_count = 0usize;

        let zit = router.zone_information_table();
        for zone_name in zit.zones_in_network_range(network_min, network_max) {
            zone_count += 1;
            if default_zone.is_none() {
                multicast_address = rx_port.multicast_address(&zone_name);
                default_zone = Some(zone_name.clone());
            }
            if ucase(&zone_name) == given_ucase {
                flags.zone_invalid = false;
                multicast_address = rx_port.multicast_address(&zone_name);
            }
            if zone_count > 1 {
                flags.only_one_zone = false;
                // nothing left to learn once both flags are settled
                if !flags.zone_invalid {
                    break;
                }
            }
        }

        let Some(default_zone) = default_zone else {
            tracing::trace!(
                "ZIP: GetNetInfo on port {} but no zones in {}-{}",
                rx_port.name(),
                network_min,
                network_max
            );
            return Ok(());
        };
        if multicast_address.is_empty() {
            flags.use_broadcast = true;
        }

        let reply = GetNetInfoReply {
            flags,
            network_min,
            network_max,
            zone_name: request.zone_name,
            multicast_address,
            default_zone: Some(default_zone),
        };
        tracing::debug!(
            "ZIP: GetNetInfo from {}.{} on port {}: flags {:#04X}",
            datagram.source_network,
            datagram.source_node,
            rx_port.name(),
            flags.to_bits()
        );

        rx_port.send(
            datagram.source_network,
            datagram.source_node,
            Datagram {
                hop_count: 0,
                destination_network: datagram.source_network,
                source_network: rx_port.network(),
                destination_node: datagram.source_node,
                source_node: rx_port.node(),
                destination_socket: datagram.source_socket,
                source_socket: ZIP_SAS,
                ddp_type: ZIP_DDP_TYPE,
                data: encode_get_net_info_reply(&reply),
            },
        );
        Ok(())
    }

    /// ATP GetMyZone: the first zone of the requester's network
    pub(super) fn get_my_zone(
        &self,
        router: &dyn Router,
        datagram: &Datagram,
        request: &AtpRequest,
    ) -> CodecResult<()> {
        if request.start_index != 0 {
            tracing::trace!("ZIP: GetMyZone with start index {}", request.start_index);
            return Ok(());
        }

        let zit = router.zone_information_table();
        let network = datagram.source_network;
        let Some(zone_name) = zit.zones_in_network(network).into_iter().next() else {
            tracing::trace!("ZIP: GetMyZone for network {} which has no zone", network);
            return Ok(());
        };

        let mut entries = BytesMut::with_capacity(1 + zone_name.len());
        put_zone_entry(&mut entries, &zone_name);
        let data = encode_atp_zone_response(request.tid, 0, 1, &entries);
        router.route(Datagram::reply_to(datagram, ATP_DDP_TYPE, data));
        Ok(())
    }

    /// ATP GetZoneList / GetLocalZones: one page of the zone list
    ///
    /// With `rx_port` the list is limited to the zones in that port's range.
    /// The reply is routed either way.
    pub(super) fn get_zone_list(
        &self,
        router: &dyn Router,
        datagram: &Datagram,
        request: &AtpRequest,
        rx_port: Option<&Arc<dyn Port>>,
    ) -> CodecResult<()> {
        let zit = router.zone_information_table();
        let zones = match rx_port {
            Some(port) => zit.zones_in_network_range(port.network_min(), port.network_max()),
            None => zit.zones(),
        };

        let page = ZoneListPage::collect(zones, request.start_index, self.max_data_length);
        tracing::debug!(
            "ZIP: zone list from index {} for {}.{}: {} zone(s), last {}",
            request.start_index,
            datagram.source_network,
            datagram.source_node,
            page.zone_count,
            page.last
        );

        let data = encode_atp_zone_response(
            request.tid,
            page.last_flag(),
            page.zone_count,
            &page.entries,
        );
        router.route(Datagram::reply_to(datagram, ATP_DDP_TYPE, data));
        Ok(())
    }
}
