//! Zone Information Protocol responder
//!
//! Answers zone queries sent as ZIP datagrams (Query, GetNetInfo) and as ATP
//! transaction requests (GetMyZone, GetZoneList, GetLocalZones). ZIP is
//! best-effort: there are no error replies, so anything malformed or
//! unanswerable is dropped.

mod handlers;

use std::sync::Arc;

use super::{DatagramHandler, QueueWorker};
use crate::network::{Datagram, Port};
use crate::protocol::{
    decode_atp_request, zip_atp_func, zip_func, CodecResult, ATP_DDP_TYPE, ZIP_DDP_TYPE,
};
use crate::router::Router;

/// The ZIP responding service
pub type ZipRespondingService = QueueWorker<ZipResponder>;

/// Protocol logic of the ZIP responder
#[derive(Debug, Clone)]
pub struct ZipResponder {
    max_data_length: usize,
}

impl Default for ZipResponder {
    fn default() -> Self {
        Self {
            max_data_length: Datagram::MAX_DATA_LENGTH,
        }
    }
}

impl ZipResponder {
    /// Limit reply payloads to `max_data_length` bytes instead of a full datagram
    pub fn with_max_data_length(max_data_length: usize) -> Self {
        Self {
            max_data_length: max_data_length.min(Datagram::MAX_DATA_LENGTH),
        }
    }

    fn dispatch_zip(
        &self,
        router: &dyn Router,
        datagram: &Datagram,
        rx_port: &Arc<dyn Port>,
    ) -> CodecResult<()> {
        match datagram.data.first() {
            Some(&zip_func::QUERY) => self.query(router, datagram),
            Some(&zip_func::GET_NET_INFO_REQUEST) => self.get_net_info(router, datagram, rx_port),
            Some(function) => {
                tracing::trace!("ZIP: ignoring function {}", function);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn dispatch_atp(
        &self,
        router: &dyn Router,
        datagram: &Datagram,
        rx_port: &Arc<dyn Port>,
    ) -> CodecResult<()> {
        let request = decode_atp_request(&datagram.data)?;
        if !request.is_single_request() {
            tracing::trace!(
                "ZIP: ignoring ATP control {:#04X} bitmap {:#04X}",
                request.control,
                request.bitmap
            );
            return Ok(());
        }

        match request.function {
            zip_atp_func::GET_MY_ZONE => self.get_my_zone(router, datagram, &request),
            zip_atp_func::GET_ZONE_LIST => self.get_zone_list(router, datagram, &request, None),
            zip_atp_func::GET_LOCAL_ZONES => {
                self.get_zone_list(router, datagram, &request, Some(rx_port))
            }
            function => {
                tracing::trace!("ZIP: ignoring ATP function {}", function);
                Ok(())
            }
        }
    }
}

impl DatagramHandler for ZipResponder {
    const NAME: &'static str = "ZIP";

    fn handle(&self, router: &dyn Router, datagram: Datagram, rx_port: Arc<dyn Port>) {
        let result = match datagram.ddp_type {
            ZIP_DDP_TYPE => self.dispatch_zip(router, &datagram, &rx_port),
            ATP_DDP_TYPE => self.dispatch_atp(router, &datagram, &rx_port),
            _ => Ok(()),
        };

        if let Err(e) = result {
            tracing::trace!(
                "ZIP: dropping datagram from {}.{}: {}",
                datagram.source_network,
                datagram.source_node,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{LinkKind, PortAddress};
    use crate::protocol::{
        decode_network_zone_entries, decode_zone_entries, encode_atp_request,
        encode_get_net_info_request, encode_query, AtpRequest, GetNetInfoRequest, NetInfoFlags,
        ZipQuery, ZIP_SAS,
    };
    use crate::service::{LifecycleState, Service, ServiceError};
    use crate::testing::{request, RecordingPort, RecordingRouter};
    use bytes::Bytes;

    fn scenario_router() -> Arc<RecordingRouter> {
        RecordingRouter::with_zones(&[("Sales", &[10]), ("Eng", &[10]), ("HR", &[20])])
    }

    fn lan_port() -> Arc<dyn Port> {
        RecordingPort::new(10, 19, 1)
    }

    fn query(networks: &[u16]) -> Datagram {
        let data = encode_query(&ZipQuery { networks: networks.to_vec() });
        request(10, ZIP_DDP_TYPE, data)
    }

    fn atp(source_network: u16, function: u8, start_index: u16) -> Datagram {
        let data = encode_atp_request(&AtpRequest::new(0x1234, function, start_index));
        request(source_network, ATP_DDP_TYPE, data)
    }

    fn get_net_info(zone_name: &'static [u8]) -> Datagram {
        let data = encode_get_net_info_request(&GetNetInfoRequest {
            zone_name: Bytes::from_static(zone_name),
        });
        request(10, ZIP_DDP_TYPE, data)
    }

    fn handle(router: &Arc<RecordingRouter>, datagram: Datagram, rx_port: Arc<dyn Port>) {
        ZipResponder::default().handle(router.as_ref(), datagram, rx_port);
    }

    fn names(data: &[u8]) -> Vec<Bytes> {
        decode_zone_entries(data).unwrap()
    }

    #[test]
    fn test_query_scenario() {
        let router = scenario_router();
        handle(&router, query(&[10, 20]), lan_port());

        let routed = router.routed();
        assert_eq!(routed.len(), 1);
        let reply = &routed[0];
        assert_eq!(reply.ddp_type, ZIP_DDP_TYPE);
        assert_eq!((reply.destination_network, reply.destination_node), (10, 42));
        assert_eq!(reply.destination_socket, 253);
        assert_eq!(reply.source_socket, ZIP_SAS);
        assert_eq!(reply.source_network, 0);
        assert_eq!(reply.data[0], zip_func::REPLY);
        assert_eq!(reply.data[1], 2);
        assert_eq!(
            decode_network_zone_entries(&reply.data[2..]).unwrap(),
            vec![
                (10, Bytes::from_static(b"Sales")),
                (10, Bytes::from_static(b"Eng")),
                (20, Bytes::from_static(b"HR")),
            ]
        );
    }

    #[test]
    fn test_query_reply_count_is_requested_networks_not_entries() {
        // The count byte reports how many networks were asked about, even
        // when that differs from the number of entries returned. Replies are
        // kept this way on purpose; do not "fix" it to the entry count.
        let router = scenario_router();
        handle(&router, query(&[20, 30, 40]), lan_port());

        let routed = router.routed();
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].data[1], 3);
        assert_eq!(decode_network_zone_entries(&routed[0].data[2..]).unwrap().len(), 1);
    }

    #[test]
    fn test_query_fragments_large_zone_lists() {
        let zone_names: Vec<String> = (0..60)
            .map(|i| format!("Engineering Floor {:02}", i))
            .collect();
        let router = RecordingRouter::with_zones(&[]);
        for zone_name in &zone_names {
            router.zone_information_table().add_networks(zone_name.as_bytes(), [10]).unwrap();
        }
        router.zone_information_table().add_networks(b"HR", [20]).unwrap();

        handle(&router, query(&[10, 20]), lan_port());

        let routed = router.routed();
        assert!(routed.len() >= 3);
        let mut entries = Vec::new();
        for reply in &routed {
            assert!(reply.data.len() <= Datagram::MAX_DATA_LENGTH);
            assert_eq!(reply.data[0], zip_func::EXT_REPLY);
            let chunk = decode_network_zone_entries(&reply.data[2..]).unwrap();
            let expected_count = if chunk[0].0 == 10 { 60 } else { 1 };
            assert_eq!(reply.data[1], expected_count);
            entries.extend(chunk);
        }

        let mut expected: Vec<(u16, Bytes)> = zone_names
            .iter()
            .map(|z| (10, Bytes::from(z.clone())))
            .collect();
        expected.push((20, Bytes::from_static(b"HR")));
        assert_eq!(entries, expected);
    }

    #[test]
    fn test_query_with_small_budget() {
        let router = scenario_router();
        let responder = ZipResponder::with_max_data_length(12);
        responder.handle(router.as_ref(), query(&[10, 20]), lan_port());

        let routed = router.routed();
        // "Sales" (8 bytes) and "Eng" (6 bytes) cannot share a 10 byte budget
        assert_eq!(routed.len(), 3);
        assert!(routed.iter().all(|d| d.data.len() <= 12));
        assert_eq!(routed[0].data[1], 2);
        assert_eq!(routed[2].data[1], 1);
    }

    #[test]
    fn test_query_malformed_is_dropped() {
        let router = scenario_router();
        let mut bad_count = query(&[10, 20]);
        bad_count.data = Bytes::from_static(&[zip_func::QUERY, 3, 0, 10, 0, 20]);
        handle(&router, bad_count, lan_port());
        handle(&router, request(10, ZIP_DDP_TYPE, Bytes::new()), lan_port());
        // ZIP Notify is not answered by the responder
        let notify = request(10, ZIP_DDP_TYPE, Bytes::from_static(&[7]));
        handle(&router, notify, lan_port());
        handle(&router, request(10, 4, Bytes::from_static(&[1, 2, 3])), lan_port());
        assert!(router.routed().is_empty());
    }

    #[test]
    fn test_get_net_info_matching_zone() {
        let router = scenario_router();
        let port = RecordingPort::new(10, 19, 1);
        handle(&router, get_net_info(b"eNG"), port.clone());

        assert!(router.routed().is_empty());
        let sent = port.sent();
        assert_eq!(sent.len(), 1);
        let (network, node, reply) = &sent[0];
        assert_eq!((*network, *node), (10, 42));
        assert_eq!((reply.source_network, reply.source_node), (10, 1));
        assert_eq!(reply.source_socket, ZIP_SAS);
        assert_eq!(reply.destination_socket, 253);

        let data = &reply.data;
        assert_eq!(data[0], zip_func::GET_NET_INFO_REPLY);
        let flags = NetInfoFlags::from_bits(data[1]);
        assert!(!flags.zone_invalid);
        assert!(!flags.only_one_zone);
        assert!(!flags.use_broadcast);
        assert_eq!(&data[2..6], &[0, 10, 0, 19]);
        // the given zone is echoed exactly as sent
        assert_eq!(&data[6..10], b"\x03eNG");
        let multicast = LinkKind::EtherTalk.multicast_address(b"Eng");
        assert_eq!(data[10] as usize, multicast.len());
        assert_eq!(&data[11..17], multicast.as_ref());
        assert_eq!(data.len(), 17);
    }

    #[test]
    fn test_get_net_info_unknown_zone_carries_default() {
        let router = scenario_router();
        let port = RecordingPort::new(10, 19, 1);
        handle(&router, get_net_info(b"Marketing"), port.clone());

        let sent = port.sent();
        assert_eq!(sent.len(), 1);
        let data = &sent[0].2.data;
        let flags = NetInfoFlags::from_bits(data[1]);
        assert!(flags.zone_invalid);
        assert!(!flags.only_one_zone);

        let multicast = LinkKind::EtherTalk.multicast_address(b"Sales");
        let mcast_at = 7 + b"Marketing".len();
        assert_eq!(data[mcast_at] as usize, 6);
        assert_eq!(&data[mcast_at + 1..mcast_at + 7], multicast.as_ref());
        assert_eq!(&data[mcast_at + 7..], b"\x05Sales");
    }

    #[test]
    fn test_get_net_info_single_zone_localtalk() {
        let router = scenario_router();
        let port = RecordingPort::with_address(
            LinkKind::LocalTalk,
            PortAddress { network: 20, node: 254, network_min: 20, network_max: 20 },
        );
        handle(&router, get_net_info(b"HR"), port.clone());

        let sent = port.sent();
        let data = &sent[0].2.data;
        let flags = NetInfoFlags::from_bits(data[1]);
        assert!(flags.only_one_zone);
        assert!(flags.use_broadcast);
        assert!(!flags.zone_invalid);
        assert_eq!(&data[6..], b"\x02HR\x00");
    }

    #[test]
    fn test_get_net_info_requires_network_range() {
        let router = scenario_router();
        let unconfigured = RecordingPort::with_address(
            LinkKind::EtherTalk,
            PortAddress { network: 0, node: 0, network_min: 10, network_max: 19 },
        );
        handle(&router, get_net_info(b"Sales"), unconfigured.clone());
        assert!(unconfigured.sent().is_empty());

        let empty = RecordingPort::new(500, 510, 1);
        handle(&router, get_net_info(b"Sales"), empty.clone());
        assert!(empty.sent().is_empty());

        let port = RecordingPort::new(10, 19, 1);
        let mut reserved = get_net_info(b"Sales");
        reserved.data = Bytes::from_static(&[zip_func::GET_NET_INFO_REQUEST, 0, 1, 0, 0, 0, 0]);
        handle(&router, reserved, port.clone());
        assert!(port.sent().is_empty());
    }

    #[test]
    fn test_get_my_zone() {
        let router = scenario_router();
        handle(&router, atp(10, zip_atp_func::GET_MY_ZONE, 0), lan_port());

        let routed = router.routed();
        assert_eq!(routed.len(), 1);
        let reply = &routed[0];
        assert_eq!(reply.ddp_type, ATP_DDP_TYPE);
        assert_eq!(
            reply.data.as_ref(),
            b"\x90\x00\x12\x34\x00\x00\x00\x01\x05Sales"
        );
    }

    #[test]
    fn test_get_my_zone_drops() {
        let router = scenario_router();
        handle(&router, atp(10, zip_atp_func::GET_MY_ZONE, 1), lan_port());
        handle(&router, atp(99, zip_atp_func::GET_MY_ZONE, 0), lan_port());
        assert!(router.routed().is_empty());
    }

    #[test]
    fn test_get_zone_list_pages() {
        let router = scenario_router();
        handle(&router, atp(10, zip_atp_func::GET_ZONE_LIST, 1), lan_port());
        handle(&router, atp(10, zip_atp_func::GET_ZONE_LIST, 3), lan_port());

        let routed = router.routed();
        assert_eq!(routed.len(), 2);

        let first = &routed[0].data;
        assert_eq!(&first[..8], &[0x90, 0, 0x12, 0x34, 1, 0, 0, 3]);
        assert_eq!(names(&first[8..]), vec!["Sales", "Eng", "HR"]);

        let third = &routed[1].data;
        assert_eq!(third[4], 1);
        assert_eq!(names(&third[8..]), vec!["HR"]);
    }

    #[test]
    fn test_get_zone_list_last_flag() {
        let router = scenario_router();
        // 8 byte header plus "Sales" and "Eng" entries, no room for "HR"
        let responder = ZipResponder::with_max_data_length(8 + 6 + 4);
        responder.handle(router.as_ref(), atp(10, zip_atp_func::GET_ZONE_LIST, 1), lan_port());
        responder.handle(router.as_ref(), atp(10, zip_atp_func::GET_ZONE_LIST, 3), lan_port());

        let routed = router.routed();
        assert_eq!(routed[0].data[4], 0);
        assert_eq!(names(&routed[0].data[8..]), vec!["Sales", "Eng"]);
        assert_eq!(routed[1].data[4], 1);
        assert_eq!(names(&routed[1].data[8..]), vec!["HR"]);
    }

    #[test]
    fn test_get_local_zones_uses_port_range() {
        let router = scenario_router();
        let port = RecordingPort::new(20, 29, 1);
        handle(&router, atp(10, zip_atp_func::GET_LOCAL_ZONES, 1), port.clone());

        // replied through the router, not the receiving port
        assert!(port.sent().is_empty());
        let routed = router.routed();
        assert_eq!(routed.len(), 1);
        assert_eq!(names(&routed[0].data[8..]), vec!["HR"]);
        assert_eq!(routed[0].data[4], 1);
    }

    #[test]
    fn test_malformed_atp_is_dropped() {
        let router = scenario_router();

        let mut multi = AtpRequest::new(1, zip_atp_func::GET_ZONE_LIST, 1);
        multi.bitmap = 0xFF;
        handle(&router, request(10, ATP_DDP_TYPE, encode_atp_request(&multi)), lan_port());

        let mut reserved = AtpRequest::new(1, zip_atp_func::GET_ZONE_LIST, 1);
        reserved.zero = 1;
        handle(&router, request(10, ATP_DDP_TYPE, encode_atp_request(&reserved)), lan_port());

        let mut response = AtpRequest::new(1, zip_atp_func::GET_ZONE_LIST, 1);
        response.control = 0x90;
        handle(&router, request(10, ATP_DDP_TYPE, encode_atp_request(&response)), lan_port());

        let short = encode_atp_request(&AtpRequest::new(1, zip_atp_func::GET_ZONE_LIST, 1));
        let short = short.slice(..7);
        handle(&router, request(10, ATP_DDP_TYPE, short), lan_port());

        handle(&router, atp(10, 42, 1), lan_port());

        assert!(router.routed().is_empty());
    }

    #[tokio::test]
    async fn test_service_answers_in_order() {
        let router = scenario_router();
        let service = ZipRespondingService::new(ZipResponder::default());
        assert_eq!(service.state(), LifecycleState::NotStarted);

        // queued before start, answered once the worker is up
        service.inbound(atp(10, zip_atp_func::GET_MY_ZONE, 0), lan_port());
        service.start(router.clone()).await.unwrap();
        assert_eq!(service.state(), LifecycleState::Running);

        service.inbound(query(&[20]), lan_port());
        service.inbound(request(10, ZIP_DDP_TYPE, Bytes::new()), lan_port());
        service.inbound(atp(10, zip_atp_func::GET_ZONE_LIST, 1), lan_port());
        service.stop().await.unwrap();
        assert_eq!(service.state(), LifecycleState::Stopped);

        let routed = router.routed();
        let types: Vec<u8> = routed.iter().map(|d| d.ddp_type).collect();
        assert_eq!(types, vec![ATP_DDP_TYPE, ZIP_DDP_TYPE, ATP_DDP_TYPE]);

        // nothing is processed after stop
        service.inbound(query(&[10]), lan_port());
        tokio::task::yield_now().await;
        assert_eq!(router.routed().len(), 3);
    }

    #[tokio::test]
    async fn test_stop_right_after_start() {
        let router = scenario_router();
        let service = ZipRespondingService::new(ZipResponder::default());
        service.start(router.clone()).await.unwrap();
        service.stop().await.unwrap();
        assert!(router.routed().is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_misuse() {
        let router = scenario_router();
        let service = ZipRespondingService::new(ZipResponder::default());
        assert!(matches!(service.stop().await, Err(ServiceError::NotRunning)));

        service.start(router.clone()).await.unwrap();
        assert!(matches!(service.start(router.clone()).await, Err(ServiceError::AlreadyStarted)));

        service.stop().await.unwrap();
        assert!(matches!(service.stop().await, Err(ServiceError::NotRunning)));
        assert!(matches!(service.start(router).await, Err(ServiceError::AlreadyStarted)));
    }
}
