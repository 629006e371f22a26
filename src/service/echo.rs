//! AppleTalk Echo Protocol responder

use bytes::{BufMut, BytesMut};
use std::sync::Arc;

use super::{DatagramHandler, QueueWorker};
use crate::network::{Datagram, Port};
use crate::router::Router;

/// Static socket of the echoer
pub const ECHO_SAS: u8 = 4;

/// DDP type of echo datagrams
pub const ECHO_DDP_TYPE: u8 = 4;

pub const ECHO_FUNC_REQUEST: u8 = 1;
pub const ECHO_FUNC_REPLY: u8 = 2;

/// The echo service
pub type EchoService = QueueWorker<EchoResponder>;

/// Returns every echo request to its sender with the function byte flipped
#[derive(Debug, Clone, Default)]
pub struct EchoResponder;

impl DatagramHandler for EchoResponder {
    const NAME: &'static str = "Echo";

    fn handle(&self, router: &dyn Router, datagram: Datagram, _rx_port: Arc<dyn Port>) {
        if datagram.ddp_type != ECHO_DDP_TYPE || datagram.data.first() != Some(&ECHO_FUNC_REQUEST) {
            return;
        }

        let mut data = BytesMut::with_capacity(datagram.data.len());
        data.put_u8(ECHO_FUNC_REPLY);
        data.put_slice(&datagram.data[1..]);

        tracing::trace!("Echo: reply to {}.{}", datagram.source_network, datagram.source_node);
        router.route(Datagram::reply_to(&datagram, ECHO_DDP_TYPE, data.freeze()));
    }
}
