//! Protocol message definitions
//!
//! Typed views of the ZIP and ATP messages the responder understands.

use bytes::Bytes;

use super::atp_control;

/// Flags byte of a GetNetInfo reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetInfoFlags {
    /// The zone named in the request is not valid on the requester's network
    pub zone_invalid: bool,
    /// Nodes should use the broadcast address instead of a zone multicast
    pub use_broadcast: bool,
    /// The network has exactly one zone
    pub only_one_zone: bool,
}

impl NetInfoFlags {
    pub const ZONE_INVALID: u8 = 0x80;
    pub const USE_BROADCAST: u8 = 0x40;
    pub const ONLY_ONE_ZONE: u8 = 0x20;

    pub fn to_bits(&self) -> u8 {
        let mut bits = 0u8;
        if self.zone_invalid {
            bits |= Self::ZONE_INVALID;
        }
        if self.use_broadcast {
            bits |= Self::USE_BROADCAST;
        }
        if self.only_one_zone {
            bits |= Self::ONLY_ONE_ZONE;
        }
        bits
    }

    #[cfg(test)]
    pub fn from_bits(bits: u8) -> Self {
        Self {
            zone_invalid: bits & Self::ZONE_INVALID != 0,
            use_broadcast: bits & Self::USE_BROADCAST != 0,
            only_one_zone: bits & Self::ONLY_ONE_ZONE != 0,
        }
    }
}

/// ZIP Query: the networks whose zone lists are wanted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipQuery {
    pub networks: Vec<u16>,
}

/// ZIP GetNetInfo request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetNetInfoRequest {
    /// Zone name the requester believes it is in, as sent
    pub zone_name: Bytes,
}

/// ZIP GetNetInfo reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetNetInfoReply {
    pub flags: NetInfoFlags,
    pub network_min: u16,
    pub network_max: u16,
    /// Echo of the requested zone name
    pub zone_name: Bytes,
    /// Empty when the port has no multicast address for the zone
    pub multicast_address: Bytes,
    /// Only encoded when `flags.zone_invalid` is set
    pub default_zone: Option<Bytes>,
}

/// ATP request header carrying a ZIP function in its user bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtpRequest {
    pub control: u8,
    pub bitmap: u8,
    pub tid: u16,
    pub function: u8,
    pub zero: u8,
    pub start_index: u16,
}

impl AtpRequest {
    /// Size of an ATP request carrying a ZIP function
    pub const SIZE: usize = 8;

    #[cfg(test)]
    pub fn new(tid: u16, function: u8, start_index: u16) -> Self {
        Self {
            control: atp_control::TREQ,
            bitmap: 1,
            tid,
            function,
            zero: 0,
            start_index,
        }
    }

    /// Single-packet transaction request with the reserved user byte clear
    pub fn is_single_request(&self) -> bool {
        self.control == atp_control::TREQ && self.bitmap == 1 && self.zero == 0
    }
}
