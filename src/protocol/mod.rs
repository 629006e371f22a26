//! Protocol module - ZIP and ATP wire formats
//!
//! All multi-byte fields are big-endian. The codes below are shared by every
//! service that speaks ZIP or carries ZIP queries over ATP:
//! - ZIP datagrams: 1 byte function code, then a function-specific body
//! - ATP datagrams: 8 byte header (control, bitmap, tid, user bytes)

mod codec;
mod fragment;
mod message;

pub use codec::*;
pub use fragment::*;
pub use message::*;

/// Static socket the ZIP responder listens on
pub const ZIP_SAS: u8 = 6;

/// DDP type of ZIP datagrams
pub const ZIP_DDP_TYPE: u8 = 6;

/// DDP type of ATP datagrams
pub const ATP_DDP_TYPE: u8 = 3;

/// ZIP function codes (first payload byte of a ZIP datagram)
pub mod zip_func {
    pub const QUERY: u8 = 1;
    pub const REPLY: u8 = 2;
    pub const GET_NET_INFO_REQUEST: u8 = 5;
    pub const GET_NET_INFO_REPLY: u8 = 6;
    pub const EXT_REPLY: u8 = 8;
}

/// ZIP function codes carried in the first ATP user byte
pub mod zip_atp_func {
    pub const GET_MY_ZONE: u8 = 7;
    pub const GET_ZONE_LIST: u8 = 8;
    pub const GET_LOCAL_ZONES: u8 = 9;
}

/// ATP control byte values
pub mod atp_control {
    pub const TREQ: u8 = 0b0100_0000;
    pub const TRESP: u8 = 0b1000_0000;
    pub const EOM: u8 = 0b0001_0000;
}
