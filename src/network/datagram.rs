//! DDP datagram
//!
//! The immutable unit every port, router and service exchanges, plus the
//! long-header wire encoding used by the virtual ports.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Long DDP header: length(2) checksum(2) networks(4) nodes(2) sockets(2) type(1)
pub const LONG_HEADER_SIZE: usize = 13;

/// Datagram errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DatagramError {
    #[error("Datagram too short: {actual} bytes (need at least {expected})")]
    TooShort { expected: usize, actual: usize },

    #[error("Invalid header: {0}")]
    InvalidHeader(&'static str),

    #[error("Length field says {declared} but datagram is {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Checksum is {actual:#06X} but should be {expected:#06X}")]
    BadChecksum { expected: u16, actual: u16 },

    #[error("Payload too large: {0} bytes (max: {max})", max = Datagram::MAX_DATA_LENGTH)]
    PayloadTooLarge(usize),

    #[error("{field} {value} out of range {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

pub type DatagramResult<T> = Result<T, DatagramError>;

/// Checksum used in the long DDP header and for zone multicast selection
pub fn ddp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for byte in data {
        sum += *byte as u32;
        sum = (sum & 0x7FFF) << 1 | u32::from(sum & 0x8000 != 0);
    }
    // zero in the header means "no checksum", so it is never produced
    match sum as u16 {
        0 => 0xFFFF,
        checksum => checksum,
    }
}

/// A DDP datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub hop_count: u8,
    pub destination_network: u16,
    pub source_network: u16,
    pub destination_node: u8,
    pub source_node: u8,
    pub destination_socket: u8,
    pub source_socket: u8,
    pub ddp_type: u8,
    pub data: Bytes,
}

impl Datagram {
    /// Largest payload a datagram may carry
    pub const MAX_DATA_LENGTH: usize = 586;

    /// Build the reply skeleton to `request`: addressed back to its source,
    /// hop count zero, source network and node left for the router to fill.
    pub fn reply_to(request: &Datagram, ddp_type: u8, data: Bytes) -> Self {
        Self {
            hop_count: 0,
            destination_network: request.source_network,
            source_network: 0,
            destination_node: request.source_node,
            source_node: 0,
            destination_socket: request.source_socket,
            source_socket: request.destination_socket,
            ddp_type,
            data,
        }
    }

    /// Copy with different network numbers
    pub fn with_networks(&self, destination_network: u16, source_network: u16) -> Self {
        Self {
            destination_network,
            source_network,
            ..self.clone()
        }
    }

    /// Copy with a different source address
    pub fn with_source(&self, source_network: u16, source_node: u8) -> Self {
        Self {
            source_network,
            source_node,
            ..self.clone()
        }
    }

    fn check_ranges(&self) -> DatagramResult<()> {
        let fields: [(&'static str, u32, u32, u32); 5] = [
            ("hop count", self.hop_count as u32, 0, 15),
            ("destination network", self.destination_network as u32, 0, 65534),
            ("source network", self.source_network as u32, 0, 65534),
            ("source node", self.source_node as u32, 1, 254),
            ("data length", self.data.len() as u32, 0, Self::MAX_DATA_LENGTH as u32),
        ];
        for (field, value, min, max) in fields {
            if !(min..=max).contains(&value) {
                return Err(DatagramError::OutOfRange { field, value, min, max });
            }
        }
        Ok(())
    }

    /// Parse a long-header datagram
    pub fn from_long_header_bytes(data: &[u8], verify_checksum: bool) -> DatagramResult<Self> {
        if data.len() < LONG_HEADER_SIZE {
            return Err(DatagramError::TooShort {
                expected: LONG_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let first = buf.get_u8();
        let second = buf.get_u8();
        let checksum = buf.get_u16();
        if first & 0xC0 != 0 {
            return Err(DatagramError::InvalidHeader("top two bits of first byte must be zero"));
        }
        let hop_count = (first & 0x3C) >> 2;
        let length = ((first & 0x03) as usize) << 8 | second as usize;
        if length > LONG_HEADER_SIZE + Self::MAX_DATA_LENGTH {
            return Err(DatagramError::PayloadTooLarge(length - LONG_HEADER_SIZE));
        }
        if length != data.len() {
            return Err(DatagramError::LengthMismatch {
                declared: length,
                actual: data.len(),
            });
        }
        if checksum != 0 && verify_checksum {
            let expected = ddp_checksum(&data[4..]);
            if expected != checksum {
                return Err(DatagramError::BadChecksum { expected, actual: checksum });
            }
        }

        Ok(Self {
            hop_count,
            destination_network: buf.get_u16(),
            source_network: buf.get_u16(),
            destination_node: buf.get_u8(),
            source_node: buf.get_u8(),
            destination_socket: buf.get_u8(),
            source_socket: buf.get_u8(),
            ddp_type: buf.get_u8(),
            data: Bytes::copy_from_slice(buf),
        })
    }

    /// Encode with a long header
    pub fn as_long_header_bytes(&self, calculate_checksum: bool) -> DatagramResult<Bytes> {
        self.check_ranges()?;

        let length = LONG_HEADER_SIZE + self.data.len();
        let mut buf = BytesMut::with_capacity(length);
        buf.put_u8((self.hop_count & 0x0F) << 2 | ((length & 0x300) >> 8) as u8);
        buf.put_u8((length & 0xFF) as u8);
        buf.put_u16(0);
        buf.put_u16(self.destination_network);
        buf.put_u16(self.source_network);
        buf.put_u8(self.destination_node);
        buf.put_u8(self.source_node);
        buf.put_u8(self.destination_socket);
        buf.put_u8(self.source_socket);
        buf.put_u8(self.ddp_type);
        buf.put_slice(&self.data);

        if calculate_checksum {
            let checksum = ddp_checksum(&buf[4..]);
            buf[2..4].copy_from_slice(&checksum.to_be_bytes());
        }
        Ok(buf.freeze())
    }
}
