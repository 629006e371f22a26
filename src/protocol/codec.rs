//! Protocol codec for encoding/decoding ZIP and ATP payloads
//!
//! Pure functions over DDP payload bytes; no framing or addressing.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{atp_control, zip_func, AtpRequest, GetNetInfoReply, GetNetInfoRequest, ZipQuery};

/// Size of the function + count prefix of a ZIP Reply / Extended Reply
pub const ZIP_REPLY_HEADER_SIZE: usize = 2;

/// Size of the ATP response header preceding a zone list
pub const ATP_RESPONSE_HEADER_SIZE: usize = 8;

/// Fixed part of a GetNetInfo request: function(1) zero(5) length(1)
const GET_NET_INFO_FIXED_SIZE: usize = 7;

/// Codec errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Payload too short: {actual} bytes (need at least {expected})")]
    TooShort { expected: usize, actual: usize },

    #[error("Payload length mismatch: {actual} bytes (expected {expected})")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Reserved field is not zero")]
    NonZeroReserved,

    #[error("Unexpected function code: {0}")]
    UnexpectedFunction(u8),
}

pub type CodecResult<T> = Result<T, CodecError>;

fn expect_function(data: &[u8], function: u8) -> CodecResult<()> {
    match data.first() {
        Some(&f) if f == function => Ok(()),
        Some(&f) => Err(CodecError::UnexpectedFunction(f)),
        None => Err(CodecError::TooShort { expected: 1, actual: 0 }),
    }
}

/// Decode a ZIP Query: `func count {net}*count`
pub fn decode_query(data: &[u8]) -> CodecResult<ZipQuery> {
    // a query for zero networks is meaningless, so require at least one
    if data.len() < 4 {
        return Err(CodecError::TooShort { expected: 4, actual: data.len() });
    }
    expect_function(data, zip_func::QUERY)?;

    let count = data[1] as usize;
    let expected = 2 + count * 2;
    if data.len() != expected {
        return Err(CodecError::LengthMismatch { expected, actual: data.len() });
    }

    let mut body = &data[2..];
    let networks = (0..count).map(|_| body.get_u16()).collect();
    Ok(ZipQuery { networks })
}

/// Encode a ZIP Query
#[cfg(test)]
pub fn encode_query(query: &ZipQuery) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + query.networks.len() * 2);
    buf.put_u8(zip_func::QUERY);
    buf.put_u8(query.networks.len() as u8);
    for network in &query.networks {
        buf.put_u16(*network);
    }
    buf.freeze()
}

/// Decode a ZIP GetNetInfo request: `func zero(5) len name`
///
/// Bytes past the declared name are ignored.
pub fn decode_get_net_info_request(data: &[u8]) -> CodecResult<GetNetInfoRequest> {
    if data.len() < GET_NET_INFO_FIXED_SIZE {
        return Err(CodecError::TooShort {
            expected: GET_NET_INFO_FIXED_SIZE,
            actual: data.len(),
        });
    }
    expect_function(data, zip_func::GET_NET_INFO_REQUEST)?;
    if data[1..6].iter().any(|b| *b != 0) {
        return Err(CodecError::NonZeroReserved);
    }

    let end = GET_NET_INFO_FIXED_SIZE + data[6] as usize;
    if data.len() < end {
        return Err(CodecError::TooShort { expected: end, actual: data.len() });
    }

    Ok(GetNetInfoRequest {
        zone_name: Bytes::copy_from_slice(&data[GET_NET_INFO_FIXED_SIZE..end]),
    })
}

/// Encode a ZIP GetNetInfo request
#[cfg(test)]
pub fn encode_get_net_info_request(request: &GetNetInfoRequest) -> Bytes {
    let mut buf = BytesMut::with_capacity(GET_NET_INFO_FIXED_SIZE + request.zone_name.len());
    buf.put_u8(zip_func::GET_NET_INFO_REQUEST);
    buf.put_bytes(0, 5);
    put_zone_entry(&mut buf, &request.zone_name);
    buf.freeze()
}

/// Encode a ZIP GetNetInfo reply
pub fn encode_get_net_info_reply(reply: &GetNetInfoReply) -> Bytes {
    let mut buf = BytesMut::with_capacity(
        8 + reply.zone_name.len()
            + reply.multicast_address.len()
            + reply.default_zone.as_ref().map_or(0, |z| 1 + z.len()),
    );
    buf.put_u8(zip_func::GET_NET_INFO_REPLY);
    buf.put_u8(reply.flags.to_bits());
    buf.put_u16(reply.network_min);
    buf.put_u16(reply.network_max);
    put_zone_entry(&mut buf, &reply.zone_name);
    buf.put_u8(reply.multicast_address.len() as u8);
    buf.put_slice(&reply.multicast_address);
    if reply.flags.zone_invalid {
        if let Some(default_zone) = &reply.default_zone {
            put_zone_entry(&mut buf, default_zone);
        }
    }
    buf.freeze()
}

/// Decode the 8-byte ATP request header
pub fn decode_atp_request(data: &[u8]) -> CodecResult<AtpRequest> {
    if data.len() != AtpRequest::SIZE {
        return Err(CodecError::LengthMismatch {
            expected: AtpRequest::SIZE,
            actual: data.len(),
        });
    }

    let mut buf = data;
    Ok(AtpRequest {
        control: buf.get_u8(),
        bitmap: buf.get_u8(),
        tid: buf.get_u16(),
        function: buf.get_u8(),
        zero: buf.get_u8(),
        start_index: buf.get_u16(),
    })
}

/// Encode an ATP request header
#[cfg(test)]
pub fn encode_atp_request(request: &AtpRequest) -> Bytes {
    let mut buf = BytesMut::with_capacity(AtpRequest::SIZE);
    buf.put_u8(request.control);
    buf.put_u8(request.bitmap);
    buf.put_u16(request.tid);
    buf.put_u8(request.function);
    buf.put_u8(request.zero);
    buf.put_u16(request.start_index);
    buf.freeze()
}

/// Encode a single-packet ATP transaction response carrying a zone list
///
/// `entries` must already be a concatenation of `[len][name]` entries.
pub fn encode_atp_zone_response(tid: u16, last_flag: u8, zone_count: u16, entries: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(ATP_RESPONSE_HEADER_SIZE + entries.len());
    buf.put_u8(atp_control::TRESP | atp_control::EOM);
    buf.put_u8(0);
    buf.put_u16(tid);
    buf.put_u8(last_flag);
    buf.put_u8(0);
    buf.put_u16(zone_count);
    buf.put_slice(entries);
    buf.freeze()
}

/// Encode a ZIP Reply or Extended Reply
///
/// `entries` must already be a concatenation of `[net][len][name]` entries.
pub fn encode_zip_reply(function: u8, count: u8, entries: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(ZIP_REPLY_HEADER_SIZE + entries.len());
    buf.put_u8(function);
    buf.put_u8(count);
    buf.put_slice(entries);
    buf.freeze()
}

/// Append a `[len][name]` entry
pub fn put_zone_entry(buf: &mut BytesMut, zone_name: &[u8]) {
    buf.put_u8(zone_name.len() as u8);
    buf.put_slice(zone_name);
}

/// Encode a `[net][len][name]` entry
pub fn network_zone_entry(network: u16, zone_name: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(3 + zone_name.len());
    buf.put_u16(network);
    put_zone_entry(&mut buf, zone_name);
    buf.freeze()
}

/// Split a concatenation of `[net][len][name]` entries
#[cfg(test)]
pub fn decode_network_zone_entries(mut data: &[u8]) -> CodecResult<Vec<(u16, Bytes)>> {
    let mut entries = Vec::new();
    while data.has_remaining() {
        if data.len() < 3 {
            return Err(CodecError::TooShort { expected: 3, actual: data.len() });
        }
        let network = data.get_u16();
        let len = data.get_u8() as usize;
        if data.len() < len {
            return Err(CodecError::TooShort { expected: len, actual: data.len() });
        }
        entries.push((network, Bytes::copy_from_slice(&data[..len])));
        data.advance(len);
    }
    Ok(entries)
}

/// Split a concatenation of `[len][name]` entries
#[cfg(test)]
pub fn decode_zone_entries(mut data: &[u8]) -> CodecResult<Vec<Bytes>> {
    let mut entries = Vec::new();
    while data.has_remaining() {
        let len = data.get_u8() as usize;
        if data.len() < len {
            return Err(CodecError::TooShort { expected: len, actual: data.len() });
        }
        entries.push(Bytes::copy_from_slice(&data[..len]));
        data.advance(len);
    }
    Ok(entries)
}
