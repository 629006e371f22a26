//! Zone-list fragmentation
//!
//! Zone lists are unbounded but a DDP payload is not. These helpers split a
//! list into payloads that each stand alone as a valid reply.

use bytes::{BufMut, Bytes, BytesMut};

use super::{
    encode_zip_reply, network_zone_entry, put_zone_entry, zip_func, ATP_RESPONSE_HEADER_SIZE,
    ZIP_REPLY_HEADER_SIZE,
};

/// Build the payloads answering a ZIP Query.
///
/// `zones` holds `(network, zone name)` pairs in reply order. When everything
/// fits in one payload the result is a single Reply whose count byte is
/// `requested_networks`, the number of networks asked about, not the number
/// of entries returned. Otherwise each network's entries are packed into as
/// many Extended Replies as needed, each carrying that network's total zone
/// count. An entry is never split across payloads.
pub fn query_reply_payloads(
    requested_networks: u8,
    zones: &[(u16, Bytes)],
    max_len: usize,
) -> Vec<Bytes> {
    let entries: Vec<(u16, Bytes)> = zones
        .iter()
        .map(|(network, zone_name)| (*network, network_zone_entry(*network, zone_name)))
        .collect();

    let total: usize = entries.iter().map(|(_, entry)| entry.len()).sum();
    if total + ZIP_REPLY_HEADER_SIZE <= max_len {
        let mut buf = BytesMut::with_capacity(total);
        for (_, entry) in &entries {
            buf.put_slice(entry);
        }
        return vec![encode_zip_reply(zip_func::REPLY, requested_networks, &buf)];
    }

    // group by network, keeping first-appearance order
    let mut groups: Vec<(u16, Vec<Bytes>)> = Vec::new();
    for (network, entry) in entries {
        match groups.iter_mut().find(|(n, _)| *n == network) {
            Some((_, list)) => list.push(entry),
            None => groups.push((network, vec![entry])),
        }
    }

    let budget = max_len.saturating_sub(ZIP_REPLY_HEADER_SIZE);
    let mut payloads = Vec::new();
    for (_, list) in groups {
        let zone_count = u8::try_from(list.len()).unwrap_or(u8::MAX);
        let mut buf = BytesMut::with_capacity(budget);
        for entry in list {
            if !buf.is_empty() && buf.len() + entry.len() > budget {
                payloads.push(encode_zip_reply(zip_func::EXT_REPLY, zone_count, &buf));
                buf.clear();
            }
            buf.put_slice(&entry);
        }
        if !buf.is_empty() {
            payloads.push(encode_zip_reply(zip_func::EXT_REPLY, zone_count, &buf));
        }
    }
    payloads
}

/// One page of an ATP zone-list response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneListPage {
    /// Concatenated `[len][name]` entries
    pub entries: Bytes,
    /// Number of entries on this page
    pub zone_count: u16,
    /// No zones remain after this page
    pub last: bool,
}

impl ZoneListPage {
    /// Collect the page starting at the 1-relative `start_index`.
    ///
    /// An index of 0 is treated as 1.
    pub fn collect<I>(zones: I, start_index: u16, max_len: usize) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        let zones = zones.into_iter().skip(start_index.saturating_sub(1) as usize);

        let mut buf = BytesMut::new();
        let mut zone_count = 0u16;
        let mut last = true;
        for zone_name in zones {
            if ATP_RESPONSE_HEADER_SIZE + buf.len() + 1 + zone_name.len() > max_len {
                last = false;
                break;
            }
            put_zone_entry(&mut buf, &zone_name);
            zone_count += 1;
        }

        Self {
            entries: buf.freeze(),
            zone_count,
            last,
        }
    }

    /// Value of the ATP "last flag" user byte
    pub fn last_flag(&self) -> u8 {
        u8::from(self.last)
    }
}
