//! Zone Information Table (ZIT)
//!
//! Maps networks to zone names and back. Zone names are case-insensitive
//! under the AppleTalk character folding, so the first spelling added for a
//! zone is the one that is kept and reported.
//!
//! Lookups hand out snapshots in a stable order: zones in the order they were
//! first added, and per network in the order they were attached to it.

use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Longest zone name AppleTalk allows
pub const MAX_ZONE_NAME_LENGTH: usize = 32;

const ATALK_LCASE: &[u8] =
    b"abcdefghijklmnopqrstuvwxyz\x88\x8A\x8B\x8C\x8D\x8E\x96\x9A\x9B\x9F\xBE\xBF\xCF";
const ATALK_UCASE: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\xCB\x80\xCC\x81\x82\x83\x84\x85\xCD\x86\xAE\xAF\xCE";

/// Fold one byte to upper case using the Macintosh character set table
pub fn ucase_char(byte: u8) -> u8 {
    ATALK_LCASE
        .iter()
        .position(|b| *b == byte)
        .map_or(byte, |i| ATALK_UCASE[i])
}

/// Fold a zone name to upper case; the only valid way to compare zone names
pub fn ucase(name: &[u8]) -> Bytes {
    name.iter().map(|b| ucase_char(*b)).collect::<Vec<u8>>().into()
}

/// Zone table errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ZoneError {
    #[error("Zone name is empty")]
    EmptyName,

    #[error("Zone name too long: {0} bytes (max: {max})", max = MAX_ZONE_NAME_LENGTH)]
    NameTooLong(usize),
}

pub type ZoneResult<T> = Result<T, ZoneError>;

fn validate_zone_name(zone_name: &[u8]) -> ZoneResult<()> {
    if zone_name.is_empty() {
        return Err(ZoneError::EmptyName);
    }
    if zone_name.len() > MAX_ZONE_NAME_LENGTH {
        return Err(ZoneError::NameTooLong(zone_name.len()));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Tables {
    /// Zones in the order they were first added
    zone_order: Vec<Bytes>,
    zone_to_networks: HashMap<Bytes, BTreeSet<u16>>,
    network_to_zones: BTreeMap<u16, Vec<Bytes>>,
    ucased_to_zone: HashMap<Bytes, Bytes>,
}

/// Zone Information Table
#[derive(Debug, Default)]
pub struct ZoneInformationTable {
    tables: RwLock<Tables>,
}

impl ZoneInformationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add networks to a zone, adding the zone if it isn't in the table
    pub fn add_networks<I>(&self, zone_name: &[u8], networks: I) -> ZoneResult<()>
    where
        I: IntoIterator<Item = u16>,
    {
        validate_zone_name(zone_name)?;
        let ucased = ucase(zone_name);

        let mut tables = self.write();
        let existing = tables.ucased_to_zone.get(&ucased).cloned();
        let zone_name = match existing {
            Some(existing) => existing,
            None => {
                let zone_name = Bytes::copy_from_slice(zone_name);
                tables.ucased_to_zone.insert(ucased, zone_name.clone());
                tables.zone_order.push(zone_name.clone());
                zone_name
            }
        };

        for network in networks {
            tables
                .zone_to_networks
                .entry(zone_name.clone())
                .or_default()
                .insert(network);
            let zones = tables.network_to_zones.entry(network).or_default();
            if !zones.contains(&zone_name) {
                zones.push(zone_name.clone());
            }
        }
        Ok(())
    }

    /// All zones in the table
    pub fn zones(&self) -> Vec<Bytes> {
        self.read().zone_order.clone()
    }

    /// Zones of the given network
    pub fn zones_in_network(&self, network: u16) -> Vec<Bytes> {
        self.read()
            .network_to_zones
            .get(&network)
            .cloned()
            .unwrap_or_default()
    }

    /// Zones of every network in `network_min..=network_max`, each reported once
    pub fn zones_in_network_range(&self, network_min: u16, network_max: u16) -> Vec<Bytes> {
        if network_min > network_max {
            return Vec::new();
        }
        let tables = self.read();
        let mut seen = HashSet::new();
        tables
            .network_to_zones
            .range(network_min..=network_max)
            .flat_map(|(_, zones)| zones.iter())
            .filter(|zone| seen.insert((*zone).clone()))
            .cloned()
            .collect()
    }

    /// Networks in the given zone, matched case-insensitively
    pub fn networks_in_zone(&self, zone_name: &[u8]) -> Vec<u16> {
        let tables = self.read();
        tables
            .ucased_to_zone
            .get(&ucase(zone_name))
            .and_then(|zone| tables.zone_to_networks.get(zone))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every zone with its networks
    pub fn zones_and_networks(&self) -> Vec<(Bytes, Vec<u16>)> {
        let tables = self.read();
        tables
            .zone_order
            .iter()
            .map(|zone| {
                let networks = tables
                    .zone_to_networks
                    .get(zone)
                    .map(|set| set.iter().copied().collect())
                    .unwrap_or_default();
                (zone.clone(), networks)
            })
            .collect()
    }

    pub fn zone_count(&self) -> usize {
        self.read().zone_order.len()
    }
}
