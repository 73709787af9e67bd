//! Device registry
//!
//! Addresses seen on the bus, in order of first sighting, with the
//! per-device state the scanner's skip heuristic needs.

use std::collections::HashMap;

use gazmodem_proto::frame::BROADCAST_ADDRESS;
use serde::Serialize;

/// How an address entered the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryPhase {
    /// Seen in passive traffic
    Sniffed,
    /// First confirmed by answering a request
    Probed,
    /// Assumed because sniffing found nothing
    Fallback,
    /// Supplied by configuration
    Configured,
}

impl std::fmt::Display for DiscoveryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DiscoveryPhase::Sniffed => "sniffed",
            DiscoveryPhase::Probed => "probed",
            DiscoveryPhase::Fallback => "fallback",
            DiscoveryPhase::Configured => "configured",
        };
        f.write_str(name)
    }
}

/// Per-device scan state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    pub address: u16,
    pub discovered_phase: DiscoveryPhase,
    /// Consecutive requests without a usable answer
    pub empty_streak: u32,
    /// Last index requested, `None` before the first request
    pub last_index: Option<u16>,
    pub parameters_found: u32,
    /// Abandoned by the skip heuristic
    pub skipped: bool,
}

impl RegistryEntry {
    fn new(address: u16, phase: DiscoveryPhase) -> Self {
        Self {
            address,
            discovered_phase: phase,
            empty_streak: 0,
            last_index: None,
            parameters_found: 0,
            skipped: false,
        }
    }
}

/// Insertion-ordered address registry owned by one session
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    entries: Vec<RegistryEntry>,
    positions: HashMap<u16, usize>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an address seen in traffic. Returns `true` if it is new.
    ///
    /// The broadcast address is never registered.
    pub fn mark_sniffed(&mut self, address: u16) -> bool {
        self.insert(address, DiscoveryPhase::Sniffed)
    }

    /// Record a successful probe. Returns `true` if the address is new.
    ///
    /// Unconfirmed fallback or configured entries are promoted to `Probed`.
    pub fn mark_probed(&mut self, address: u16) -> bool {
        if let Some(entry) = self.entry_mut(address) {
            if matches!(
                entry.discovered_phase,
                DiscoveryPhase::Fallback | DiscoveryPhase::Configured
            ) {
                entry.discovered_phase = DiscoveryPhase::Probed;
            }
            return false;
        }
        self.insert(address, DiscoveryPhase::Probed)
    }

    pub fn mark_fallback(&mut self, address: u16) -> bool {
        self.insert(address, DiscoveryPhase::Fallback)
    }

    pub fn mark_configured(&mut self, address: u16) -> bool {
        self.insert(address, DiscoveryPhase::Configured)
    }

    /// Count an empty answer. Returns the new streak.
    pub fn record_timeout(&mut self, address: u16) -> u32 {
        match self.entry_mut(address) {
            Some(entry) => {
                entry.empty_streak += 1;
                entry.empty_streak
            }
            None => 0,
        }
    }

    pub fn record_success(&mut self, address: u16) {
        if let Some(entry) = self.entry_mut(address) {
            entry.empty_streak = 0;
            entry.parameters_found += 1;
        }
    }

    pub fn record_index(&mut self, address: u16, index: u16) {
        if let Some(entry) = self.entry_mut(address) {
            entry.last_index = Some(index);
        }
    }

    pub fn mark_skipped(&mut self, address: u16) {
        if let Some(entry) = self.entry_mut(address) {
            entry.skipped = true;
        }
    }

    pub fn should_skip(&self, address: u16, threshold: u32) -> bool {
        self.entry(address)
            .map(|entry| entry.empty_streak >= threshold)
            .unwrap_or(false)
    }

    pub fn entry(&self, address: u16) -> Option<&RegistryEntry> {
        self.positions.get(&address).map(|&pos| &self.entries[pos])
    }

    /// Entry by insertion position
    pub fn get(&self, position: usize) -> Option<&RegistryEntry> {
        self.entries.get(position)
    }

    pub fn contains(&self, address: u16) -> bool {
        self.positions.contains_key(&address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Addresses in insertion order
    pub fn addresses(&self) -> Vec<u16> {
        self.entries.iter().map(|entry| entry.address).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> Vec<RegistryEntry> {
        self.entries
    }

    fn insert(&mut self, address: u16, phase: DiscoveryPhase) -> bool {
        if address == BROADCAST_ADDRESS || self.positions.contains_key(&address) {
            return false;
        }
        self.positions.insert(address, self.entries.len());
        self.entries.push(RegistryEntry::new(address, phase));
        true
    }

    fn entry_mut(&mut self, address: u16) -> Option<&mut RegistryEntry> {
        let pos = *self.positions.get(&address)?;
        self.entries.get_mut(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_insertion_order_and_dedup() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.mark_sniffed(1));
        assert!(registry.mark_sniffed(0));
        assert!(!registry.mark_sniffed(1));
        assert!(registry.mark_sniffed(32));
        assert!(!registry.mark_sniffed(BROADCAST_ADDRESS));

        assert_eq!(registry.addresses(), vec![1, 0, 32]);
        assert_eq!(registry.get(2).map(|e| e.address), Some(32));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_streak_and_skip() {
        let mut registry = DeviceRegistry::new();
        registry.mark_sniffed(1);

        for expected in 1..=3 {
            assert_eq!(registry.record_timeout(1), expected);
        }
        assert!(registry.should_skip(1, 3));
        assert!(!registry.should_skip(1, 4));

        registry.record_success(1);
        assert!(!registry.should_skip(1, 1));
        assert_eq!(registry.entry(1).unwrap().parameters_found, 1);

        // unknown addresses are never skipped
        assert!(!registry.should_skip(99, 0));
        assert_eq!(registry.record_timeout(99), 0);
    }

    #[test]
    fn test_probe_promotes_unconfirmed_entries() {
        let mut registry = DeviceRegistry::new();
        registry.mark_fallback(100);
        registry.mark_sniffed(1);

        assert!(!registry.mark_probed(100));
        assert!(!registry.mark_probed(1));
        assert!(registry.mark_probed(7));

        assert_eq!(
            registry.entry(100).unwrap().discovered_phase,
            DiscoveryPhase::Probed
        );
        assert_eq!(
            registry.entry(1).unwrap().discovered_phase,
            DiscoveryPhase::Sniffed
        );
        assert_eq!(
            registry.entry(7).unwrap().discovered_phase,
            DiscoveryPhase::Probed
        );
    }

    #[test]
    fn test_record_index() {
        let mut registry = DeviceRegistry::new();
        registry.mark_configured(5);
        assert_eq!(registry.entry(5).unwrap().last_index, None);
        registry.record_index(5, 41);
        assert_eq!(registry.entry(5).unwrap().last_index, Some(41));
    }
}
