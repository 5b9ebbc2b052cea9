use crate::core::{CanId, Payload, SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A vehicle action the generator can simulate (horn, brake, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualEvent {
    pub name: String,
    pub id: CanId,
    pub on_data: Payload,
    pub off_data: Payload,
}

impl VirtualEvent {
    /// When no off pattern is given the first byte of `on_data` is zeroed
    pub fn new(name: impl Into<String>, id: CanId, on_data: Payload, off_data: Option<Payload>) -> Self {
        let off_data = off_data.unwrap_or_else(|| {
            let mut bytes = on_data.as_bytes().to_vec();
            if let Some(first) = bytes.first_mut() {
                *first = 0;
            }
            Payload::new(&bytes).unwrap_or(on_data)
        });
        Self {
            name: name.into(),
            id,
            on_data,
            off_data,
        }
    }
}

/// Named events plus the set currently switched on
#[derive(Debug, Clone, Default)]
pub struct EventCatalog {
    events: BTreeMap<String, VirtualEvent>,
    active: BTreeSet<String>,
}

const DEFAULT_EVENTS: &[(&str, &str, &str, &str)] = &[
    ("Horn", "0x1A2", "AAFFBBCC00000000", "00FFBBCC00000000"),
    ("AC", "0x1F3", "00AAFF1100000000", "0000FF1100000000"),
    ("Headlights", "0x2B4", "FF00000000000000", "0000000000000000"),
    ("Turn Signal Left", "0x3C5", "AA00000000000000", "0000000000000000"),
    ("Turn Signal Right", "0x3C6", "BB00000000000000", "0000000000000000"),
    ("Brake", "0x4D7", "FFAA000000000000", "00AA000000000000"),
    ("Door Lock", "0x5E8", "11223344AABBCCDD", "11223344AABB0000"),
    ("Window Down", "0x6F9", "ABCDEF0000000000", "ABCDEF0000000000"),
];

impl EventCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with the stock vehicle events
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        for (name, id, on, off) in DEFAULT_EVENTS {
            if let (Ok(id), Ok(on), Ok(off)) = (
                id.parse::<CanId>(),
                on.parse::<Payload>(),
                off.parse::<Payload>(),
            ) {
                catalog.insert(VirtualEvent::new(*name, id, on, Some(off)));
            }
        }
        catalog
    }

    /// Add or replace an event definition
    pub fn insert(&mut self, event: VirtualEvent) {
        tracing::info!(event = %event.name, id = %event.id, "vehicle event registered");
        self.events.insert(event.name.clone(), event);
    }

    pub fn get(&self, name: &str) -> SimResult<&VirtualEvent> {
        self.events
            .get(name)
            .ok_or_else(|| SimError::UnknownEvent(name.to_string()))
    }

    /// Mark active; returns the event so its `on` frame can be published
    pub fn activate(&mut self, name: &str) -> SimResult<VirtualEvent> {
        let event = self.get(name)?.clone();
        self.active.insert(event.name.clone());
        Ok(event)
    }

    /// Returns the event if it was active, `None` if it was already off
    pub fn deactivate(&mut self, name: &str) -> SimResult<Option<VirtualEvent>> {
        let event = self.get(name)?.clone();
        Ok(self.active.remove(name).then_some(event))
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    /// Active events in name order
    pub fn active_events(&self) -> Vec<&VirtualEvent> {
        self.active.iter().filter_map(|name| self.events.get(name)).collect()
    }

    pub fn list(&self) -> Vec<&VirtualEvent> {
        self.events.values().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_loaded() {
        let catalog = EventCatalog::with_defaults();
        assert_eq!(catalog.len(), DEFAULT_EVENTS.len());
        assert_eq!(catalog.get("Horn").unwrap().id.raw(), 0x1A2);
    }

    #[test]
    fn test_default_off_pattern_zeroes_first_byte() {
        let event = VirtualEvent::new(
            "Wipers",
            CanId::new(0x321).unwrap(),
            "FF01".parse().unwrap(),
            None,
        );
        assert_eq!(event.off_data.to_hex(), "0001");
    }

    #[test]
    fn test_activate_deactivate() {
        let mut catalog = EventCatalog::with_defaults();
        catalog.activate("Brake").unwrap();
        assert!(catalog.is_active("Brake"));
        assert_eq!(catalog.active_events().len(), 1);

        assert!(catalog.deactivate("Brake").unwrap().is_some());
        assert!(catalog.deactivate("Brake").unwrap().is_none());
        assert!(matches!(catalog.activate("Nope"), Err(SimError::UnknownEvent(_))));
    }
}
