//! Keyed live-state store with change-triggered notification.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::engine::{AirHandler, HeatPump, TStatZoneConfig};

pub const TSTAT_KEY: &str = "tstat";
pub const BLOWER_KEY: &str = "blower";
pub const HEATPUMP_KEY: &str = "heatpump";

/// One entry of live system state. The variant doubles as the cache key,
/// so a value can never be stored under the wrong name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StateEntry {
    Thermostat(TStatZoneConfig),
    AirHandler(AirHandler),
    HeatPump(HeatPump),
}

impl StateEntry {
    pub fn key(&self) -> &'static str {
        match self {
            StateEntry::Thermostat(_) => TSTAT_KEY,
            StateEntry::AirHandler(_) => BLOWER_KEY,
            StateEntry::HeatPump(_) => HEATPUMP_KEY,
        }
    }
}

type OnChange = Box<dyn Fn(&'static str, StateEntry) + Send + Sync>;

/// Map of live state entries. Every true mutation invokes the change
/// callback exactly once; assigning a value equal to the stored one is a
/// no-op and emits nothing.
pub struct Cache {
    data: Mutex<HashMap<&'static str, StateEntry>>,
    on_change: OnChange,
}

impl Cache {
    pub fn new(on_change: OnChange) -> Self {
        Cache {
            data: Mutex::new(HashMap::new()),
            on_change,
        }
    }

    pub fn update(&self, entry: StateEntry) {
        let key = entry.key();
        let mut data = self.data.lock().unwrap();

        if data.get(key) != Some(&entry) {
            data.insert(key, entry.clone());
            (self.on_change)(key, entry);
        }
    }

    pub fn get(&self, key: &str) -> Option<StateEntry> {
        self.data.lock().unwrap().get(key).cloned()
    }

    pub fn get_air_handler(&self) -> Option<AirHandler> {
        match self.get(BLOWER_KEY) {
            Some(StateEntry::AirHandler(handler)) => Some(handler),
            _ => None,
        }
    }

    pub fn get_heat_pump(&self) -> Option<HeatPump> {
        match self.get(HEATPUMP_KEY) {
            Some(StateEntry::HeatPump(pump)) => Some(pump),
            _ => None,
        }
    }

    /// Point-in-time snapshot, independent of later mutations.
    pub fn dump(&self) -> HashMap<&'static str, StateEntry> {
        self.data.lock().unwrap().clone()
    }
}
