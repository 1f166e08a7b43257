//! Declarative descriptions of the on-wire table layouts.
//!
//! Every record the thermostat serves lives at a fixed 3-byte table address
//! and has a fixed big-endian layout. Zonal attributes are modelled as
//! arrays of 8 parallel slots indexed by `zone - 1`, which makes the zone
//! dimension explicit instead of relying on field-name lookups.
//!
//! Writes carry a flag byte after the table address; only fields whose bits
//! are set are applied by the thermostat, so callers build a zero-initialized
//! record, set exactly the fields they mean to change, and pass the matching
//! flags.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("invalid zone: {0}")]
    InvalidZone(u8),
}

/// 3-byte address of a table block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableAddr(pub [u8; 3]);

/// One of the eight independently controllable zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone(u8);

impl Zone {
    pub fn new(zone: u8) -> Result<Zone, TableError> {
        if (1..=8).contains(&zone) {
            Ok(Zone(zone))
        } else {
            Err(TableError::InvalidZone(zone))
        }
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    /// Index into the zonal field arrays.
    pub fn index(&self) -> usize {
        self.0 as usize - 1
    }

    /// The zone's bit in the `zone_hold` bitmask.
    pub fn hold_bit(&self) -> u8 {
        1 << (self.0 - 1)
    }
}

/// A fixed-layout record at a known table address. Field order in the
/// struct declaration is the wire order; multi-byte fields are big-endian.
pub trait Table: Sized {
    const ADDR: TableAddr;

    /// Decode a record from the payload tail of a read response. Fails when
    /// the buffer is shorter than the declared layout.
    fn decode(data: &[u8]) -> Option<Self>;

    fn encode(&self) -> Vec<u8>;
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn u8(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn i8(&mut self) -> Option<i8> {
        self.u8().map(|b| b as i8)
    }

    fn u16(&mut self) -> Option<u16> {
        let hi = self.u8()?;
        let lo = self.u8()?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    fn array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Some(out)
    }

    fn zonal_u8(&mut self) -> Option<[u8; 8]> {
        self.array::<8>()
    }

    fn zonal_u16(&mut self) -> Option<[u16; 8]> {
        let mut out = [0u16; 8];
        for slot in out.iter_mut() {
            *slot = self.u16()?;
        }
        Some(out)
    }

    fn zonal_name(&mut self) -> Option<[[u8; 12]; 8]> {
        let mut out = [[0u8; 12]; 8];
        for slot in out.iter_mut() {
            *slot = self.array::<12>()?;
        }
        Some(out)
    }
}

/// Live readings and the system mode, one byte per zone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TStatCurrentParams {
    pub current_temp: [u8; 8],
    pub current_humidity: [u8; 8],
    pub unknown1: u8,
    pub outdoor_air_temp: i8,
    /// Bitflags, bit k set when zone k+1 is unoccupied.
    pub zone_unocc: u8,
    /// Low nibble is the operating mode, high three bits are the stage.
    pub mode: u8,
    pub unknown2: [u8; 5],
    pub displayed_zone: u8,
}

impl Table for TStatCurrentParams {
    const ADDR: TableAddr = TableAddr([0x00, 0x3b, 0x02]);

    fn decode(data: &[u8]) -> Option<Self> {
        let mut r = Reader::new(data);
        Some(TStatCurrentParams {
            current_temp: r.zonal_u8()?,
            current_humidity: r.zonal_u8()?,
            unknown1: r.u8()?,
            outdoor_air_temp: r.i8()?,
            zone_unocc: r.u8()?,
            mode: r.u8()?,
            unknown2: r.array::<5>()?,
            displayed_zone: r.u8()?,
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(26);
        out.extend_from_slice(&self.current_temp);
        out.extend_from_slice(&self.current_humidity);
        out.push(self.unknown1);
        out.push(self.outdoor_air_temp as u8);
        out.push(self.zone_unocc);
        out.push(self.mode);
        out.extend_from_slice(&self.unknown2);
        out.push(self.displayed_zone);
        out
    }
}

/// Per-zone configuration: fan modes, setpoints, holds, and names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TStatZoneParams {
    pub fan_mode: [u8; 8],
    /// Bitflags, bit k set when hold is active on zone k+1.
    pub zone_hold: u8,
    pub heat_setpoint: [u8; 8],
    pub cool_setpoint: [u8; 8],
    pub target_humidity: [u8; 8],
    pub fan_auto_cfg: u8,
    pub unknown: u8,
    pub hold_duration: [u16; 8],
    pub name: [[u8; 12]; 8],
}

/// Write flags for [`TStatZoneParams`].
pub const FLAG_ZONE_FAN_MODE: u8 = 0x01;
pub const FLAG_ZONE_HOLD: u8 = 0x02;
pub const FLAG_ZONE_HEAT_SETPOINT: u8 = 0x04;
pub const FLAG_ZONE_COOL_SETPOINT: u8 = 0x08;

/// Write flag for the mode field, which lives in [`TStatCurrentParams`].
pub const FLAG_MODE: u8 = 0x10;

impl Table for TStatZoneParams {
    const ADDR: TableAddr = TableAddr([0x00, 0x3b, 0x03]);

    fn decode(data: &[u8]) -> Option<Self> {
        let mut r = Reader::new(data);
        Some(TStatZoneParams {
            fan_mode: r.zonal_u8()?,
            zone_hold: r.u8()?,
            heat_setpoint: r.zonal_u8()?,
            cool_setpoint: r.zonal_u8()?,
            target_humidity: r.zonal_u8()?,
            fan_auto_cfg: r.u8()?,
            unknown: r.u8()?,
            hold_duration: r.zonal_u16()?,
            name: r.zonal_name()?,
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(147);
        out.extend_from_slice(&self.fan_mode);
        out.push(self.zone_hold);
        out.extend_from_slice(&self.heat_setpoint);
        out.extend_from_slice(&self.cool_setpoint);
        out.extend_from_slice(&self.target_humidity);
        out.push(self.fan_auto_cfg);
        out.push(self.unknown);
        for duration in &self.hold_duration {
            out.extend_from_slice(&duration.to_be_bytes());
        }
        for name in &self.name {
            out.extend_from_slice(name);
        }
        out
    }
}

/// Vacation schedule. The wire stores hours; the API speaks in days.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TStatVacationParams {
    pub active: u8,
    pub hours: u16,
    pub min_temperature: u8,
    pub max_temperature: u8,
    pub min_humidity: u8,
    pub max_humidity: u8,
    /// Matches the fan mode encoding of [`TStatZoneParams`].
    pub fan_mode: u8,
}

impl Table for TStatVacationParams {
    const ADDR: TableAddr = TableAddr([0x00, 0x3b, 0x04]);

    fn decode(data: &[u8]) -> Option<Self> {
        let mut r = Reader::new(data);
        Some(TStatVacationParams {
            active: r.u8()?,
            hours: r.u16()?,
            min_temperature: r.u8()?,
            max_temperature: r.u8()?,
            min_humidity: r.u8()?,
            max_humidity: r.u8()?,
            fan_mode: r.u8()?,
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8);
        out.push(self.active);
        out.extend_from_slice(&self.hours.to_be_bytes());
        out.push(self.min_temperature);
        out.push(self.max_temperature);
        out.push(self.min_humidity);
        out.push(self.max_humidity);
        out.push(self.fan_mode);
        out
    }
}

/// Partial vacation update; unset fields are left untouched on the
/// thermostat via the write flag byte.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VacationConfig {
    pub active: Option<bool>,
    pub days: Option<u8>,
    pub min_temperature: Option<u8>,
    pub max_temperature: Option<u8>,
    pub min_humidity: Option<u8>,
    pub max_humidity: Option<u8>,
    pub fan_mode: Option<String>,
}

impl TStatVacationParams {
    pub fn to_api(&self) -> VacationConfig {
        VacationConfig {
            active: Some(self.active == 1),
            // The wire stores days * 24; the view must divide by the same
            // factor.
            days: Some((self.hours / 24) as u8),
            min_temperature: Some(self.min_temperature),
            max_temperature: Some(self.max_temperature),
            min_humidity: Some(self.min_humidity),
            max_humidity: Some(self.max_humidity),
            fan_mode: Some(raw_fan_mode_to_string(self.fan_mode).to_string()),
        }
    }

    /// Apply a partial update, returning the write flag byte covering the
    /// fields that were set. `active` is not individually flaggable.
    pub fn apply_api(&mut self, config: &VacationConfig) -> u8 {
        let mut flags = 0u8;

        if let Some(days) = config.days {
            self.hours = u16::from(days) * 24;
            flags |= 0x02;
        }
        if let Some(min) = config.min_temperature {
            self.min_temperature = min;
            flags |= 0x04;
        }
        if let Some(max) = config.max_temperature {
            self.max_temperature = max;
            flags |= 0x08;
        }
        if let Some(min) = config.min_humidity {
            self.min_humidity = min;
            flags |= 0x10;
        }
        if let Some(max) = config.max_humidity {
            self.max_humidity = max;
            flags |= 0x20;
        }
        if let Some(mode) = &config.fan_mode {
            if let Some(raw) = string_fan_mode_to_raw(mode) {
                self.fan_mode = raw;
                flags |= 0x40;
            }
        }

        flags
    }
}

/// Installer-level thermostat settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TStatSettings {
    pub backlight_setting: u8,
    pub auto_mode: u8,
    pub unknown1: u8,
    pub dead_band: u8,
    pub cycles_per_hour: u8,
    pub schedule_periods: u8,
    pub programs_enabled: u8,
    pub temp_units: u8,
    pub unknown2: u8,
    pub dealer_name: [u8; 20],
    pub dealer_phone: [u8; 20],
}

impl Default for TStatSettings {
    fn default() -> Self {
        TStatSettings {
            backlight_setting: 0,
            auto_mode: 0,
            unknown1: 0,
            dead_band: 0,
            cycles_per_hour: 0,
            schedule_periods: 0,
            programs_enabled: 0,
            temp_units: 0,
            unknown2: 0,
            dealer_name: [0; 20],
            dealer_phone: [0; 20],
        }
    }
}

impl Table for TStatSettings {
    const ADDR: TableAddr = TableAddr([0x00, 0x3b, 0x06]);

    fn decode(data: &[u8]) -> Option<Self> {
        let mut r = Reader::new(data);
        Some(TStatSettings {
            backlight_setting: r.u8()?,
            auto_mode: r.u8()?,
            unknown1: r.u8()?,
            dead_band: r.u8()?,
            cycles_per_hour: r.u8()?,
            schedule_periods: r.u8()?,
            programs_enabled: r.u8()?,
            temp_units: r.u8()?,
            unknown2: r.u8()?,
            dealer_name: r.array::<20>()?,
            dealer_phone: r.array::<20>()?,
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(49);
        out.push(self.backlight_setting);
        out.push(self.auto_mode);
        out.push(self.unknown1);
        out.push(self.dead_band);
        out.push(self.cycles_per_hour);
        out.push(self.schedule_periods);
        out.push(self.programs_enabled);
        out.push(self.temp_units);
        out.push(self.unknown2);
        out.extend_from_slice(&self.dealer_name);
        out.extend_from_slice(&self.dealer_phone);
        out
    }
}

pub fn raw_mode_to_string(mode: u8) -> &'static str {
    match mode {
        0 => "heat",
        1 => "cool",
        2 => "auto",
        3 => "electric",
        4 => "heatpump",
        5 => "off",
        _ => "unknown",
    }
}

/// Only the modes a user can command are accepted; anything else maps
/// to off.
pub fn string_mode_to_raw(mode: &str) -> u8 {
    match mode {
        "heat" => 0,
        "cool" => 1,
        "auto" => 2,
        "off" => 5,
        _ => 5,
    }
}

pub fn raw_fan_mode_to_string(mode: u8) -> &'static str {
    match mode {
        0 => "auto",
        1 => "low",
        2 => "med",
        3 => "high",
        _ => "unknown",
    }
}

pub fn string_fan_mode_to_raw(mode: &str) -> Option<u8> {
    match mode {
        "auto" => Some(0),
        "low" => Some(1),
        "med" => Some(2),
        "high" => Some(3),
        _ => None,
    }
}
