//! The `sambus` crate is the protocol engine that bridges a Carrier
//! Infinity RS-485 control bus to a network-facing control surface. It
//! impersonates a System Access Module (SAM) on the bus: the thermostat
//! stays the authoritative controller, while this engine reads and writes
//! its tables and passively observes the other devices' traffic.
//!
//! The engine is built from a handful of cooperating pieces:
//! 1. [`Frame`] encoding/decoding with CRC-16 over a resyncable byte
//!    stream. Corrupt input costs one byte of progress; the decoder finds
//!    the next valid frame at any offset.
//! 2. A table catalog describing the fixed big-endian record layouts
//!    (setpoints, live readings, vacation, settings) and their 3-byte
//!    addresses, with zonal attributes as explicit 8-slot arrays.
//! 3. A serial transport task that owns the port, re-aligns the byte
//!    stream, and reopens the device after any I/O error.
//! 4. A broker task enforcing the bus discipline: one outstanding request,
//!    FIFO across callers, response matching by source device and echoed
//!    table address, 200 ms retransmits, five tries.
//! 5. A snoop multiplexer delivering responses from registered source
//!    address ranges (air handler, heat pump) to observers.
//! 6. A state cache plus event dispatcher: every true cache change is
//!    fanned out to subscribed [`Listener`]s with bounded queues and
//!    slow-subscriber eviction.
//!
//! [`Engine::start`] wires all of it together and is the only entry point
//! a front end needs. See the engine methods for the control surface.
//!
//! # Examples
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = sambus::Engine::start("/dev/ttyUSB0")?;
//!
//! let zone = sambus::Zone::new(1)?;
//! if let Some(config) = engine.get_config(zone).await {
//!     println!("zone 1 at {}F", config.current_temp);
//! }
//!
//! let mut listener = engine.new_listener();
//! while let Some(event) = listener.recv().await {
//!     println!("{} changed", event.source);
//! }
//! # Ok(())
//! # }
//! ```

mod broker;
mod cache;
mod dispatcher;
mod engine;
mod frame;
mod snoop;
mod tables;
mod transport;

pub use cache::{StateEntry, BLOWER_KEY, HEATPUMP_KEY, TSTAT_KEY};
pub use dispatcher::{Event, Listener};
pub use engine::{
    AirHandler, Engine, EngineError, HeatPump, TStatZoneConfig, ZoneConfigUpdate,
};
pub use frame::{Frame, FrameError, Op, DEV_SAM, DEV_TSTAT};
pub use snoop::SnoopCallback;
pub use tables::{
    raw_fan_mode_to_string, raw_mode_to_string, string_fan_mode_to_raw, string_mode_to_raw,
    Table, TableAddr, TableError, TStatCurrentParams, TStatSettings, TStatVacationParams,
    TStatZoneParams, VacationConfig, Zone, FLAG_MODE, FLAG_ZONE_COOL_SETPOINT,
    FLAG_ZONE_FAN_MODE, FLAG_ZONE_HEAT_SETPOINT, FLAG_ZONE_HOLD,
};
