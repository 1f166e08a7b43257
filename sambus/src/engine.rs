//! The composed protocol engine and its control surface.
//!
//! [`Engine::start`] owns the whole stack: the serial transport task, the
//! broker task, the dispatcher task, and a one-second poller that keeps the
//! thermostat entry of the cache fresh. Front ends (HTTP or otherwise) hold
//! a single `Engine` reference and speak only through its methods; nothing
//! else may touch the wire.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

use crate::broker::{Broker, BrokerHandle, FrameRouter, RESPONSE_QUEUE_DEPTH};
use crate::cache::{Cache, StateEntry};
use crate::dispatcher::{Dispatcher, Listener};
use crate::frame::DEV_TSTAT;
use crate::snoop::{SnoopCallback, SnoopList};
use crate::tables::{
    raw_fan_mode_to_string, raw_mode_to_string, string_fan_mode_to_raw, string_mode_to_raw, Table,
    TableAddr, TStatCurrentParams, TStatSettings, TStatVacationParams, TStatZoneParams,
    VacationConfig, Zone, FLAG_MODE, FLAG_ZONE_COOL_SETPOINT, FLAG_ZONE_FAN_MODE,
    FLAG_ZONE_HEAT_SETPOINT, FLAG_ZONE_HOLD,
};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("serial port error")]
    Serial(#[from] tokio_serial::Error),
}

/// One zone of the thermostat's view, as served to clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TStatZoneConfig {
    pub temp_unit: String,
    pub current_temp: u8,
    pub current_humidity: u8,
    pub outdoor_temp: i8,
    pub mode: String,
    pub stage: u8,
    pub fan_mode: String,
    pub hold: Option<bool>,
    pub heat_setpoint: u8,
    pub cool_setpoint: u8,
    pub raw_mode: u8,
}

/// Air handler telemetry, collected purely by snooping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirHandler {
    #[serde(rename = "blowerRPM")]
    pub blower_rpm: u16,
    #[serde(rename = "airFlowCFM")]
    pub air_flow_cfm: u16,
    #[serde(rename = "elecHeat")]
    pub elec_heat: bool,
}

/// Heat pump telemetry, collected purely by snooping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatPump {
    pub temp_unit: String,
    pub coil_temp: f32,
    pub outside_temp: f32,
    pub stage: u8,
}

/// Partial zone update; unset fields are left alone on the thermostat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneConfigUpdate {
    pub fan_mode: Option<String>,
    pub hold: Option<bool>,
    pub heat_setpoint: Option<u8>,
    pub cool_setpoint: Option<u8>,
    pub mode: Option<String>,
}

pub struct Engine {
    broker: BrokerHandle,
    cache: Arc<Cache>,
    dispatcher: Dispatcher,
    snoops: Arc<SnoopList>,
    transport_task: tokio::task::JoinHandle<()>,
    broker_task: tokio::task::JoinHandle<()>,
    poller_task: tokio::task::JoinHandle<()>,
}

impl Engine {
    /// Open the serial device and bring up the transport, broker,
    /// dispatcher and poller tasks. Must be called from within a tokio
    /// runtime. Fails only when the initial port open fails; later serial
    /// trouble is handled by the transport's reopen loop.
    pub fn start(device: &str) -> Result<Engine, EngineError> {
        let dispatcher = Dispatcher::new();

        let events = dispatcher.handle();
        let cache = Arc::new(Cache::new(Box::new(move |source, data| {
            events.broadcast(source, data);
        })));
        // Seed the entries the UI renders immediately.
        cache.update(StateEntry::AirHandler(AirHandler::default()));
        cache.update(StateEntry::HeatPump(HeatPump::default()));

        let snoops = Arc::new(SnoopList::new());
        attach_snoops(&snoops, &cache);

        let (response_tx, response_rx) = mpsc::channel(RESPONSE_QUEUE_DEPTH);
        let router = FrameRouter::new(response_tx, snoops.clone());
        let (transport, transport_task) = crate::transport::SerialTransport::start(device, router)?;

        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let broker = BrokerHandle::new(action_tx);
        let broker_task = tokio::spawn(Broker::new(action_rx, response_rx, transport).run());

        let poller_task = tokio::spawn(poller(broker.clone(), cache.clone()));

        Ok(Engine {
            broker,
            cache,
            dispatcher,
            snoops,
            transport_task,
            broker_task,
            poller_task,
        })
    }

    /// Fresh-from-the-bus view of one zone. Two table reads; `None` on
    /// protocol timeout.
    pub async fn get_config(&self, zone: Zone) -> Option<TStatZoneConfig> {
        fetch_zone_config(&self.broker, zone).await
    }

    pub async fn get_tstat_settings(&self) -> Option<TStatSettings> {
        self.broker.read_table(DEV_TSTAT).await
    }

    pub fn get_air_handler(&self) -> Option<AirHandler> {
        self.cache.get_air_handler()
    }

    pub fn get_heat_pump(&self) -> Option<HeatPump> {
        self.cache.get_heat_pump()
    }

    pub async fn get_vacation(&self) -> Option<VacationConfig> {
        let params: TStatVacationParams = self.broker.read_table(DEV_TSTAT).await?;
        Some(params.to_api())
    }

    pub async fn set_vacation(&self, config: &VacationConfig) -> bool {
        let mut params = TStatVacationParams::default();
        let flags = params.apply_api(config);
        self.broker.write_table(DEV_TSTAT, &params, flags).await
    }

    /// Apply a partial zone update the way the thermostat expects it:
    /// setpoints and fan mode in one zone-params write, hold via a
    /// read-modify-write of the shared bitmask, mode through the current
    /// params table.
    pub async fn update_zone(&self, zone: Zone, update: &ZoneConfigUpdate) -> bool {
        update_zone(&self.broker, zone, update).await
    }

    /// Write an arbitrary catalog record to the thermostat; `flags`
    /// selects the effective fields.
    pub async fn update_thermostat<T: Table>(&self, record: &T, flags: u8) -> bool {
        self.broker.write_table(DEV_TSTAT, record, flags).await
    }

    /// Raw read of any table on any device, for exploration.
    pub async fn read_raw(&self, device: u16, table: [u8; 3]) -> Option<Vec<u8>> {
        self.broker.read_raw(device, TableAddr(table)).await
    }

    /// Observe responses from a source address range. Registration is
    /// additive and lives for the life of the engine.
    pub fn snoop_response(&self, src_min: u16, src_max: u16, callback: SnoopCallback) {
        self.snoops.register(src_min, src_max, callback);
    }

    pub fn new_listener(&self) -> Listener {
        self.dispatcher.handle().new_listener()
    }

    pub fn cache_dump(&self) -> HashMap<&'static str, StateEntry> {
        self.cache.dump()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.poller_task.abort();
        self.broker_task.abort();
        self.transport_task.abort();
    }
}

/// Keep the thermostat cache entry fresh; every true change fans out to
/// listeners through the dispatcher.
async fn poller(broker: BrokerHandle, cache: Arc<Cache>) {
    let mut ticker = interval(Duration::from_secs(1));

    loop {
        ticker.tick().await;
        if let Some(config) = fetch_zone_config(&broker, Zone::new(1).unwrap()).await {
            cache.update(StateEntry::Thermostat(config));
        }
    }
}

pub(crate) async fn fetch_zone_config(broker: &BrokerHandle, zone: Zone) -> Option<TStatZoneConfig> {
    let cfg: TStatZoneParams = broker.read_table(DEV_TSTAT).await?;
    let params: TStatCurrentParams = broker.read_table(DEV_TSTAT).await?;

    Some(TStatZoneConfig {
        temp_unit: String::new(),
        current_temp: params.current_temp[zone.index()],
        current_humidity: params.current_humidity[zone.index()],
        outdoor_temp: params.outdoor_air_temp,
        mode: raw_mode_to_string(params.mode & 0x0f).to_string(),
        stage: params.mode >> 5,
        fan_mode: raw_fan_mode_to_string(cfg.fan_mode[zone.index()]).to_string(),
        hold: Some(cfg.zone_hold & zone.hold_bit() != 0),
        heat_setpoint: cfg.heat_setpoint[zone.index()],
        cool_setpoint: cfg.cool_setpoint[zone.index()],
        raw_mode: params.mode,
    })
}

pub(crate) async fn update_zone(
    broker: &BrokerHandle,
    zone: Zone,
    update: &ZoneConfigUpdate,
) -> bool {
    let mut params = TStatZoneParams::default();
    let mut flags = 0u8;

    if let Some(mode) = &update.fan_mode {
        match string_fan_mode_to_raw(mode) {
            Some(raw) => {
                params.fan_mode[zone.index()] = raw;
                flags |= FLAG_ZONE_FAN_MODE;
            }
            None => log::warn!("ignoring unknown fan mode: {mode}"),
        }
    }

    if let Some(hold) = update.hold {
        // Hold is a bitmask shared by all zones; read it back first so the
        // other zones' bits survive the write.
        let Some(prior) = broker.read_table::<TStatZoneParams>(DEV_TSTAT).await else {
            return false;
        };
        params.zone_hold = prior.zone_hold;
        if hold {
            params.zone_hold |= zone.hold_bit();
        } else {
            params.zone_hold &= !zone.hold_bit();
        }
        flags |= FLAG_ZONE_HOLD;
    }

    if let Some(setpoint) = update.heat_setpoint {
        params.heat_setpoint[zone.index()] = setpoint;
        flags |= FLAG_ZONE_HEAT_SETPOINT;
    }

    if let Some(setpoint) = update.cool_setpoint {
        params.cool_setpoint[zone.index()] = setpoint;
        flags |= FLAG_ZONE_COOL_SETPOINT;
    }

    let mut ok = true;
    if flags != 0 {
        ok = broker.write_table(DEV_TSTAT, &params, flags).await;
    }

    if let Some(mode) = &update.mode {
        let current = TStatCurrentParams {
            mode: string_mode_to_raw(mode),
            ..TStatCurrentParams::default()
        };
        ok &= broker.write_table(DEV_TSTAT, &current, FLAG_MODE).await;
    }

    ok
}

/// Register the air handler and heat pump observers. The byte offsets are
/// literal positions within the snooped response payloads.
pub(crate) fn attach_snoops(snoops: &SnoopList, cache: &Arc<Cache>) {
    let pump_cache = cache.clone();
    snoops.register(
        0x5000,
        0x51ff,
        Box::new(move |frame| {
            if let Some(mut pump) = pump_cache.get_heat_pump() {
                apply_heat_pump_frame(&mut pump, &frame.data);
                pump_cache.update(StateEntry::HeatPump(pump));
            }
        }),
    );

    let handler_cache = cache.clone();
    snoops.register(
        0x4000,
        0x42ff,
        Box::new(move |frame| {
            if let Some(mut handler) = handler_cache.get_air_handler() {
                apply_air_handler_frame(&mut handler, &frame.data);
                handler_cache.update(StateEntry::AirHandler(handler));
            }
        }),
    );
}

fn apply_heat_pump_frame(pump: &mut HeatPump, payload: &[u8]) {
    let Some(data) = payload.get(3..) else {
        return;
    };

    match &payload[..3] {
        [0x00, 0x3e, 0x01] if data.len() >= 4 => {
            pump.outside_temp = f32::from(u16::from_be_bytes([data[0], data[1]])) / 16.0;
            pump.coil_temp = f32::from(u16::from_be_bytes([data[2], data[3]])) / 16.0;
            log::debug!(
                "heat pump outside temp {} coil temp {}",
                pump.outside_temp,
                pump.coil_temp
            );
        }
        [0x00, 0x3e, 0x02] if !data.is_empty() => {
            pump.stage = data[0] >> 1;
            log::debug!("heat pump stage {}", pump.stage);
        }
        _ => {}
    }
}

fn apply_air_handler_frame(handler: &mut AirHandler, payload: &[u8]) {
    let Some(data) = payload.get(3..) else {
        return;
    };

    match &payload[..3] {
        [0x00, 0x03, 0x06] if data.len() >= 3 => {
            handler.blower_rpm = u16::from_be_bytes([data[1], data[2]]);
            log::debug!("blower RPM {}", handler.blower_rpm);
        }
        [0x00, 0x03, 0x16] if data.len() >= 6 => {
            handler.air_flow_cfm = u16::from_be_bytes([data[4], data[5]]);
            handler.elec_heat = data[0] & 0x03 != 0;
            log::debug!("air flow {} CFM", handler.air_flow_cfm);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Action;
    use crate::frame::{Frame, Op, DEV_SAM};
    use crate::transport::{TransportHandle, TxRequest};
    use std::sync::Mutex;

    #[test]
    fn heat_pump_temperature_frame() {
        let mut pump = HeatPump::default();
        // 00 3e 01, outside 0x0140 (20.0F), coil 0x0280 (40.0F)
        apply_heat_pump_frame(&mut pump, &[0x00, 0x3e, 0x01, 0x01, 0x40, 0x02, 0x80]);
        assert_eq!(pump.outside_temp, 20.0);
        assert_eq!(pump.coil_temp, 40.0);

        apply_heat_pump_frame(&mut pump, &[0x00, 0x3e, 0x02, 0x06]);
        assert_eq!(pump.stage, 3);
    }

    #[test]
    fn json_field_names_match_the_wire_contract() {
        let handler = AirHandler {
            blower_rpm: 850,
            air_flow_cfm: 500,
            elec_heat: false,
        };
        assert_eq!(
            serde_json::to_string(&handler).unwrap(),
            r#"{"blowerRPM":850,"airFlowCFM":500,"elecHeat":false}"#
        );

        let pump = HeatPump::default();
        let json = serde_json::to_value(&pump).unwrap();
        assert!(json.get("coilTemp").is_some());
        assert!(json.get("outsideTemp").is_some());
        assert!(json.get("tempUnit").is_some());

        let config = TStatZoneConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("currentTemp").is_some());
        assert!(json.get("heatSetpoint").is_some());
        assert!(json.get("rawMode").is_some());
    }

    #[test]
    fn air_handler_frames() {
        let mut handler = AirHandler::default();
        apply_air_handler_frame(&mut handler, &[0x00, 0x03, 0x06, 0xaa, 0x03, 0x52]);
        assert_eq!(handler.blower_rpm, 850);

        apply_air_handler_frame(
            &mut handler,
            &[0x00, 0x03, 0x16, 0x01, 0x00, 0x00, 0x00, 0x01, 0xf4, 0x00],
        );
        assert_eq!(handler.air_flow_cfm, 500);
        assert!(handler.elec_heat);

        // Unrelated table address leaves everything alone.
        apply_air_handler_frame(&mut handler, &[0x00, 0x03, 0x07, 0xff, 0xff, 0xff]);
        assert_eq!(handler.blower_rpm, 850);
    }

    #[test]
    fn snooped_frames_update_the_cache() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let log = events.clone();
        let cache = Arc::new(Cache::new(Box::new(move |source, _| {
            log.lock().unwrap().push(source);
        })));
        cache.update(StateEntry::HeatPump(HeatPump::default()));
        cache.update(StateEntry::AirHandler(AirHandler::default()));
        events.lock().unwrap().clear();

        let snoops = SnoopList::new();
        attach_snoops(&snoops, &cache);

        snoops.handle(&Frame {
            src: 0x5001,
            dst: 0x2001,
            op: Op::Ack06,
            data: vec![0x00, 0x3e, 0x01, 0x01, 0x40, 0x02, 0x80],
        });

        let pump = cache.get_heat_pump().unwrap();
        assert_eq!(pump.coil_temp, 40.0);
        assert_eq!(pump.outside_temp, 20.0);
        assert_eq!(events.lock().unwrap().as_slice(), &["heatpump"]);

        // The same readings again change nothing, so no second event.
        snoops.handle(&Frame {
            src: 0x5001,
            dst: 0x2001,
            op: Op::Ack06,
            data: vec![0x00, 0x3e, 0x01, 0x01, 0x40, 0x02, 0x80],
        });
        assert_eq!(events.lock().unwrap().len(), 1);

        // An air handler frame lands in the other entry.
        snoops.handle(&Frame {
            src: 0x4001,
            dst: 0x2001,
            op: Op::Ack06,
            data: vec![0x00, 0x03, 0x06, 0xaa, 0x03, 0x52],
        });
        assert_eq!(cache.get_air_handler().unwrap().blower_rpm, 850);
    }

    struct FakeBus {
        handle: BrokerHandle,
        response_tx: mpsc::Sender<Frame>,
        wire: mpsc::UnboundedReceiver<Vec<u8>>,
    }

    fn fake_bus() -> FakeBus {
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<TxRequest>();
        let (bytes_tx, wire) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(req) = write_rx.recv().await {
                bytes_tx.send(req.bytes).ok();
                if let Some(done) = req.done {
                    done.send(true).ok();
                }
            }
        });

        let (action_tx, action_rx) = mpsc::unbounded_channel::<Action>();
        let (response_tx, response_rx) = mpsc::channel(RESPONSE_QUEUE_DEPTH);
        tokio::spawn(Broker::new(action_rx, response_rx, TransportHandle::new(write_tx)).run());

        FakeBus {
            handle: BrokerHandle::new(action_tx),
            response_tx,
            wire,
        }
    }

    fn read_response<T: Table>(record: &T) -> Frame {
        let mut data = T::ADDR.0.to_vec();
        data.extend_from_slice(&[0x00, 0x00, 0x00]);
        data.extend_from_slice(&record.encode());
        Frame {
            src: DEV_TSTAT,
            dst: DEV_SAM,
            op: Op::Ack06,
            data,
        }
    }

    fn write_ack_response() -> Frame {
        Frame {
            src: DEV_TSTAT,
            dst: DEV_SAM,
            op: Op::Ack06,
            data: vec![0x00],
        }
    }

    #[tokio::test]
    async fn zone_config_is_assembled_from_two_reads() {
        let FakeBus {
            handle,
            response_tx,
            mut wire,
        } = fake_bus();

        let server = tokio::spawn(async move {
            let req = Frame::decode(&wire.recv().await.unwrap()).unwrap();
            assert_eq!(req.op, Op::ReadTableBlock);
            assert_eq!(req.data, TStatZoneParams::ADDR.0.to_vec());
            let mut cfg = TStatZoneParams::default();
            cfg.zone_hold = 0x01;
            cfg.fan_mode[0] = 2;
            cfg.heat_setpoint[0] = 66;
            cfg.cool_setpoint[0] = 75;
            response_tx.send(read_response(&cfg)).await.unwrap();

            let req = Frame::decode(&wire.recv().await.unwrap()).unwrap();
            assert_eq!(req.data, TStatCurrentParams::ADDR.0.to_vec());
            let mut params = TStatCurrentParams::default();
            params.current_temp[0] = 72;
            params.current_humidity[0] = 41;
            params.outdoor_air_temp = -5;
            params.mode = 0x21; // stage 1, cool
            response_tx.send(read_response(&params)).await.unwrap();
        });

        let config = fetch_zone_config(&handle, Zone::new(1).unwrap())
            .await
            .unwrap();
        server.await.unwrap();

        assert_eq!(config.current_temp, 72);
        assert_eq!(config.current_humidity, 41);
        assert_eq!(config.outdoor_temp, -5);
        assert_eq!(config.mode, "cool");
        assert_eq!(config.stage, 1);
        assert_eq!(config.fan_mode, "med");
        assert_eq!(config.hold, Some(true));
        assert_eq!(config.heat_setpoint, 66);
        assert_eq!(config.cool_setpoint, 75);
        assert_eq!(config.raw_mode, 0x21);
    }

    #[tokio::test]
    async fn heat_setpoint_update_writes_a_sparse_record() {
        let FakeBus {
            handle,
            response_tx,
            mut wire,
        } = fake_bus();

        let server = tokio::spawn(async move {
            let req = Frame::decode(&wire.recv().await.unwrap()).unwrap();
            assert_eq!(req.op, Op::WriteTableBlock);
            assert_eq!(
                &req.data[..6],
                &[0x00, 0x3b, 0x03, 0x00, 0x00, FLAG_ZONE_HEAT_SETPOINT]
            );
            let record = TStatZoneParams::decode(&req.data[6..]).unwrap();
            let mut expected = TStatZoneParams::default();
            expected.heat_setpoint[2] = 68;
            assert_eq!(record, expected);
            response_tx.send(write_ack_response()).await.unwrap();
        });

        let update = ZoneConfigUpdate {
            heat_setpoint: Some(68),
            ..ZoneConfigUpdate::default()
        };
        assert!(update_zone(&handle, Zone::new(3).unwrap(), &update).await);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn hold_update_preserves_other_zones() {
        let FakeBus {
            handle,
            response_tx,
            mut wire,
        } = fake_bus();

        let server = tokio::spawn(async move {
            // The engine reads the bitmask before writing it back.
            let req = Frame::decode(&wire.recv().await.unwrap()).unwrap();
            assert_eq!(req.op, Op::ReadTableBlock);
            let mut prior = TStatZoneParams::default();
            prior.zone_hold = 0x12; // zones 2 and 5 held
            response_tx.send(read_response(&prior)).await.unwrap();

            let req = Frame::decode(&wire.recv().await.unwrap()).unwrap();
            assert_eq!(req.op, Op::WriteTableBlock);
            assert_eq!(&req.data[..6], &[0x00, 0x3b, 0x03, 0x00, 0x00, FLAG_ZONE_HOLD]);
            let record = TStatZoneParams::decode(&req.data[6..]).unwrap();
            assert_eq!(record.zone_hold, 0x16);
            response_tx.send(write_ack_response()).await.unwrap();
        });

        let update = ZoneConfigUpdate {
            hold: Some(true),
            ..ZoneConfigUpdate::default()
        };
        assert!(update_zone(&handle, Zone::new(3).unwrap(), &update).await);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn mode_update_goes_through_current_params() {
        let FakeBus {
            handle,
            response_tx,
            mut wire,
        } = fake_bus();

        let server = tokio::spawn(async move {
            let req = Frame::decode(&wire.recv().await.unwrap()).unwrap();
            assert_eq!(req.op, Op::WriteTableBlock);
            assert_eq!(&req.data[..6], &[0x00, 0x3b, 0x02, 0x00, 0x00, FLAG_MODE]);
            let record = TStatCurrentParams::decode(&req.data[6..]).unwrap();
            assert_eq!(record.mode, 1);
            response_tx.send(write_ack_response()).await.unwrap();
        });

        let update = ZoneConfigUpdate {
            mode: Some("cool".to_string()),
            ..ZoneConfigUpdate::default()
        };
        assert!(update_zone(&handle, Zone::new(1).unwrap(), &update).await);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn vacation_update_writes_days_as_hours() {
        let FakeBus {
            handle,
            response_tx,
            mut wire,
        } = fake_bus();

        let server = tokio::spawn(async move {
            let req = Frame::decode(&wire.recv().await.unwrap()).unwrap();
            assert_eq!(req.op, Op::WriteTableBlock);
            assert_eq!(&req.data[..6], &[0x00, 0x3b, 0x04, 0x00, 0x00, 0x02]);
            let record = TStatVacationParams::decode(&req.data[6..]).unwrap();
            assert_eq!(record.hours, 48);
            response_tx.send(write_ack_response()).await.unwrap();
        });

        let mut params = TStatVacationParams::default();
        let flags = params.apply_api(&VacationConfig {
            days: Some(2),
            ..VacationConfig::default()
        });
        assert!(handle.write_table(DEV_TSTAT, &params, flags).await);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn failed_read_fails_the_hold_update() {
        let FakeBus {
            handle,
            response_tx,
            wire: _wire,
        } = fake_bus();
        // No responder: the prior-params read times out, so the update
        // reports failure without writing anything.
        drop(response_tx);

        let update = ZoneConfigUpdate {
            hold: Some(false),
            ..ZoneConfigUpdate::default()
        };
        assert!(!update_zone(&handle, Zone::new(2).unwrap(), &update).await);
    }
}
