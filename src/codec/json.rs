//! JSON device shadow codec.
//!
//! Wire layout:
//! - Config: `{"state":{"reported":{"cfg":{"gpst","act","actwt","mvres","mvt","acct"}}}}`
//! - Data: `{"state":{"reported":{"bat","dev","roam","env","gps","acc"}}}`, each
//!   entry shaped `{"v": .., "ts": unix_ms}`
//! - Batch: `{"gps":[..],"env":[..],"btn":[..],"acc":[..],"bat":[..],"roam":[..]}`
//! - Button: `{"btn":{"v":1,"ts":unix_ms}}`

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

use super::{CloudCodec, CodecResult, Encoded};
use crate::buffer::{Consumed, DataKind, Sample, TelemetryBuffers};
use crate::collab::{AgpsRequest, ClockSource};
use crate::data::{AccelSample, BatterySample, GpsSample, ModemSample, SensorSample, UiSample};
use crate::device_config::{ConfigDelta, DeviceConfig};
use crate::error::CodecError;

/// Schema version carried in the first byte of AGPS assistance payloads
pub const AGPS_SCHEMA_VERSION: u8 = 1;

#[derive(Serialize)]
struct Stamped<V> {
    v: V,
    ts: i64,
}

#[derive(Serialize)]
struct GpsValue {
    lng: f64,
    lat: f64,
    acc: f64,
    alt: f64,
    spd: f64,
    hdg: f64,
}

#[derive(Serialize)]
struct EnvValue {
    temp: f64,
    hum: f64,
}

#[derive(Serialize)]
struct AccValue {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Serialize)]
struct RoamValue {
    rsrp: u16,
    area: u32,
    mccmnc: u32,
    cell: u32,
    ip: String,
}

#[derive(Serialize)]
struct DevValue {
    band: u16,
    nw: String,
    iccid: String,
    #[serde(rename = "modV")]
    modem_version: String,
    #[serde(rename = "brdV")]
    board_version: String,
    #[serde(rename = "appV")]
    app_version: String,
}

#[derive(Serialize, Default)]
struct Reported {
    #[serde(skip_serializing_if = "Option::is_none")]
    bat: Option<Stamped<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dev: Option<Stamped<DevValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    roam: Option<Stamped<RoamValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    env: Option<Stamped<EnvValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gps: Option<Stamped<GpsValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    acc: Option<Stamped<AccValue>>,
}

#[derive(Serialize, Default)]
struct Batch {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    gps: Vec<Stamped<GpsValue>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    env: Vec<Stamped<EnvValue>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    btn: Vec<Stamped<u8>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    acc: Vec<Stamped<AccValue>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bat: Vec<Stamped<u16>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    roam: Vec<Stamped<RoamValue>>,
}

#[derive(Serialize)]
struct CfgValue {
    gpst: u32,
    act: bool,
    actwt: u32,
    mvres: u32,
    mvt: u32,
    acct: u32,
}

#[derive(Serialize)]
struct CfgReported {
    cfg: CfgValue,
}

#[derive(Serialize)]
struct ReportedState<T> {
    reported: T,
}

#[derive(Serialize)]
struct Shadow<T> {
    state: ReportedState<T>,
}

#[derive(Serialize)]
struct ButtonMessage {
    btn: Stamped<u8>,
}

#[derive(Serialize)]
struct AgpsRequestMessage<'a> {
    agps: &'a AgpsRequest,
}

fn gps_value(sample: &GpsSample) -> GpsValue {
    GpsValue {
        lng: sample.longitude,
        lat: sample.latitude,
        acc: sample.accuracy,
        alt: sample.altitude,
        spd: sample.speed,
        hdg: sample.heading,
    }
}

fn env_value(sample: &SensorSample) -> EnvValue {
    EnvValue { temp: sample.temperature, hum: sample.humidity }
}

fn acc_value(sample: &AccelSample) -> AccValue {
    let [x, y, z] = sample.values;
    AccValue { x, y, z }
}

fn roam_value(sample: &ModemSample) -> RoamValue {
    RoamValue {
        rsrp: sample.rsrp,
        area: sample.area_code,
        mccmnc: sample.mcc_mnc.trim().parse().unwrap_or(0),
        cell: sample.cell_id,
        ip: sample.ip_address.clone(),
    }
}

fn dev_value(sample: &ModemSample) -> DevValue {
    DevValue {
        band: sample.band,
        nw: sample.network_mode_label(),
        iccid: sample.iccid.clone(),
        modem_version: sample.modem_firmware.clone(),
        board_version: sample.board_version.clone(),
        app_version: sample.app_version.clone(),
    }
}

fn battery_value(sample: &BatterySample) -> u16 {
    sample.voltage_mv
}

fn button_value(sample: &UiSample) -> u8 {
    sample.button
}

fn stamp<T: Sample, V>(sample: &T, clock: &dyn ClockSource, value: V) -> CodecResult<Stamped<V>> {
    let ts = clock
        .unix_time_ms(sample.timestamp())
        .ok_or(CodecError::TimeUnavailable)?;
    Ok(Stamped { v: value, ts })
}

/// Stamped value of every queued entry of one buffer not listed in `skip`
fn collect_queued<'a, T, V, I>(
    entries: I,
    kind: DataKind,
    clock: &dyn ClockSource,
    skip: &Consumed,
    consumed: &mut Consumed,
    value: impl Fn(&T) -> V,
) -> CodecResult<Vec<Stamped<V>>>
where
    T: Sample + 'a,
    I: Iterator<Item = (usize, &'a T)>,
{
    let mut out = Vec::new();
    for (index, sample) in entries {
        if skip.contains(kind, index) {
            continue;
        }
        out.push(stamp(sample, clock, value(sample))?);
        consumed.push(kind, index);
    }
    Ok(out)
}

fn to_bytes<T: Serialize>(message: &T) -> CodecResult<Bytes> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Positive integer field; anything else counts as absent
fn positive_field(object: &Map<String, Value>, key: &str) -> Option<u32> {
    object
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|value| u32::try_from(value).ok())
}

fn bool_field(object: &Map<String, Value>, key: &str) -> Option<bool> {
    match object.get(key)? {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_i64().map(|value| value != 0),
        _ => None,
    }
}

/// Codec for the JSON device shadow contract
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl CloudCodec for JsonCodec {
    fn encode_config(&self, config: &DeviceConfig) -> CodecResult<Bytes> {
        to_bytes(&Shadow {
            state: ReportedState {
                reported: CfgReported {
                    cfg: CfgValue {
                        gpst: config.gps_timeout_s,
                        act: config.active_mode,
                        actwt: config.active_wait_s,
                        mvres: config.passive_wait_s,
                        mvt: config.movement_timeout_s,
                        acct: config.movement_threshold,
                    },
                },
            },
        })
    }

    fn decode_config(&self, payload: &[u8]) -> CodecResult<ConfigDelta> {
        let root: Value =
            serde_json::from_slice(payload).map_err(|e| CodecError::Malformed(e.to_string()))?;

        let cfg = root
            .get("cfg")
            .or_else(|| root.pointer("/state/cfg"))
            .or_else(|| root.pointer("/state/desired/cfg"))
            .and_then(Value::as_object)
            .ok_or(CodecError::NotConfig)?;

        Ok(ConfigDelta {
            active_mode: bool_field(cfg, "act"),
            active_wait_s: positive_field(cfg, "actwt"),
            passive_wait_s: positive_field(cfg, "mvres"),
            movement_timeout_s: positive_field(cfg, "mvt"),
            gps_timeout_s: positive_field(cfg, "gpst"),
            movement_threshold: positive_field(cfg, "acct"),
        })
    }

    fn encode_data(
        &self,
        buffers: &TelemetryBuffers,
        clock: &dyn ClockSource,
        include_static_modem: bool,
    ) -> CodecResult<Encoded> {
        let mut reported = Reported::default();
        let mut consumed = Consumed::new();

        let battery = buffers.battery.head_entry();
        if battery.queued {
            reported.bat = Some(stamp(battery, clock, battery_value(battery))?);
            consumed.push(DataKind::Battery, buffers.battery.head());
        }

        let modem = buffers.modem.head_entry();
        if modem.queued {
            if include_static_modem {
                reported.dev = Some(stamp(modem, clock, dev_value(modem))?);
            }
            reported.roam = Some(stamp(modem, clock, roam_value(modem))?);
            consumed.push(DataKind::Modem, buffers.modem.head());
        }

        let sensor = buffers.sensor.head_entry();
        if sensor.queued {
            reported.env = Some(stamp(sensor, clock, env_value(sensor))?);
            consumed.push(DataKind::Environmentals, buffers.sensor.head());
        }

        let gps = buffers.gps.head_entry();
        if gps.queued {
            reported.gps = Some(stamp(gps, clock, gps_value(gps))?);
            consumed.push(DataKind::Gps, buffers.gps.head());
        }

        let accel = buffers.accel.head_entry();
        if accel.queued {
            reported.acc = Some(stamp(accel, clock, acc_value(accel))?);
            consumed.push(DataKind::Accelerometer, buffers.accel.head());
        }

        if consumed.is_empty() {
            return Err(CodecError::NoData);
        }

        let payload = to_bytes(&Shadow { state: ReportedState { reported } })?;
        Ok(Encoded { payload, consumed })
    }

    fn encode_batch(
        &self,
        buffers: &TelemetryBuffers,
        clock: &dyn ClockSource,
        skip: &Consumed,
    ) -> CodecResult<Encoded> {
        let mut consumed = Consumed::new();

        let batch = Batch {
            gps: collect_queued(buffers.gps.queued(), DataKind::Gps, clock, skip, &mut consumed, gps_value)?,
            env: collect_queued(
                buffers.sensor.queued(),
                DataKind::Environmentals,
                clock,
                skip,
                &mut consumed,
                env_value,
            )?,
            btn: collect_queued(buffers.ui.queued(), DataKind::Ui, clock, skip, &mut consumed, button_value)?,
            acc: collect_queued(
                buffers.accel.queued(),
                DataKind::Accelerometer,
                clock,
                skip,
                &mut consumed,
                acc_value,
            )?,
            bat: collect_queued(
                buffers.battery.queued(),
                DataKind::Battery,
                clock,
                skip,
                &mut consumed,
                battery_value,
            )?,
            roam: collect_queued(buffers.modem.queued(), DataKind::Modem, clock, skip, &mut consumed, roam_value)?,
        };

        if consumed.is_empty() {
            return Err(CodecError::NoData);
        }

        Ok(Encoded { payload: to_bytes(&batch)?, consumed })
    }

    fn encode_ui(&self, sample: &UiSample, clock: &dyn ClockSource) -> CodecResult<Bytes> {
        to_bytes(&ButtonMessage { btn: stamp(sample, clock, button_value(sample))? })
    }

    fn encode_agps_request(&self, request: &AgpsRequest) -> CodecResult<Bytes> {
        to_bytes(&AgpsRequestMessage { agps: request })
    }

    fn decode_agps(&self, payload: &[u8]) -> CodecResult<Bytes> {
        match payload.first() {
            Some(&AGPS_SCHEMA_VERSION) => Ok(Bytes::copy_from_slice(payload)),
            _ => Err(CodecError::NotAgps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::clock::mocks::ManualClock;
    use serde_json::json;

    const EPOCH_MS: i64 = 1_600_000_000_000;

    fn parse(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    fn gps(latitude: f64, timestamp: i64) -> GpsSample {
        GpsSample {
            latitude,
            longitude: 10.5,
            accuracy: 4.0,
            altitude: 120.0,
            speed: 0.5,
            heading: 180.0,
            timestamp,
            queued: true,
        }
    }

    fn modem(timestamp: i64) -> ModemSample {
        ModemSample {
            rsrp: 45,
            area_code: 30401,
            mcc_mnc: "24201".to_string(),
            cell_id: 21679716,
            ip_address: "10.81.183.99".to_string(),
            band: 20,
            network_mode: crate::data::NetworkMode::LteM,
            gps_enabled: true,
            iccid: "8931080019073497795".to_string(),
            modem_firmware: "mfw_nrf9160_1.2.3".to_string(),
            board_version: "nrf9160dk_nrf9160".to_string(),
            app_version: "0.1.0".to_string(),
            timestamp,
            queued: true,
        }
    }

    #[test]
    fn test_encode_config() {
        let codec = JsonCodec::new();
        let bytes = codec.encode_config(&DeviceConfig::default()).unwrap();

        assert_eq!(
            parse(&bytes),
            json!({"state": {"reported": {"cfg": {
                "gpst": 60, "act": true, "actwt": 60, "mvres": 60, "mvt": 3600, "acct": 100
            }}}})
        );
    }

    #[test]
    fn test_decode_unwrapped_config() {
        let codec = JsonCodec::new();
        let delta = codec.decode_config(br#"{"cfg":{"gpst":90,"act":false}}"#).unwrap();

        assert_eq!(delta.gps_timeout_s, Some(90));
        assert_eq!(delta.active_mode, Some(false));
        assert_eq!(delta.active_wait_s, None);
    }

    #[test]
    fn test_decode_wrapped_config_ignores_unknown_fields() {
        let codec = JsonCodec::new();
        let payload = br#"{"state":{"cfg":{"actwt":300,"mvres":0,"colour":"tabby"}},"version":7}"#;
        let delta = codec.decode_config(payload).unwrap();

        assert_eq!(delta.active_wait_s, Some(300));
        assert_eq!(delta.passive_wait_s, Some(0));
        assert_eq!(delta.active_mode, None);
    }

    #[test]
    fn test_decode_desired_config_with_integer_flag() {
        let codec = JsonCodec::new();
        let delta = codec
            .decode_config(br#"{"state":{"desired":{"cfg":{"act":1,"mvt":-5,"acct":2.5}}}}"#)
            .unwrap();

        assert_eq!(delta.active_mode, Some(true));
        assert_eq!(delta.movement_timeout_s, None, "negative values are ignored");
        assert_eq!(delta.movement_threshold, None, "fractional values are ignored");
    }

    #[test]
    fn test_decode_non_config_payloads() {
        let codec = JsonCodec::new();
        assert_eq!(codec.decode_config(br#"{"state":{"reported":{}}}"#), Err(CodecError::NotConfig));
        assert!(matches!(codec.decode_config(&[0x01, 0x02]), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_encode_data_includes_queued_heads_only() {
        let codec = JsonCodec::new();
        let clock = ManualClock::synced(EPOCH_MS);
        let mut buffers = TelemetryBuffers::new();
        buffers.gps.populate(gps(59.9, 1000));
        buffers.battery.populate(BatterySample { voltage_mv: 3900, timestamp: 2000, queued: true });

        let encoded = codec.encode_data(&buffers, &clock, true).unwrap();
        let value = parse(&encoded.payload);
        let reported = &value["state"]["reported"];

        assert_eq!(reported["bat"], json!({"v": 3900, "ts": EPOCH_MS + 2000}));
        assert_eq!(reported["gps"]["v"]["lat"], json!(59.9));
        assert_eq!(reported["gps"]["ts"], json!(EPOCH_MS + 1000));
        assert!(reported.get("env").is_none());
        assert!(reported.get("dev").is_none());
        assert!(reported.get("acc").is_none());
        assert_eq!(encoded.consumed.len(), 2);
        assert!(encoded.consumed.contains(DataKind::Gps, buffers.gps.head()));
    }

    #[test]
    fn test_encode_data_static_modem_block() {
        let codec = JsonCodec::new();
        let clock = ManualClock::synced(EPOCH_MS);
        let mut buffers = TelemetryBuffers::new();
        buffers.modem.populate(modem(500));

        let first = parse(&codec.encode_data(&buffers, &clock, true).unwrap().payload);
        let dev = &first["state"]["reported"]["dev"]["v"];
        assert_eq!(dev["nw"], "LTE-M GPS");
        assert_eq!(dev["modV"], "mfw_nrf9160_1.2.3");
        assert_eq!(dev["appV"], "0.1.0");
        assert_eq!(first["state"]["reported"]["roam"]["v"]["mccmnc"], json!(24201));

        let later = parse(&codec.encode_data(&buffers, &clock, false).unwrap().payload);
        assert!(later["state"]["reported"].get("dev").is_none());
        assert!(later["state"]["reported"].get("roam").is_some());
    }

    #[test]
    fn test_encoding_consumed_head_again_yields_no_data() {
        let codec = JsonCodec::new();
        let clock = ManualClock::synced(EPOCH_MS);
        let mut buffers = TelemetryBuffers::new();
        buffers.sensor.populate(SensorSample { temperature: 21.5, humidity: 40.0, timestamp: 10, queued: true });

        let encoded = codec.encode_data(&buffers, &clock, false).unwrap();
        buffers.apply(&encoded.consumed);

        assert_eq!(codec.encode_data(&buffers, &clock, false), Err(CodecError::NoData));
    }

    #[test]
    fn test_encode_data_requires_utc() {
        let codec = JsonCodec::new();
        let clock = ManualClock::default();
        let mut buffers = TelemetryBuffers::new();
        buffers.gps.populate(gps(1.0, 1));

        assert_eq!(codec.encode_data(&buffers, &clock, false), Err(CodecError::TimeUnavailable));
    }

    #[test]
    fn test_batch_drains_queued_and_omits_empty_kinds() {
        let codec = JsonCodec::new();
        let clock = ManualClock::synced(EPOCH_MS);
        let mut buffers = TelemetryBuffers::new();
        for (i, latitude) in [1.0, 2.0, 3.0].into_iter().enumerate() {
            buffers.gps.populate(gps(latitude, i as i64 * 100));
        }

        let encoded = codec.encode_batch(&buffers, &clock, &Consumed::new()).unwrap();
        let value = parse(&encoded.payload);

        let latitudes: Vec<f64> = value["gps"]
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["v"]["lat"].as_f64().unwrap())
            .collect();
        assert_eq!(latitudes, vec![1.0, 2.0, 3.0]);
        assert!(value.get("env").is_none());
        assert_eq!(value.as_object().unwrap().len(), 1);
        assert_eq!(encoded.consumed.len(), 3);
    }

    #[test]
    fn test_batch_skips_entries_already_sent() {
        let codec = JsonCodec::new();
        let clock = ManualClock::synced(EPOCH_MS);
        let mut buffers = TelemetryBuffers::new();
        buffers.gps.populate(gps(1.0, 100));
        buffers.gps.populate(gps(2.0, 200));
        buffers.ui.populate(UiSample { button: 1, timestamp: 300, queued: true });

        let priority = codec.encode_data(&buffers, &clock, false).unwrap();
        let batch = codec.encode_batch(&buffers, &clock, &priority.consumed).unwrap();
        let value = parse(&batch.payload);

        assert_eq!(value["gps"].as_array().unwrap().len(), 1);
        assert_eq!(value["gps"][0]["v"]["lat"], json!(1.0));
        assert_eq!(value["btn"], json!([{"v": 1, "ts": EPOCH_MS + 300}]));
    }

    #[test]
    fn test_empty_batch_is_no_data() {
        let codec = JsonCodec::new();
        let clock = ManualClock::synced(EPOCH_MS);
        let buffers = TelemetryBuffers::new();
        assert_eq!(
            codec.encode_batch(&buffers, &clock, &Consumed::new()),
            Err(CodecError::NoData)
        );
    }

    #[test]
    fn test_encode_ui() {
        let codec = JsonCodec::new();
        let clock = ManualClock::synced(EPOCH_MS);
        let sample = UiSample { button: 1, timestamp: 42, queued: true };

        let value = parse(&codec.encode_ui(&sample, &clock).unwrap());
        assert_eq!(value, json!({"btn": {"v": 1, "ts": EPOCH_MS + 42}}));
    }

    #[test]
    fn test_agps_round_trip_checks() {
        let codec = JsonCodec::new();
        let request = AgpsRequest { types: vec![1, 2, 8] };
        assert_eq!(
            parse(&codec.encode_agps_request(&request).unwrap()),
            json!({"agps": {"types": [1, 2, 8]}})
        );

        assert_eq!(codec.decode_agps(&[AGPS_SCHEMA_VERSION, 0xAA]).unwrap().len(), 2);
        assert_eq!(codec.decode_agps(b"{}"), Err(CodecError::NotAgps));
        assert_eq!(codec.decode_agps(&[]), Err(CodecError::NotAgps));
    }
}
