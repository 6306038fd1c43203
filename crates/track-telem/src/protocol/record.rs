use nom::{
    bytes::complete::take,
    combinator::all_consuming,
    number::complete::{le_f64, le_i64},
    Finish, IResult,
};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::TelemMsg;
use crate::{model::Sample, TTResult};

/// Width of the vehicle model field.
pub const MODEL_LEN: usize = 16;

/// Encoded size of every [`TelemetryRecord`].
pub const RECORD_LEN: usize = 8 + 8 + MODEL_LEN + 8 + 8 * 5;

/// Fixed-layout telemetry record, one per transmitted sample.
///
/// All fields are little-endian, in declaration order:
///
/// | offset | width | field        |
/// |--------|-------|--------------|
/// | 0      | 8     | vehicle id   |
/// | 8      | 8     | vehicle type |
/// | 16     | 16    | model, ASCII, zero padded |
/// | 32     | 8     | timestamp, Unix epoch ms |
/// | 40     | 8 * 5 | lat, lon, elevation, speed (km/h), bearing (deg) as f64 |
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryRecord {
    pub vehicle_id: i64,                // 8
    pub vehicle_type: i64,              // 16
    pub vehicle_model: [u8; MODEL_LEN], // 32
    pub timestamp_ms: i64,              // 40
    pub lat: f64,                       // 48
    pub lon: f64,                       // 56
    pub elevation: f64,                 // 64
    pub speed_kmh: f64,                 // 72
    pub bearing: f64,                   // 80
}

impl TelemetryRecord {
    /// Inverse of [`TelemMsg::to_bytes`]. Input must be exactly [`RECORD_LEN`] bytes.
    pub fn parse(bytes: &[u8]) -> TTResult<Self> {
        let nom_res = all_consuming(nom_parse)(bytes);
        nom_res.finish().map(|(_, rec)| rec).map_err(|e| e.into())
    }

    /// Model name with the zero padding stripped.
    pub fn model(&self) -> String {
        let end = self
            .vehicle_model
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MODEL_LEN);
        String::from_utf8_lossy(&self.vehicle_model[..end]).into_owned()
    }
}

fn nom_parse(bytes: &[u8]) -> IResult<&[u8], TelemetryRecord> {
    let (rest, vehicle_id) = le_i64(bytes)?;
    let (rest, vehicle_type) = le_i64(rest)?;
    let (rest, model) = take(MODEL_LEN)(rest)?;
    let (rest, timestamp_ms) = le_i64(rest)?;
    let (rest, lat) = le_f64(rest)?;
    let (rest, lon) = le_f64(rest)?;
    let (rest, elevation) = le_f64(rest)?;
    let (rest, speed_kmh) = le_f64(rest)?;
    let (rest, bearing) = le_f64(rest)?;
    Ok((
        rest,
        TelemetryRecord {
            vehicle_id,
            vehicle_type,
            vehicle_model: model.try_into().expect("fixed width model field"),
            timestamp_ms,
            lat,
            lon,
            elevation,
            speed_kmh,
            bearing,
        },
    ))
}

/// Pack a model name into the fixed ASCII field. Longer names are truncated, non-ASCII bytes
/// become `?`.
pub fn model_field(model: &str) -> [u8; MODEL_LEN] {
    let mut field = [0u8; MODEL_LEN];
    for (dst, src) in field.iter_mut().zip(model.bytes()) {
        *dst = if src.is_ascii() { src } else { b'?' };
    }
    field
}

impl TelemMsg for TelemetryRecord {
    fn from_sample(sample: &Sample, timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            lat: sample.lat,
            lon: sample.lon,
            elevation: sample.elevation,
            speed_kmh: sample.speed_kmh,
            bearing: sample.bearing,
            ..Default::default()
        }
    }

    fn with_identity(mut self, identity: &VehicleIdentity) -> Self {
        self.vehicle_id = identity.id;
        self.vehicle_type = identity.vehicle_type;
        self.vehicle_model = model_field(&identity.model);
        self
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RECORD_LEN);
        buf.extend_from_slice(&self.vehicle_id.to_le_bytes());
        buf.extend_from_slice(&self.vehicle_type.to_le_bytes());
        buf.extend_from_slice(&self.vehicle_model);
        buf.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        for v in [
            self.lat,
            self.lon,
            self.elevation,
            self.speed_kmh,
            self.bearing,
        ] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }
}

/// Session-constant identity of the simulated vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleIdentity {
    pub id: i64,
    pub vehicle_type: i64,
    pub model: String,
}

impl VehicleIdentity {
    pub const DEFAULT_TYPE: i64 = 1;
    pub const DEFAULT_MODEL: &'static str = "Toyota Corolla";

    const ID_MEAN: f64 = 148_822_899_220.0;
    const ID_SIGMA: f64 = 1e9;

    /// Default vehicle with an id drawn around a fixed fleet base number.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let dist = Normal::new(Self::ID_MEAN, Self::ID_SIGMA).expect("constant id distribution");
        Self {
            id: dist.sample(rng).round() as i64,
            vehicle_type: Self::DEFAULT_TYPE,
            model: Self::DEFAULT_MODEL.to_string(),
        }
    }
}
