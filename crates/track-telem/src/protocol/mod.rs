pub mod record;
pub mod wire;

use crate::model::Sample;

pub use record::{TelemetryRecord, VehicleIdentity};

/// Trait implemented by protocols for generating telemetry messages.
pub trait TelemMsg {
    fn from_sample(sample: &Sample, timestamp_ms: i64) -> Self;
    fn with_identity(self, identity: &VehicleIdentity) -> Self;
    fn to_bytes(&self) -> Vec<u8>;
}
