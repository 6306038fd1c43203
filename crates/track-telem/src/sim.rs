/// Simulation driver: track in, one secure datagram per densified sample out.
///
/// Densification always finishes before the first send. Sends are strictly sequential with a
/// blocking pause of one sampling interval between them, which is the only place the driver
/// waits.
use std::{path::Path, time::Duration};

use chrono::Utc;
use tracing::info;

use crate::{
    channel::{ChannelConfig, SecureChannel},
    keys::KeyStore,
    model::{Sample, SpeedSource, TrackDensifier},
    protocol::{TelemMsg, TelemetryRecord, VehicleIdentity},
    track::{load_gpx, Waypoint},
    TTResult,
};

/// Default sending interval, seconds.
pub const DEFAULT_INTERVAL_S: u32 = 1;
/// Default average vehicle speed, km/h.
pub const DEFAULT_AVG_SPEED_KMH: f64 = 60.0;

/// Blocking wait between two sends.
pub trait Pacer {
    fn pause(&mut self, interval: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Pacer for ThreadSleep {
    fn pause(&mut self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub interval_s: u32,
    pub avg_speed_kmh: f64,
    pub identity: VehicleIdentity,
}

/// Default rate and speed with a randomly drawn vehicle id.
impl Default for SimConfig {
    fn default() -> Self {
        Self::new(VehicleIdentity::random(&mut rand::thread_rng()))
    }
}

impl SimConfig {
    pub fn new(identity: VehicleIdentity) -> Self {
        Self {
            interval_s: DEFAULT_INTERVAL_S,
            avg_speed_kmh: DEFAULT_AVG_SPEED_KMH,
            identity,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_s.into())
    }
}

/// Unix epoch milliseconds, read from the wall clock.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub struct Simulation {
    config: SimConfig,
    densifier: TrackDensifier,
}

impl Simulation {
    pub fn new(config: SimConfig) -> TTResult<Self> {
        let densifier = TrackDensifier::new(config.interval_s, config.avg_speed_kmh)?;
        Ok(Self { config, densifier })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Densify the whole track up front.
    pub fn prepare<S>(&self, waypoints: &[Waypoint], speed: &mut S) -> Vec<Sample>
    where
        S: SpeedSource + ?Sized,
    {
        let samples = self.densifier.densify(waypoints, speed);
        info!(
            "Nodes created: {} from {} waypoints, sending metrics every {} seconds",
            samples.len(),
            waypoints.len(),
            self.config.interval_s
        );
        samples
    }

    /// Send one datagram per sample, in order. The first failed send aborts the run.
    pub fn transmit<P>(
        &self,
        samples: &[Sample],
        channel: &SecureChannel,
        pacer: &mut P,
    ) -> TTResult<usize>
    where
        P: Pacer + ?Sized,
    {
        for (i, sample) in samples.iter().enumerate() {
            if i > 0 {
                pacer.pause(self.config.interval());
            }
            let record = TelemetryRecord::from_sample(sample, now_millis())
                .with_identity(&self.config.identity);
            let sent = channel.send(&record)?;
            info!(
                "Sent message {}/{} ({} bytes): {:.6}, {:.6}",
                i + 1,
                samples.len(),
                sent,
                sample.lat,
                sample.lon
            );
        }
        Ok(samples.len())
    }
}

/// Full run: parse the track, densify it, open the channel and stream every sample.
/// Returns the number of datagrams sent.
pub fn run<S, P>(
    config: SimConfig,
    track: &Path,
    channel: ChannelConfig,
    keys: &dyn KeyStore,
    speed: &mut S,
    pacer: &mut P,
) -> TTResult<usize>
where
    S: SpeedSource + ?Sized,
    P: Pacer + ?Sized,
{
    info!("Welcome to the metrics sender simulator!");
    let sim = Simulation::new(config)?;
    let waypoints = load_gpx(track)?;
    info!("Parsing finished: {} waypoints. Creating nodes...", waypoints.len());
    let samples = sim.prepare(&waypoints, speed);
    let channel = channel.open(keys)?;
    sim.transmit(&samples, &channel, pacer)
}

#[cfg(test)]
mod test {
    use std::net::UdpSocket;

    use super::*;
    use crate::{keys::FixedKeyStore, lazy_init_tracing, Error};
    use tempfile::TempDir;

    struct Steady;

    impl SpeedSource for Steady {
        fn next_kmh(&mut self) -> f64 {
            60.0
        }
    }

    #[derive(Default)]
    struct CountingPacer {
        pauses: Vec<Duration>,
    }

    impl Pacer for CountingPacer {
        fn pause(&mut self, interval: Duration) {
            self.pauses.push(interval);
        }
    }

    const TRACK: &str = r#"<?xml version="1.0"?>
<gpx version="1.1" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg>
    <trkpt lat="55.0" lon="37.0"><ele>100.0</ele></trkpt>
    <trkpt lat="55.01" lon="37.0"><ele>100.0</ele></trkpt>
  </trkseg></trk>
</gpx>"#;

    fn identity() -> VehicleIdentity {
        VehicleIdentity {
            id: 7,
            vehicle_type: 1,
            model: "Toyota Corolla".into(),
        }
    }

    #[test]
    fn test_run_sends_every_sample() {
        lazy_init_tracing();
        let temp = TempDir::new().unwrap();
        let track = temp.path().join("track.gpx");
        std::fs::write(&track, TRACK).unwrap();

        let collector = UdpSocket::bind("127.0.0.1:0").unwrap();
        collector
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let addr = collector.local_addr().unwrap();

        let config = SimConfig {
            interval_s: 60,
            avg_speed_kmh: 3.6,
            identity: identity(),
        };
        let mut pacer = CountingPacer::default();
        let before = now_millis();
        let sent = run(
            config,
            &track,
            ChannelConfig::new(addr.to_string()),
            &FixedKeyStore,
            &mut Steady,
            &mut pacer,
        )
        .unwrap();
        assert_eq!(sent, 19);
        assert_eq!(pacer.pauses, vec![Duration::from_secs(60); 18]);

        let keys = crate::keys::test_key_pair();
        let sealer = crate::protocol::wire::WireSealer::new(keys.public.clone());
        let mut buf = [0u8; 1024];
        let mut last_ts = before;
        let mut last_lat = f64::MIN;
        for _ in 0..sent {
            let n = collector.recv(&mut buf).unwrap();
            assert_eq!(n, sealer.wire_len());
            let rec = sealer.open(&keys.private, &buf[..n]).unwrap();
            assert_eq!(rec.vehicle_id, 7);
            assert_eq!(rec.model(), "Toyota Corolla");
            assert!(rec.timestamp_ms >= last_ts);
            assert!(rec.lat > last_lat, "samples arrive in route order");
            last_ts = rec.timestamp_ms;
            last_lat = rec.lat;
        }
    }

    #[test]
    fn test_run_missing_port_sends_nothing() {
        let temp = TempDir::new().unwrap();
        let track = temp.path().join("track.gpx");
        std::fs::write(&track, TRACK).unwrap();
        let mut pacer = CountingPacer::default();
        let err = run(
            SimConfig::new(identity()),
            &track,
            ChannelConfig::new("127.0.0.1"),
            &FixedKeyStore,
            &mut Steady,
            &mut pacer,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingPort(_)));
        assert!(pacer.pauses.is_empty());
    }

    #[test]
    fn test_run_bad_track_aborts() {
        let temp = TempDir::new().unwrap();
        let track = temp.path().join("broken.gpx");
        std::fs::write(
            &track,
            r#"<gpx><trk><trkseg><trkpt lat="1" lon="2"/></trkseg></trk></gpx>"#,
        )
        .unwrap();
        let err = run(
            SimConfig::new(identity()),
            &track,
            ChannelConfig::new("127.0.0.1:9"),
            &FixedKeyStore,
            &mut Steady,
            &mut CountingPacer::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Track(_)));
    }

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.interval_s, DEFAULT_INTERVAL_S);
        assert_eq!(config.avg_speed_kmh, DEFAULT_AVG_SPEED_KMH);
        assert_eq!(config.interval(), Duration::from_secs(1));
        assert_eq!(config.identity.vehicle_type, VehicleIdentity::DEFAULT_TYPE);
        assert_eq!(config.identity.model, VehicleIdentity::DEFAULT_MODEL);
        assert!(Simulation::new(config).is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SimConfig::new(identity());
        config.interval_s = 0;
        assert!(matches!(
            Simulation::new(config),
            Err(Error::InvalidParameter(_))
        ));
    }
}
