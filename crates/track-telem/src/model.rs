/// Simulated vehicle movement along a recorded track.
///
/// A sparse track of [`Waypoint`]s is *densified*: between each pair of consecutive waypoints we
/// insert synthetic samples along the great circle joining them, so that the vehicle reports a
/// position roughly once per sampling interval. Every sample also carries a bearing and a noisy
/// speed reading.
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, trace};

use crate::{
    coord::{destination_point, great_circle_distance, initial_bearing, Heading, Point2d},
    track::Waypoint,
    Error, TTResult,
};

/// Mean of the simulated speedometer reading, km/h.
///
/// Fixed simulation parameter: it is deliberately *not* derived from the configured average
/// speed used to place samples along the track.
pub const SPEED_NOISE_MEAN_KMH: f64 = 60.0;
/// One-sigma of the simulated speedometer reading, km/h.
pub const SPEED_NOISE_SIGMA_KMH: f64 = 2.0;

//  _____
// |_   _|   _ _ __   ___  ___
//   | || | | | '_ \ / _ \/ __|
//   | || |_| | |_) |  __/\__ \
//   |_| \__, | .__/ \___||___/
//       |___/|_|

/// One densified track point, either an original waypoint or an interpolated one.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Sample {
    pub lat: f64,
    pub lon: f64,
    /// Elevation in meters.
    pub elevation: f64,
    /// Degrees in [0, 360).
    pub bearing: f64,
    /// Simulated instantaneous speed, km/h.
    pub speed_kmh: f64,
}

impl Sample {
    pub fn point(&self) -> Point2d {
        Point2d(self.lat, self.lon)
    }
}

/// Source of simulated speed readings, one per emitted sample.
pub trait SpeedSource {
    fn next_kmh(&mut self) -> f64;
}

/// Gaussian speedometer noise, rounded to 0.01 km/h.
pub struct NoisySpeed<R> {
    rng: R,
    dist: Normal<f64>,
}

impl<R: Rng> NoisySpeed<R> {
    /// Speed noise around [`SPEED_NOISE_MEAN_KMH`] with [`SPEED_NOISE_SIGMA_KMH`] deviation.
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            dist: Normal::new(SPEED_NOISE_MEAN_KMH, SPEED_NOISE_SIGMA_KMH)
                .expect("constant noise parameters"),
        }
    }

    pub fn with_params(rng: R, mean_kmh: f64, sigma_kmh: f64) -> TTResult<Self> {
        // Normal::new lets a negative sigma through
        if !mean_kmh.is_finite() || !(sigma_kmh.is_finite() && sigma_kmh >= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "speed noise: mean {mean_kmh}, sigma {sigma_kmh}"
            )));
        }
        let dist = Normal::new(mean_kmh, sigma_kmh)
            .map_err(|e| Error::InvalidParameter(format!("speed noise: {e}")))?;
        Ok(Self { rng, dist })
    }
}

impl<R: Rng> SpeedSource for NoisySpeed<R> {
    fn next_kmh(&mut self) -> f64 {
        // Readings never go negative, even far out in the tail.
        round_to(self.dist.sample(&mut self.rng), 2).max(0.0)
    }
}

fn round_to(x: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (x * scale).round() / scale
}

//  ____                  _  __ _
// |  _ \  ___ _ __  ___(_)/ _(_) ___ _ __
// | | | |/ _ \ '_ \/ __| | |_| |/ _ \ '__|
// | |_| |  __/ | | \__ \ |  _| |  __/ |
// |____/ \___|_| |_|___/_|_| |_|\___|_|

/// Turns a sparse track into samples spaced by a fixed sampling interval.
#[derive(Debug, Clone, Copy)]
pub struct TrackDensifier {
    interval_s: u32,
    avg_speed_kmh: f64,
}

impl TrackDensifier {
    pub fn new(interval_s: u32, avg_speed_kmh: f64) -> TTResult<Self> {
        if interval_s == 0 {
            return Err(Error::InvalidParameter(
                "sampling interval must be positive".into(),
            ));
        }
        if !(avg_speed_kmh.is_finite() && avg_speed_kmh > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "average speed must be positive, got {avg_speed_kmh} km/h"
            )));
        }
        Ok(Self {
            interval_s,
            avg_speed_kmh,
        })
    }

    /// Average speed in m/s.
    pub fn speed_mps(&self) -> f64 {
        self.avg_speed_kmh * 5.0 / 18.0
    }

    /// Densify `waypoints`. Output order is travel order; the output is never shorter than the
    /// input.
    pub fn densify<S>(&self, waypoints: &[Waypoint], speed: &mut S) -> Vec<Sample>
    where
        S: SpeedSource + ?Sized,
    {
        let speed_mps = self.speed_mps();
        let mut samples = Vec::with_capacity(waypoints.len());

        for pair in waypoints.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let distance = great_circle_distance(from.point(), to.point());
            let heading = initial_bearing(from.point(), to.point());
            let bearing = Heading::normalized(round_to(heading.0, 4)).0;
            let travel_s = distance / speed_mps;
            let steps = (travel_s / self.interval_s as f64).floor() as u64;
            trace!(
                "segment {:?} -> {:?}: {:.2} m, bearing {}, {} steps",
                from.point(),
                to.point(),
                distance,
                bearing,
                steps
            );

            samples.push(Sample {
                lat: from.lat,
                lon: from.lon,
                elevation: from.elevation,
                bearing,
                speed_kmh: speed.next_kmh(),
            });

            // j = 0 is the waypoint itself; elevation is held flat across the segment.
            for j in 1..steps {
                let Point2d(lat, lon) =
                    destination_point(from.point(), heading.to_radians(), speed_mps * j as f64);
                samples.push(Sample {
                    lat: round_to(lat, 8),
                    lon: round_to(lon, 8),
                    elevation: from.elevation,
                    bearing,
                    speed_kmh: speed.next_kmh(),
                });
            }
        }

        if let Some(last) = waypoints.last() {
            samples.push(Sample {
                lat: last.lat,
                lon: last.lon,
                elevation: last.elevation,
                ..Default::default()
            });
        }

        debug!(
            "densified {} waypoints into {} samples",
            waypoints.len(),
            samples.len()
        );
        samples
    }
}

/// Densify `waypoints` at `interval_s` second spacing for a vehicle averaging `avg_speed_kmh`.
pub fn densify<S>(
    waypoints: &[Waypoint],
    interval_s: u32,
    avg_speed_kmh: f64,
    speed: &mut S,
) -> TTResult<Vec<Sample>>
where
    S: SpeedSource + ?Sized,
{
    Ok(TrackDensifier::new(interval_s, avg_speed_kmh)?.densify(waypoints, speed))
}
