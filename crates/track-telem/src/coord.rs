/// Coordinate types and spherical-earth navigation utilities.
///
/// All math is done on a spherical earth model of radius [`EARTH_RADIUS_M`], in double
/// precision. Near-pole singularities are not handled.
use crate::{Error, TTResult};

/// Mean earth radius used by the spherical model.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

//  _____
// |_   _|   _ _ __   ___  ___
//   | || | | | '_ \ / _ \/ __|
//   | || |_| | |_) |  __/\__ \
//   |_| \__, | .__/ \___||___/
//       |___/|_|

/// (latitude, longitude) in degrees.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Point2d(pub f64, pub f64);

impl Point2d {
    pub fn lat(&self) -> f64 {
        self.0
    }

    pub fn lon(&self) -> f64 {
        self.1
    }

    /// Validate that this point is a legal WGS 84 latitude / longitude pair.
    pub fn validate(&self) -> TTResult<()> {
        validate_lat(self.0)?;
        validate_lon(self.1)?;
        Ok(())
    }
}

/// Compass heading in degrees, always kept in [0, 360).
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Heading(pub f64);

impl Heading {
    /// Normalize any angle in degrees into [0, 360).
    pub fn normalized(deg: f64) -> Self {
        let h = (deg + 360.0) % 360.0;
        // (x + 360) % 360 can round up to exactly 360 for tiny negative inputs
        Self(if h >= 360.0 { 0.0 } else { h })
    }

    pub fn to_radians(&self) -> f64 {
        self.0.to_radians()
    }
}

impl From<Heading> for f64 {
    fn from(h: Heading) -> f64 {
        h.0
    }
}

pub fn validate_lat(lat: f64) -> TTResult<()> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(Error::InvalidCoord(format!("latitude {lat}")));
    }
    Ok(())
}

pub fn validate_lon(lon: f64) -> TTResult<()> {
    if !(-180.0..=180.0).contains(&lon) {
        return Err(Error::InvalidCoord(format!("longitude {lon}")));
    }
    Ok(())
}

//   ____                _
//  / ___| ___  ___   __| | ___  ___ _   _
// | |  _ / _ \/ _ \ / _` |/ _ \/ __| | | |
// | |_| |  __/ (_) | (_| |  __/\__ \ |_| |
//  \____|\___|\___/ \__,_|\___||___/\__, |
//                                   |___/

/// Great-circle distance in meters between two points, by the haversine formula.
pub fn great_circle_distance(p1: Point2d, p2: Point2d) -> f64 {
    let phi1 = p1.0.to_radians();
    let phi2 = p2.0.to_radians();
    let delta_phi = (p2.0 - p1.0).to_radians();
    let delta_lambda = (p2.1 - p1.1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing (forward azimuth) from `p1` towards `p2`.
pub fn initial_bearing(p1: Point2d, p2: Point2d) -> Heading {
    let phi1 = p1.0.to_radians();
    let phi2 = p2.0.to_radians();
    let delta_lambda = (p2.1 - p1.1).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();
    Heading::normalized(y.atan2(x).to_degrees())
}

/// Point reached by travelling `distance_m` from `origin` along `bearing_rad` on a great circle.
/// Inverse of [`great_circle_distance`] / [`initial_bearing`].
pub fn destination_point(origin: Point2d, bearing_rad: f64, distance_m: f64) -> Point2d {
    let phi1 = origin.0.to_radians();
    let lambda1 = origin.1.to_radians();
    let delta = distance_m / EARTH_RADIUS_M;

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * bearing_rad.cos()).asin();
    let lambda2 = lambda1
        + (bearing_rad.sin() * delta.sin() * phi1.cos())
            .atan2(delta.cos() - phi1.sin() * phi2.sin());
    Point2d(phi2.to_degrees(), lambda2.to_degrees())
}
