/// Recorded vehicle tracks: the [`Waypoint`] model and a GPX 1.1 reader.
///
/// Only `trk/trkseg/trkpt` points are read. Every point must carry `lat`, `lon` and an `<ele>`
/// child; a single bad point fails the whole track rather than yielding a truncated one.
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::{coord::Point2d, Error, TTResult};

/// A single recorded track point. Order in a track is travel order.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    /// Elevation in meters.
    pub elevation: f64,
}

impl Waypoint {
    pub fn new(lat: f64, lon: f64, elevation: f64) -> Self {
        Self {
            lat,
            lon,
            elevation,
        }
    }

    pub fn point(&self) -> Point2d {
        Point2d(self.lat, self.lon)
    }
}

// GPX document shape, just enough of it to reach the track points.

#[derive(Debug, Deserialize)]
struct GpxDoc {
    #[serde(rename = "trk", default)]
    tracks: Vec<GpxTrack>,
}

#[derive(Debug, Deserialize)]
struct GpxTrack {
    #[serde(rename = "trkseg", default)]
    segments: Vec<GpxSegment>,
}

#[derive(Debug, Deserialize)]
struct GpxSegment {
    #[serde(rename = "trkpt", default)]
    points: Vec<GpxPoint>,
}

#[derive(Debug, Deserialize)]
struct GpxPoint {
    #[serde(rename = "@lat")]
    lat: Option<String>,
    #[serde(rename = "@lon")]
    lon: Option<String>,
    ele: Option<String>,
}

fn parse_field(idx: usize, name: &str, value: Option<&str>) -> TTResult<f64> {
    let text = value.ok_or_else(|| Error::Track(format!("trkpt #{idx}: missing {name}")))?;
    text.trim()
        .parse::<f64>()
        .map_err(|e| Error::Track(format!("trkpt #{idx}: bad {name} '{text}': {e}")))
}

impl GpxPoint {
    fn to_waypoint(&self, idx: usize) -> TTResult<Waypoint> {
        let wp = Waypoint::new(
            parse_field(idx, "lat", self.lat.as_deref())?,
            parse_field(idx, "lon", self.lon.as_deref())?,
            parse_field(idx, "ele", self.ele.as_deref())?,
        );
        wp.point().validate()?;
        Ok(wp)
    }
}

/// Parse all track points of a GPX document, in document order.
pub fn parse_gpx(xml: &str) -> TTResult<Vec<Waypoint>> {
    let doc: GpxDoc = quick_xml::de::from_str(xml).map_err(|e| Error::Track(e.to_string()))?;
    let waypoints = doc
        .tracks
        .iter()
        .flat_map(|t| t.segments.iter())
        .flat_map(|s| s.points.iter())
        .enumerate()
        .map(|(idx, pt)| pt.to_waypoint(idx))
        .collect::<TTResult<Vec<_>>>()?;
    debug!("parsed {} track points", waypoints.len());
    Ok(waypoints)
}

/// Read and parse a GPX file.
pub fn load_gpx(path: impl AsRef<Path>) -> TTResult<Vec<Waypoint>> {
    let path = path.as_ref();
    info!("Starting parsing {}", path.display());
    let xml = std::fs::read_to_string(path)?;
    parse_gpx(&xml)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lazy_init_tracing;

    const TRACK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata><name>ring road</name></metadata>
  <trk>
    <name>first</name>
    <trkseg>
      <trkpt lat="55.0" lon="37.0"><ele>100.0</ele><time>2020-01-01T00:00:00Z</time></trkpt>
      <trkpt lat="55.01" lon="37.0"><ele>101.5</ele></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="55.02" lon="37.01"><ele>99</ele></trkpt>
    </trkseg>
  </trk>
  <trk>
    <trkseg>
      <trkpt lat="-33.9" lon="151.2"><ele> 12.25 </ele></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn test_parse_gpx_document_order() {
        lazy_init_tracing();
        let wps = parse_gpx(TRACK).unwrap();
        assert_eq!(
            wps,
            vec![
                Waypoint::new(55.0, 37.0, 100.0),
                Waypoint::new(55.01, 37.0, 101.5),
                Waypoint::new(55.02, 37.01, 99.0),
                Waypoint::new(-33.9, 151.2, 12.25),
            ]
        );
    }

    #[test]
    fn test_parse_gpx_empty() {
        let xml = r#"<gpx version="1.1"><metadata/></gpx>"#;
        assert!(parse_gpx(xml).unwrap().is_empty());
    }

    #[test]
    fn test_missing_elevation_fails_whole_track() {
        let xml = r#"<gpx><trk><trkseg>
            <trkpt lat="1.0" lon="2.0"><ele>3</ele></trkpt>
            <trkpt lat="1.1" lon="2.0"></trkpt>
        </trkseg></trk></gpx>"#;
        let err = parse_gpx(xml).unwrap_err();
        assert!(matches!(err, Error::Track(ref m) if m.contains("ele")), "{err}");
    }

    #[test]
    fn test_bad_numbers_rejected() {
        let xml = r#"<gpx><trk><trkseg>
            <trkpt lat="north" lon="2.0"><ele>3</ele></trkpt>
        </trkseg></trk></gpx>"#;
        assert!(matches!(parse_gpx(xml), Err(Error::Track(_))));

        let xml = r#"<gpx><trk><trkseg>
            <trkpt lat="91.0" lon="2.0"><ele>3</ele></trkpt>
        </trkseg></trk></gpx>"#;
        assert!(matches!(parse_gpx(xml), Err(Error::InvalidCoord(_))));
    }

    #[test]
    fn test_load_gpx_missing_file() {
        let err = load_gpx("/definitely/not/here.gpx").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
