//! Row types for the five static GTFS tables and their CSV parsing.
//!
//! Columns are matched by header name, so any column order works and
//! columns not listed here are ignored. Optional text columns default to
//! an empty string when absent.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};

pub const ROUTES_FILE: &str = "routes.txt";
pub const TRIPS_FILE: &str = "trips.txt";
pub const SHAPES_FILE: &str = "shapes.txt";
pub const STOPS_FILE: &str = "stops.txt";
pub const STOP_TIMES_FILE: &str = "stop_times.txt";

/// Every file a bundle must contain.
pub const TABLE_FILES: [&str; 5] = [
    ROUTES_FILE,
    TRIPS_FILE,
    SHAPES_FILE,
    STOPS_FILE,
    STOP_TIMES_FILE,
];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Route {
    #[serde(rename = "route_id")]
    pub id: String,
    #[serde(rename = "route_short_name", default)]
    pub short_name: String,
    #[serde(rename = "route_long_name", default)]
    pub long_name: String,
    /// Hex colour without `#`, passed through unvalidated.
    #[serde(rename = "route_color", default)]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Trip {
    #[serde(rename = "trip_id")]
    pub id: String,
    pub route_id: String,
    #[serde(default)]
    pub shape_id: String,
    #[serde(rename = "trip_headsign", default)]
    pub headsign: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShapePoint {
    pub shape_id: String,
    #[serde(rename = "shape_pt_lat", deserialize_with = "lenient_f64")]
    pub lat: f64,
    #[serde(rename = "shape_pt_lon", deserialize_with = "lenient_f64")]
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Stop {
    #[serde(rename = "stop_id")]
    pub id: String,
    #[serde(rename = "stop_name", default)]
    pub name: String,
    #[serde(rename = "stop_lat", deserialize_with = "lenient_f64")]
    pub lat: f64,
    #[serde(rename = "stop_lon", deserialize_with = "lenient_f64")]
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StopTime {
    pub trip_id: String,
    pub stop_id: String,
}

/// Raw file contents of one static bundle.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub routes: Vec<u8>,
    pub trips: Vec<u8>,
    pub shapes: Vec<u8>,
    pub stops: Vec<u8>,
    pub stop_times: Vec<u8>,
}

impl Bundle {
    /// Builds a bundle by asking `read` for each table file in turn.
    /// The first failure aborts the whole bundle.
    pub fn try_from_fn(mut read: impl FnMut(&'static str) -> Result<Vec<u8>>) -> Result<Self> {
        Ok(Self {
            routes: read(ROUTES_FILE)?,
            trips: read(TRIPS_FILE)?,
            shapes: read(SHAPES_FILE)?,
            stops: read(STOPS_FILE)?,
            stop_times: read(STOP_TIMES_FILE)?,
        })
    }
}

/// The five tables parsed from one bundle, in source row order.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub routes: Vec<Route>,
    pub trips: Vec<Trip>,
    pub shapes: Vec<ShapePoint>,
    pub stops: Vec<Stop>,
    pub stop_times: Vec<StopTime>,
}

impl Tables {
    pub fn parse(bundle: &Bundle) -> Result<Self> {
        let tables = Self {
            routes: read_table(ROUTES_FILE, &bundle.routes)?,
            trips: read_table(TRIPS_FILE, &bundle.trips)?,
            shapes: read_table(SHAPES_FILE, &bundle.shapes)?,
            stops: read_table(STOPS_FILE, &bundle.stops)?,
            stop_times: read_table(STOP_TIMES_FILE, &bundle.stop_times)?,
        };
        info!(
            routes = tables.routes.len(),
            trips = tables.trips.len(),
            shape_points = tables.shapes.len(),
            stops = tables.stops.len(),
            stop_times = tables.stop_times.len(),
            "Parsed GTFS tables"
        );
        Ok(tables)
    }
}

fn read_table<T: DeserializeOwned>(name: &'static str, bytes: &[u8]) -> Result<Vec<T>> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);

    rdr.deserialize()
        .collect::<std::result::Result<Vec<T>, csv::Error>>()
        .map_err(|source| Error::Table { name, source })
}

/// Coordinates that fail to parse become NaN instead of failing the row.
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().parse().unwrap_or(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_in_any_order_with_unknown_columns() {
        let csv = b"route_color,agency_id,route_long_name,route_id,route_short_name,route_type\n\
                    FF0000,GT,Gordon,R1,1,3\n";
        let routes: Vec<Route> = read_table(ROUTES_FILE, csv).unwrap();

        assert_eq!(
            routes,
            vec![Route {
                id: "R1".to_string(),
                short_name: "1".to_string(),
                long_name: "Gordon".to_string(),
                color: "FF0000".to_string(),
            }]
        );
    }

    #[test]
    fn test_optional_columns_default_to_empty() {
        let csv = b"route_id,trip_id\nR1,T1\n";
        let trips: Vec<Trip> = read_table(TRIPS_FILE, csv).unwrap();

        assert_eq!(trips[0].id, "T1");
        assert_eq!(trips[0].route_id, "R1");
        assert_eq!(trips[0].shape_id, "");
        assert_eq!(trips[0].headsign, "");
    }

    #[test]
    fn test_missing_required_column_fails_table() {
        let csv = b"trip_id,shape_id\nT1,S1\n";
        let err = read_table::<Trip>(TRIPS_FILE, csv).unwrap_err();
        assert!(matches!(err, Error::Table { name: TRIPS_FILE, .. }));
    }

    #[test]
    fn test_bom_is_stripped_and_fields_trimmed() {
        let csv = b"\xEF\xBB\xBFstop_id, stop_name ,stop_lat,stop_lon\nS1, Main St ,43.5,-80.25\n";
        let stops: Vec<Stop> = read_table(STOPS_FILE, csv).unwrap();

        assert_eq!(stops[0].id, "S1");
        assert_eq!(stops[0].name, "Main St");
        assert_eq!(stops[0].lat, 43.5);
        assert_eq!(stops[0].lon, -80.25);
    }

    #[test]
    fn test_invalid_coordinates_become_nan() {
        let csv = b"shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence\nSH1,abc,,1\n";
        let points: Vec<ShapePoint> = read_table(SHAPES_FILE, csv).unwrap();

        assert!(points[0].lat.is_nan());
        assert!(points[0].lon.is_nan());
    }

    #[test]
    fn test_bundle_from_fn_stops_at_first_missing_file() {
        let mut asked = Vec::new();
        let result = Bundle::try_from_fn(|name| {
            asked.push(name);
            if name == SHAPES_FILE {
                Err(Error::MissingTable { name })
            } else {
                Ok(Vec::new())
            }
        });

        assert!(matches!(result, Err(Error::MissingTable { name: SHAPES_FILE })));
        assert_eq!(asked, vec![ROUTES_FILE, TRIPS_FILE, SHAPES_FILE]);
    }
}
