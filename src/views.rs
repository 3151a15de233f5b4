//! Geometry and topology views derived from one snapshot alone.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::reference::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    pub stop_name: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
    pub stop_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteData {
    pub route_id: String,
    pub route_short_name: String,
    pub route_long_name: String,
    pub route_color: String,
    pub route_stops: Vec<RouteStop>,
}

/// One polyline per distinct shape used by the route's trips, in the order
/// the trips first reference them. Empty for an unknown route.
pub fn shape_coords_for_route(snapshot: &Snapshot, route_id: &str) -> Vec<Vec<LatLng>> {
    let mut seen = HashSet::new();

    snapshot
        .trips_for_route(route_id)
        .filter(|trip| seen.insert(trip.shape_id.as_str()))
        .map(|trip| {
            snapshot
                .find_shape_points_for_shape_id(&trip.shape_id)
                .iter()
                .map(|point| LatLng {
                    lat: point.lat,
                    lng: point.lon,
                })
                .collect()
        })
        .collect()
}

/// Every route with the distinct stops any of its trips visits.
pub fn route_data(snapshot: &Snapshot) -> Vec<RouteData> {
    snapshot
        .routes()
        .iter()
        .map(|route| RouteData {
            route_id: route.id.clone(),
            route_short_name: route.short_name.clone(),
            route_long_name: route.long_name.clone(),
            route_color: route.color.clone(),
            route_stops: stops_for_route(snapshot, &route.id),
        })
        .collect()
}

fn stops_for_route(snapshot: &Snapshot, route_id: &str) -> Vec<RouteStop> {
    let mut seen = HashSet::new();
    let mut stops = Vec::new();

    for trip in snapshot.trips_for_route(route_id) {
        for stop_id in snapshot.find_stop_ids_for_trip_id(&trip.id) {
            if !seen.insert(stop_id.as_str()) {
                continue;
            }
            match snapshot.find_stop_by_id(stop_id) {
                Some(stop) => stops.push(RouteStop {
                    stop_name: stop.name.clone(),
                    stop_lat: stop.lat,
                    stop_lon: stop.lon,
                    stop_id: stop.id.clone(),
                }),
                None => debug!(route_id, stop_id, "stop_times references unknown stop"),
            }
        }
    }

    stops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{Route, ShapePoint, Stop, StopTime, Tables, Trip};

    fn trip(id: &str, route_id: &str, shape_id: &str) -> Trip {
        Trip {
            id: id.to_string(),
            route_id: route_id.to_string(),
            shape_id: shape_id.to_string(),
            headsign: String::new(),
        }
    }

    fn stop(id: &str) -> Stop {
        Stop {
            id: id.to_string(),
            name: format!("Stop {id}"),
            lat: 43.0,
            lon: -80.0,
        }
    }

    fn stop_time(trip_id: &str, stop_id: &str) -> StopTime {
        StopTime {
            trip_id: trip_id.to_string(),
            stop_id: stop_id.to_string(),
        }
    }

    fn point(shape_id: &str, lat: f64, lon: f64) -> ShapePoint {
        ShapePoint {
            shape_id: shape_id.to_string(),
            lat,
            lon,
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot::new(
            Tables {
                routes: vec![
                    Route {
                        id: "R1".to_string(),
                        short_name: "1".to_string(),
                        long_name: "Edinburgh Clockwise".to_string(),
                        color: "FF0000".to_string(),
                    },
                    Route {
                        id: "R2".to_string(),
                        short_name: "2".to_string(),
                        long_name: "West Loop".to_string(),
                        color: "0000FF".to_string(),
                    },
                ],
                trips: vec![
                    trip("T1", "R1", "SH1"),
                    trip("T2", "R1", "SH2"),
                    trip("T3", "R1", "SH1"),
                    trip("T4", "R2", "SH3"),
                ],
                shapes: vec![
                    point("SH1", 1.0, 10.0),
                    point("SH2", 3.0, 30.0),
                    point("SH1", 2.0, 20.0),
                ],
                stops: vec![stop("A"), stop("B"), stop("C")],
                stop_times: vec![
                    stop_time("T1", "A"),
                    stop_time("T1", "B"),
                    stop_time("T2", "A"),
                    stop_time("T2", "C"),
                    stop_time("T4", "MISSING"),
                ],
            },
            1,
        )
    }

    #[test]
    fn test_shape_coords_one_polyline_per_distinct_shape() {
        let coords = shape_coords_for_route(&snapshot(), "R1");

        assert_eq!(
            coords,
            vec![
                vec![LatLng { lat: 1.0, lng: 10.0 }, LatLng { lat: 2.0, lng: 20.0 }],
                vec![LatLng { lat: 3.0, lng: 30.0 }],
            ]
        );
    }

    #[test]
    fn test_shape_coords_shape_without_points_is_empty_polyline() {
        let coords = shape_coords_for_route(&snapshot(), "R2");
        assert_eq!(coords, vec![Vec::<LatLng>::new()]);
    }

    #[test]
    fn test_shape_coords_unknown_route() {
        assert!(shape_coords_for_route(&snapshot(), "R404").is_empty());
    }

    #[test]
    fn test_route_data_collapses_shared_stops() {
        let data = route_data(&snapshot());

        assert_eq!(data.len(), 2);
        assert_eq!(data[0].route_id, "R1");
        assert_eq!(data[0].route_long_name, "Edinburgh Clockwise");
        let ids: Vec<&str> = data[0].route_stops.iter().map(|s| s.stop_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_route_data_skips_unknown_stops_and_stopless_trips() {
        let data = route_data(&snapshot());
        assert!(data[1].route_stops.is_empty());
    }

    #[test]
    fn test_route_data_json_shape() {
        let data = route_data(&snapshot());
        let json = serde_json::to_value(&data[0]).unwrap();

        assert_eq!(json["routeShortName"], "1");
        assert_eq!(json["routeColor"], "FF0000");
        assert_eq!(json["routeStops"][0]["stopName"], "Stop A");
        assert_eq!(json["routeStops"][0]["stopLat"], 43.0);
        assert_eq!(json["routeStops"][0]["stopId"], "A");
    }
}
