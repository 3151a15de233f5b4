use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::tables::{Route, ShapePoint, Stop, Tables, Trip};

/// One immutable, internally consistent copy of the static tables.
///
/// Id lookups go through indexes built once here; a duplicated id resolves
/// to its first row. Rows stay in source order for iteration.
#[derive(Debug)]
pub struct Snapshot {
    generation: u64,
    loaded_at: DateTime<Utc>,

    routes: Vec<Route>,
    trips: Vec<Trip>,
    stops: Vec<Stop>,

    route_index: HashMap<String, usize>,
    trip_index: HashMap<String, usize>,
    stop_index: HashMap<String, usize>,
    trips_by_route: HashMap<String, Vec<usize>>,
    shapes: HashMap<String, Vec<ShapePoint>>,
    stop_ids_by_trip: HashMap<String, Vec<String>>,
}

impl Snapshot {
    pub fn new(tables: Tables, generation: u64) -> Self {
        let Tables {
            routes,
            trips,
            shapes: shape_rows,
            stops,
            stop_times,
        } = tables;

        let route_index = first_index(routes.iter().map(|r| r.id.as_str()));
        let trip_index = first_index(trips.iter().map(|t| t.id.as_str()));
        let stop_index = first_index(stops.iter().map(|s| s.id.as_str()));

        let mut trips_by_route: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, trip) in trips.iter().enumerate() {
            trips_by_route
                .entry(trip.route_id.clone())
                .or_default()
                .push(i);
        }

        let mut shapes: HashMap<String, Vec<ShapePoint>> = HashMap::new();
        for point in shape_rows {
            shapes.entry(point.shape_id.clone()).or_default().push(point);
        }

        // Rebuilt from scratch on every load; first-seen order, no repeats.
        let mut stop_ids_by_trip: HashMap<String, Vec<String>> = HashMap::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for stop_time in stop_times {
            let key = (stop_time.trip_id, stop_time.stop_id);
            if seen.contains(&key) {
                continue;
            }
            stop_ids_by_trip
                .entry(key.0.clone())
                .or_default()
                .push(key.1.clone());
            seen.insert(key);
        }

        debug!(
            generation,
            shapes = shapes.len(),
            trips_with_stops = stop_ids_by_trip.len(),
            "Built snapshot indexes"
        );

        Self {
            generation,
            loaded_at: Utc::now(),
            routes,
            trips,
            stops,
            route_index,
            trip_index,
            stop_index,
            trips_by_route,
            shapes,
            stop_ids_by_trip,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn find_route_by_id(&self, route_id: &str) -> Option<&Route> {
        self.route_index.get(route_id).map(|&i| &self.routes[i])
    }

    pub fn find_trip_by_id(&self, trip_id: &str) -> Option<&Trip> {
        self.trip_index.get(trip_id).map(|&i| &self.trips[i])
    }

    pub fn find_stop_by_id(&self, stop_id: &str) -> Option<&Stop> {
        self.stop_index.get(stop_id).map(|&i| &self.stops[i])
    }

    /// Points of one shape in source row order; empty for an unknown id.
    pub fn find_shape_points_for_shape_id(&self, shape_id: &str) -> &[ShapePoint] {
        self.shapes.get(shape_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct stop ids served by a trip; empty for an unknown id.
    pub fn find_stop_ids_for_trip_id(&self, trip_id: &str) -> &[String] {
        self.stop_ids_by_trip
            .get(trip_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn trips(&self) -> &[Trip] {
        &self.trips
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn trips_for_route<'a>(
        &'a self,
        route_id: &str,
    ) -> impl Iterator<Item = &'a Trip> + use<'a> {
        self.trips_by_route
            .get(route_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.trips[i])
    }
}

fn first_index<'a>(ids: impl Iterator<Item = &'a str>) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for (i, id) in ids.enumerate() {
        index.entry(id.to_string()).or_insert(i);
    }
    index
}
