use serde::Serialize;
use tracing::{debug, instrument};

use crate::realtime::{Batch, VehicleEntity};
use crate::reference::Snapshot;
use crate::refresher::ReferenceData;

pub const UNKNOWN_ROUTE_NAME: &str = "?";
pub const UNKNOWN_ROUTE_COLOUR: &str = "000000";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusMarker {
    pub route_short_name: String,
    pub route_colour: String,
    pub position: MarkerPosition,
    pub headsign: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarkerPosition {
    pub latitude: f32,
    pub longitude: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f32>,
}

/// Joins vehicles against the reference data, reloading it once if any
/// vehicle names a route the current snapshot does not know.
///
/// Every vehicle produces a marker, in input order; routes still unknown
/// after the reload get the `?` / `000000` sentinels.
#[instrument(skip_all, fields(vehicles = vehicles.items.len()))]
pub async fn join_vehicles<D: ReferenceData + ?Sized>(
    data: &D,
    vehicles: &Batch<VehicleEntity>,
) -> Batch<BusMarker> {
    let mut snapshot = data.snapshot();

    let missing = vehicles
        .items
        .iter()
        .find(|v| snapshot.find_route_by_id(&v.route_id).is_none())
        .map(|v| v.route_id.clone());

    if let Some(route_id) = missing {
        debug!(route_id = %route_id, "Unknown route in vehicle feed");
        snapshot = data.refresh_on_miss().await;
    }

    join_vehicles_with(&snapshot, vehicles)
}

/// Joins against one snapshot without any reload.
pub fn join_vehicles_with(
    snapshot: &Snapshot,
    vehicles: &Batch<VehicleEntity>,
) -> Batch<BusMarker> {
    let items = vehicles
        .items
        .iter()
        .map(|vehicle| bus_marker(snapshot, vehicle))
        .collect();

    Batch {
        items,
        skipped: vehicles.skipped.clone(),
    }
}

fn bus_marker(snapshot: &Snapshot, vehicle: &VehicleEntity) -> BusMarker {
    let (route_short_name, route_colour) = match snapshot.find_route_by_id(&vehicle.route_id) {
        Some(route) => (route.short_name.clone(), route.color.clone()),
        None => (
            UNKNOWN_ROUTE_NAME.to_string(),
            UNKNOWN_ROUTE_COLOUR.to_string(),
        ),
    };

    let headsign = snapshot
        .find_trip_by_id(&vehicle.trip_id)
        .map(|trip| trip.headsign.clone())
        .unwrap_or_default();

    BusMarker {
        route_short_name,
        route_colour,
        position: MarkerPosition {
            latitude: vehicle.latitude,
            longitude: vehicle.longitude,
            bearing: vehicle.bearing,
        },
        headsign,
    }
}
