//! Joins between realtime entities and the static reference data.

pub mod alerts;
pub mod time;
pub mod vehicles;

pub use alerts::{AlertView, RouteAndStopInfo, join_alerts};
pub use time::TimeFormatter;
pub use vehicles::{BusMarker, MarkerPosition, join_vehicles, join_vehicles_with};
