//! Static GTFS reference data: table parsing, immutable snapshots, and the
//! store that swaps them.

pub mod snapshot;
pub mod source;
pub mod store;
pub mod tables;

pub use snapshot::Snapshot;
pub use source::{ArchiveSource, BundleSource, DirectorySource, source_for_location};
pub use store::ReferenceStore;
pub use tables::{Bundle, Route, ShapePoint, Stop, StopTime, Tables, Trip};
