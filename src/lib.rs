pub mod config;
pub mod error;
pub mod fetch;
pub mod join;
pub mod output;
pub mod parser;
pub mod realtime;
pub mod reference;
pub mod refresher;
pub mod views;

pub use error::{Error, Result};

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
