//! Typed realtime entities decoded from GTFS-RT feed messages.
//!
//! The generated protobuf types mirror the wire format closely and leave
//! almost everything optional. This module narrows them to what the joins
//! need and records every entity that cannot be used, with the reason.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::fetch::{HttpClient, fetch_bytes};
use crate::gtfs_rt::{self, FeedMessage, TranslatedString};
use crate::parser::parse_feed;

/// Why an entity was left out of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    #[error("vehicle has no trip descriptor")]
    MissingTrip,
    #[error("vehicle has no position")]
    MissingPosition,
    #[error("alert has no active period")]
    MissingActivePeriod,
    #[error("alert has no description text")]
    MissingDescription,
    #[error("stop {0} is not in the reference data")]
    UnknownStop(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Skipped {
    pub entity_id: String,
    pub reason: SkipReason,
}

/// Per-entity outcome of a decode or join pass.
///
/// `items` keeps input order; `skipped` lists what was dropped and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    pub items: Vec<T>,
    pub skipped: Vec<Skipped>,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Batch<T> {
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn skip(&mut self, entity_id: &str, reason: SkipReason) {
        warn!(entity_id, %reason, "Skipping realtime entity");
        self.skipped.push(Skipped {
            entity_id: entity_id.to_string(),
            reason,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleEntity {
    pub entity_id: String,
    pub trip_id: String,
    pub route_id: String,
    pub latitude: f32,
    pub longitude: f32,
    pub bearing: Option<f32>,
}

/// One informed-entity selector of an alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InformedPair {
    pub route_id: String,
    /// `None` for a route-wide selector.
    pub stop_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivePeriod {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertEntity {
    pub entity_id: String,
    pub informed: Vec<InformedPair>,
    /// First active period of the alert, if any.
    pub active_period: Option<ActivePeriod>,
    pub description: Option<String>,
    pub long_description: Option<String>,
    /// Effect enum name as sent on the wire, e.g. `NO_SERVICE`.
    pub effect: String,
}

/// Extracts the vehicle entities of a feed. Other entity kinds are ignored.
pub fn decode_vehicles(feed: &FeedMessage) -> Batch<VehicleEntity> {
    let mut batch = Batch::default();

    for entity in &feed.entity {
        let Some(vehicle) = &entity.vehicle else {
            continue;
        };
        let Some(trip) = &vehicle.trip else {
            batch.skip(&entity.id, SkipReason::MissingTrip);
            continue;
        };
        let Some(position) = &vehicle.position else {
            batch.skip(&entity.id, SkipReason::MissingPosition);
            continue;
        };

        batch.push(VehicleEntity {
            entity_id: entity.id.clone(),
            trip_id: trip.trip_id.clone().unwrap_or_default(),
            route_id: trip.route_id.clone().unwrap_or_default(),
            latitude: position.latitude,
            longitude: position.longitude,
            bearing: position.bearing,
        });
    }

    batch
}

/// Extracts the alert entities of a feed, with the effect code normalized
/// to its enum name.
pub fn decode_alerts(feed: &FeedMessage) -> Batch<AlertEntity> {
    let mut batch = Batch::default();

    for entity in &feed.entity {
        let Some(alert) = &entity.alert else {
            continue;
        };

        let informed = alert
            .informed_entity
            .iter()
            .map(|selector| InformedPair {
                route_id: selector.route_id.clone().unwrap_or_default(),
                stop_id: selector.stop_id.clone(),
            })
            .collect();

        let active_period = alert.active_period.first().map(|range| ActivePeriod {
            start: range.start,
            end: range.end,
        });

        batch.push(AlertEntity {
            entity_id: entity.id.clone(),
            informed,
            active_period,
            description: first_translation(alert.description_text.as_ref()),
            long_description: first_translation(alert.tts_description_text.as_ref()),
            effect: alert.effect().as_str_name().to_string(),
        });
    }

    batch
}

fn first_translation(text: Option<&TranslatedString>) -> Option<String> {
    text?.translation.first().map(|t| t.text.clone())
}

/// Upstream endpoints for the two realtime feeds, re-fetched on every call.
pub struct RealtimeFeeds<C> {
    client: C,
    vehicles_url: String,
    alerts_url: String,
}

impl<C: HttpClient> RealtimeFeeds<C> {
    pub fn new(client: C, vehicles_url: String, alerts_url: String) -> Self {
        Self {
            client,
            vehicles_url,
            alerts_url,
        }
    }

    #[instrument(skip(self), fields(url = %self.vehicles_url))]
    pub async fn vehicles(&self) -> Result<Batch<VehicleEntity>> {
        let feed = self.fetch(&self.vehicles_url).await?;
        let batch = decode_vehicles(&feed);
        debug!(
            vehicles = batch.items.len(),
            skipped = batch.skipped.len(),
            "Vehicle feed decoded"
        );
        Ok(batch)
    }

    #[instrument(skip(self), fields(url = %self.alerts_url))]
    pub async fn alerts(&self) -> Result<Batch<AlertEntity>> {
        let feed = self.fetch(&self.alerts_url).await?;
        let batch = decode_alerts(&feed);
        debug!(alerts = batch.items.len(), "Alert feed decoded");
        Ok(batch)
    }

    async fn fetch(&self, url: &str) -> Result<gtfs_rt::FeedMessage> {
        let bytes = fetch_bytes(&self.client, url).await?;
        parse_feed(&bytes)
    }
}
