//! Alert join: resolves informed routes and stops to display names and
//! prepares the text fields for the map client.
//!
//! A stop id missing from the reference data drops the whole alert, not
//! just the affected pair. A selector with no stop id at all is route-wide
//! and keeps an empty stop name.

use serde::Serialize;
use tracing::{debug, instrument};

use super::time::TimeFormatter;
use crate::realtime::{AlertEntity, Batch, InformedPair, SkipReason};
use crate::reference::Snapshot;

pub const UNKNOWN_ROUTE_LABEL: &str = "Unknown";

/// Value some producers put in the primary description when the real text
/// lives in the long-form field.
pub const PLACEHOLDER_DESCRIPTION: &str = ".";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertView {
    pub active_period: ActivePeriodView,
    pub route_and_stop_info: Vec<RouteAndStopInfo>,
    pub alert_type: String,
    pub description_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivePeriodView {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAndStopInfo {
    pub route_short_name: String,
    pub stop_name: String,
}

/// Joins each alert independently; an alert that cannot be rendered is
/// recorded in `skipped` and the rest of the batch continues.
#[instrument(
    skip_all,
    fields(alerts = alerts.items.len(), generation = snapshot.generation())
)]
pub fn join_alerts(
    snapshot: &Snapshot,
    alerts: &Batch<AlertEntity>,
    clock: &TimeFormatter,
) -> Batch<AlertView> {
    let mut out = Batch {
        items: Vec::with_capacity(alerts.items.len()),
        skipped: alerts.skipped.clone(),
    };

    for alert in &alerts.items {
        match join_alert(snapshot, alert, clock) {
            Ok(view) => out.push(view),
            Err(reason) => out.skip(&alert.entity_id, reason),
        }
    }

    debug!(
        joined = out.items.len(),
        skipped = out.skipped.len(),
        "Alert join finished"
    );
    out
}

fn join_alert(
    snapshot: &Snapshot,
    alert: &AlertEntity,
    clock: &TimeFormatter,
) -> Result<AlertView, SkipReason> {
    let period = alert.active_period.ok_or(SkipReason::MissingActivePeriod)?;

    let description_text = select_description(
        alert.description.as_deref(),
        alert.long_description.as_deref(),
    )
    .ok_or(SkipReason::MissingDescription)?;

    let route_and_stop_info = alert
        .informed
        .iter()
        .map(|pair| resolve_pair(snapshot, pair))
        .collect::<Result<Vec<_>, _>>()?;

    let format_bound = |bound: Option<u64>| {
        bound
            .map(|seconds| clock.format_unix(seconds))
            .unwrap_or_default()
    };

    Ok(AlertView {
        active_period: ActivePeriodView {
            start: format_bound(period.start),
            end: format_bound(period.end),
        },
        route_and_stop_info,
        alert_type: humanize_effect(&alert.effect),
        description_text,
    })
}

fn resolve_pair(
    snapshot: &Snapshot,
    pair: &InformedPair,
) -> Result<RouteAndStopInfo, SkipReason> {
    let route_short_name = snapshot
        .find_route_by_id(&pair.route_id)
        .map(|route| route.short_name.clone())
        .unwrap_or_else(|| UNKNOWN_ROUTE_LABEL.to_string());

    let stop_name = match &pair.stop_id {
        None => String::new(),
        Some(stop_id) => snapshot
            .find_stop_by_id(stop_id)
            .map(|stop| stop.name.clone())
            .ok_or_else(|| SkipReason::UnknownStop(stop_id.clone()))?,
    };

    Ok(RouteAndStopInfo {
        route_short_name,
        stop_name,
    })
}

/// Primary text unless it is the `"."` placeholder (or absent), in which
/// case the long-form text with line breaks flattened to single spaces.
pub fn select_description(primary: Option<&str>, long_form: Option<&str>) -> Option<String> {
    match primary {
        Some(text) if text != PLACEHOLDER_DESCRIPTION => Some(text.to_string()),
        _ => long_form.map(|text| text.replace("\r\n", " ").replace(['\n', '\r'], " ")),
    }
}

/// `NO_SERVICE` -> `NO SERVICE`.
pub fn humanize_effect(code: &str) -> String {
    code.replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{ActivePeriod, Skipped};
    use crate::reference::{Route, Stop, Tables};

    fn snapshot() -> Snapshot {
        Snapshot::new(
            Tables {
                routes: vec![Route {
                    id: "R1".to_string(),
                    short_name: "1".to_string(),
                    long_name: "Edinburgh".to_string(),
                    color: "FF0000".to_string(),
                }],
                stops: vec![Stop {
                    id: "S1".to_string(),
                    name: "Gordon at Stone".to_string(),
                    lat: 43.5,
                    lon: -80.2,
                }],
                ..Default::default()
            },
            1,
        )
    }

    fn pair(route_id: &str, stop_id: Option<&str>) -> InformedPair {
        InformedPair {
            route_id: route_id.to_string(),
            stop_id: stop_id.map(str::to_string),
        }
    }

    fn alert(id: &str, informed: Vec<InformedPair>) -> AlertEntity {
        AlertEntity {
            entity_id: id.to_string(),
            informed,
            active_period: Some(ActivePeriod {
                start: Some(1_700_000_000),
                end: Some(1_700_003_600),
            }),
            description: Some("Stop closed".to_string()),
            long_description: None,
            effect: "NO_SERVICE".to_string(),
        }
    }

    fn batch(items: Vec<AlertEntity>) -> Batch<AlertEntity> {
        Batch {
            items,
            skipped: vec![],
        }
    }

    #[test]
    fn test_alert_is_joined() {
        let views = join_alerts(
            &snapshot(),
            &batch(vec![alert("a1", vec![pair("R1", Some("S1"))])]),
            &TimeFormatter::default(),
        );

        assert!(views.skipped.is_empty());
        assert_eq!(
            views.items,
            vec![AlertView {
                active_period: ActivePeriodView {
                    start: "Nov 14, 2023, 5:13 PM".to_string(),
                    end: "Nov 14, 2023, 6:13 PM".to_string(),
                },
                route_and_stop_info: vec![RouteAndStopInfo {
                    route_short_name: "1".to_string(),
                    stop_name: "Gordon at Stone".to_string(),
                }],
                alert_type: "NO SERVICE".to_string(),
                description_text: "Stop closed".to_string(),
            }]
        );
    }

    #[test]
    fn test_unknown_route_gets_sentinel_name() {
        let views = join_alerts(
            &snapshot(),
            &batch(vec![alert("a1", vec![pair("R404", Some("S1"))])]),
            &TimeFormatter::default(),
        );

        assert_eq!(views.items[0].route_and_stop_info[0].route_short_name, "Unknown");
        assert_eq!(views.items[0].route_and_stop_info[0].stop_name, "Gordon at Stone");
    }

    #[test]
    fn test_unknown_stop_drops_whole_alert_only() {
        let views = join_alerts(
            &snapshot(),
            &batch(vec![
                alert("bad", vec![pair("R1", Some("S1")), pair("R1", Some("S404"))]),
                alert("good", vec![pair("R1", Some("S1"))]),
            ]),
            &TimeFormatter::default(),
        );

        assert_eq!(views.items.len(), 1);
        assert_eq!(views.items[0].route_and_stop_info.len(), 1);
        assert_eq!(
            views.skipped,
            vec![Skipped {
                entity_id: "bad".to_string(),
                reason: SkipReason::UnknownStop("S404".to_string()),
            }]
        );
    }

    #[test]
    fn test_route_wide_selector_has_empty_stop_name() {
        let views = join_alerts(
            &snapshot(),
            &batch(vec![alert("a1", vec![pair("R1", None)])]),
            &TimeFormatter::default(),
        );

        assert_eq!(
            views.items[0].route_and_stop_info,
            vec![RouteAndStopInfo {
                route_short_name: "1".to_string(),
                stop_name: String::new(),
            }]
        );
    }

    #[test]
    fn test_placeholder_description_falls_back_to_long_form() {
        let mut entity = alert("a1", vec![]);
        entity.description = Some(".".to_string());
        entity.long_description = Some("Detour via\nYork Rd\r\nuntil Friday".to_string());

        let views = join_alerts(&snapshot(), &batch(vec![entity]), &TimeFormatter::default());

        assert_eq!(views.items[0].description_text, "Detour via York Rd until Friday");
    }

    #[test]
    fn test_select_description() {
        assert_eq!(
            select_description(Some("Primary"), Some("Long")),
            Some("Primary".to_string())
        );
        assert_eq!(
            select_description(None, Some("a\nb")),
            Some("a b".to_string())
        );
        assert_eq!(select_description(Some("."), None), None);
        assert_eq!(select_description(None, None), None);
    }

    #[test]
    fn test_malformed_alerts_are_skipped_with_reason() {
        let mut no_period = alert("no-period", vec![]);
        no_period.active_period = None;
        let mut no_text = alert("no-text", vec![]);
        no_text.description = None;

        let views = join_alerts(
            &snapshot(),
            &batch(vec![no_period, no_text, alert("ok", vec![])]),
            &TimeFormatter::default(),
        );

        assert_eq!(views.items.len(), 1);
        let reasons: Vec<&SkipReason> = views.skipped.iter().map(|s| &s.reason).collect();
        assert_eq!(
            reasons,
            vec![&SkipReason::MissingActivePeriod, &SkipReason::MissingDescription]
        );
    }

    #[test]
    fn test_open_ended_period_renders_empty_end() {
        let mut entity = alert("a1", vec![]);
        entity.active_period = Some(ActivePeriod {
            start: Some(1_700_000_000),
            end: None,
        });

        let views = join_alerts(&snapshot(), &batch(vec![entity]), &TimeFormatter::default());

        assert_eq!(views.items[0].active_period.end, "");
    }

    #[test]
    fn test_humanize_effect() {
        assert_eq!(humanize_effect("NO_SERVICE"), "NO SERVICE");
        assert_eq!(humanize_effect("SIGNIFICANT_DELAYS"), "SIGNIFICANT DELAYS");
        assert_eq!(humanize_effect("DETOUR"), "DETOUR");
    }

    #[test]
    fn test_alert_json_shape() {
        let views = join_alerts(
            &snapshot(),
            &batch(vec![alert("a1", vec![pair("R1", Some("S1"))])]),
            &TimeFormatter::default(),
        );

        let json = serde_json::to_value(&views.items[0]).unwrap();
        assert_eq!(json["alertType"], "NO SERVICE");
        assert_eq!(json["routeAndStopInfo"][0]["stopName"], "Gordon at Stone");
        assert_eq!(json["activePeriod"]["start"], "Nov 14, 2023, 5:13 PM");
        assert_eq!(json["descriptionText"], "Stop closed");
    }
}
