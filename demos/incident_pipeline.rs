//! Incident pipeline walkthrough: trailing-window filtering, criticality
//! coloring and the noise toggle.
//!
//! Run with: cargo run --example incident_pipeline

use chrono::{Duration, Utc};
use traffic_mapper::{
    prepare_views, Criticality, DatasetKind, GeoPoint, IncidentInfo, PipelineConfig,
    RawRecord, RecordDetails, ViewArtifact, ViewMode,
};

fn incident(
    description: &str,
    lat: f64,
    lng: f64,
    criticality: Option<Criticality>,
    hours_ago_start: i64,
    hours_ago_end: i64,
) -> RawRecord {
    let now = Utc::now();
    RawRecord {
        description: description.to_string(),
        position: GeoPoint::new(lat, lng),
        details: RecordDetails::Incident(IncidentInfo {
            criticality,
            incident_type: "accident".to_string(),
            start_time: Some(now - Duration::hours(hours_ago_start)),
            end_time: Some(now - Duration::hours(hours_ago_end)),
            road_closed: false,
        }),
        source_updated: Some(now),
    }
}

fn main() {
    let records = vec![
        incident("Accident on A100", 52.5000, 13.3000, Some(Criticality::Major), 3, 1),
        incident("Lane closed, Potsdamer Platz", 52.5096, 13.3760, Some(Criticality::Moderate), 5, 2),
        incident("Breakdown, Alexanderplatz", 52.5219, 13.4132, Some(Criticality::Minor), 2, 1),
        // Cleared more than a day ago; the window filter drops it.
        incident("Old roadworks", 52.5400, 13.3500, Some(Criticality::Minor), 30, 25),
    ];

    let config = PipelineConfig::default();
    let views = prepare_views(DatasetKind::Incidents, records, Utc::now(), &config);

    println!("Incident Pipeline Example\n");
    println!("Records in window: {} (1 stale record dropped)\n", views.record_count());

    for show_noise in [true, false] {
        let label = if show_noise { "with" } else { "without" };
        if let ViewArtifact::Dots(layer) = views.artifact(ViewMode::Combined, show_noise) {
            println!("Combined view {label} noise: {} dots", layer.points.len());
            for point in &layer.points {
                let criticality = point
                    .popup
                    .iter()
                    .find(|(k, _)| k == "Criticality")
                    .map(|(_, v)| v.as_str())
                    .unwrap_or("?");
                println!("  {:30} criticality={:9} color={}",
                    point.popup[0].1, criticality, point.color);
            }
        }
    }
}
