//! Flow clustering walkthrough over a synthetic batch.
//!
//! Run with: cargo run --example flow_pipeline

use chrono::Utc;
use traffic_mapper::{
    prepare_views, DatasetKind, FlowConditions, GeoPoint, PipelineConfig, RawRecord,
    RecordDetails, ViewArtifact, ViewMode,
};

fn flow(description: &str, lat: f64, lng: f64, speed: f64, free_flow: f64, jam: f64) -> RawRecord {
    RawRecord {
        description: description.to_string(),
        position: GeoPoint::new(lat, lng),
        details: RecordDetails::Flow(FlowConditions {
            speed,
            free_flow_speed: free_flow,
            jam_factor: jam,
        }),
        source_updated: Some(Utc::now()),
    }
}

fn main() {
    // A small Berlin batch: a congested inner-city cluster and two
    // free-flowing segments further out.
    let records = vec![
        flow("Unter den Linden", 52.5170, 13.3889, 11.0, 50.0, 7.4),
        flow("Friedrichstraße", 52.5186, 13.3881, 9.5, 50.0, 8.1),
        flow("Leipziger Straße", 52.5108, 13.3846, 14.0, 50.0, 6.6),
        flow("A10 Nord", 52.6520, 13.2800, 108.0, 120.0, 0.8),
        flow("A113 Süd", 52.3960, 13.5220, 95.0, 100.0, 1.2),
    ];

    let config = PipelineConfig::default();
    let views = prepare_views(DatasetKind::Flow, records, Utc::now(), &config);

    println!("Flow Pipeline Example\n");
    println!("Total records: {}\n", views.record_count());

    for &mode in DatasetKind::Flow.view_modes() {
        for show_noise in [true, false] {
            let label = if show_noise { "with noise" } else { "without noise" };
            match views.artifact(mode, show_noise) {
                ViewArtifact::Dots(layer) => {
                    println!("{mode:?} ({label}): {} dots, centered at ({:.4}, {:.4})",
                        layer.points.len(), layer.center.lat, layer.center.lng);
                }
                ViewArtifact::Heat(layer) => {
                    println!("{mode:?} ({label}): {} heat cells", layer.cells.len());
                }
                ViewArtifact::NoData => {
                    println!("{mode:?} ({label}): no data");
                }
            }
            if !mode.uses_noise_toggle() {
                break;
            }
        }
    }

    println!("\nSeverity-ranked dots:");
    if let ViewArtifact::Dots(layer) = views.artifact(ViewMode::ClusteredDot, true) {
        for point in &layer.points {
            let location = point
                .popup
                .iter()
                .find(|(k, _)| k == "Location")
                .map(|(_, v)| v.as_str())
                .unwrap_or("?");
            println!("  {:20} ({:.4}, {:.4}) -> {}",
                location, point.position.lat, point.position.lng, point.color);
        }
    }
}
