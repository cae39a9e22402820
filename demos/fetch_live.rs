//! Fetch live traffic data from the HERE API and prepare every view.
//!
//! Run with: HERE_API_KEY=... cargo run --example fetch_live --features http

use chrono::Utc;
use traffic_mapper::{
    prepare_views, BoundingBox, DatasetKind, HereClient, PipelineConfig, ViewArtifact,
    ViewMode,
};

#[tokio::main]
async fn main() {
    let Ok(api_key) = std::env::var("HERE_API_KEY") else {
        eprintln!("Set HERE_API_KEY to run this example");
        return;
    };
    let client = match HereClient::new(api_key) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("Could not build client: {err}");
            return;
        }
    };

    // Berlin and surroundings.
    let region = BoundingBox::new(13.08836, 52.33812, 13.761, 52.6755);
    let config = PipelineConfig::default();

    // A failed fetch yields an empty batch; the views degrade to placeholders.
    let flow = client.fetch_flow_or_empty(&region).await;
    let flow_views = prepare_views(DatasetKind::Flow, flow, Utc::now(), &config);
    println!("Flow records: {}", flow_views.record_count());
    match flow_views.artifact(ViewMode::ClusteredDot, true) {
        ViewArtifact::Dots(layer) => {
            println!("Clustered dot view: {} markers", layer.points.len());
        }
        _ => println!("Clustered dot view: no data"),
    }

    let incidents = client.fetch_incidents_or_empty(&region).await;
    let incident_views = prepare_views(DatasetKind::Incidents, incidents, Utc::now(), &config);
    println!("Incident records (last 24h): {}", incident_views.record_count());
    match incident_views.artifact(ViewMode::Combined, true) {
        ViewArtifact::Dots(layer) => {
            println!("Combined view: {} markers", layer.points.len());
        }
        _ => println!("Combined view: no data"),
    }
}
