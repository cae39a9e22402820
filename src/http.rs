//! HTTP feed client for the HERE Traffic API v7.
//!
//! Fetches flow and incident records for a bounding region using a pooled
//! client with a bounded timeout. The pipeline treats an empty batch as
//! valid input, so the `*_or_empty` wrappers log a failed fetch and hand
//! back an empty record set instead of an error. No retry logic lives here.
//!
//! Payload decoding goes through an explicit schema: every field the feed
//! may omit is optional, with its default applied in one place during
//! conversion to [`RawRecord`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    Criticality, FlowConditions, GeoPoint, IncidentInfo, RawRecord, RecordDetails,
};

const BASE_URL: &str = "https://data.traffic.hereapi.com/v7";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const UNKNOWN_LOCATION: &str = "Unknown Location";

/// Fetch region, serialized as `west,south,east,north` for the feed's
/// `in=bbox:` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self { west, south, east, north }
    }

    /// Coordinate list in the feed's bbox order.
    pub fn to_query(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

/// Why a feed request failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to decode feed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Client for the HERE traffic endpoints.
pub struct HereClient {
    client: Client,
    api_key: String,
}

impl HereClient {
    /// Create a client with connection pooling and a bounded timeout.
    pub fn new(api_key: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }

    /// Fetch flow records for a region.
    pub async fn fetch_flow(&self, region: &BoundingBox) -> Result<Vec<RawRecord>, FetchError> {
        let payload: FlowResponse = self.get_json("flow", region).await?;
        let records = flow_records(payload);
        info!("fetched {} flow records", records.len());
        Ok(records)
    }

    /// Fetch incident records for a region.
    pub async fn fetch_incidents(
        &self,
        region: &BoundingBox,
    ) -> Result<Vec<RawRecord>, FetchError> {
        let payload: IncidentResponse = self.get_json("incidents", region).await?;
        let records = incident_records(payload);
        info!("fetched {} incident records", records.len());
        Ok(records)
    }

    /// Like [`fetch_flow`](Self::fetch_flow), but a failure logs and yields
    /// an empty batch, which the pipeline serves as placeholders.
    pub async fn fetch_flow_or_empty(&self, region: &BoundingBox) -> Vec<RawRecord> {
        match self.fetch_flow(region).await {
            Ok(records) => records,
            Err(err) => {
                warn!("flow fetch failed: {err}");
                Vec::new()
            }
        }
    }

    /// Like [`fetch_incidents`](Self::fetch_incidents), with the same
    /// empty-batch fallback.
    pub async fn fetch_incidents_or_empty(&self, region: &BoundingBox) -> Vec<RawRecord> {
        match self.fetch_incidents(region).await {
            Ok(records) => records,
            Err(err) => {
                warn!("incident fetch failed: {err}");
                Vec::new()
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        region: &BoundingBox,
    ) -> Result<T, FetchError> {
        let url = format!("{BASE_URL}/{endpoint}");
        let bbox = format!("bbox:{}", region.to_query());

        let response = self
            .client
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("in", bbox.as_str()),
                ("locationReferencing", "shape"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

// ============================================================================
// Feed payload schema
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowResponse {
    source_updated: Option<String>,
    #[serde(default)]
    results: Vec<FlowResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowResult {
    location: Option<ApiLocation>,
    current_flow: Option<ApiCurrentFlow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiLocation {
    description: Option<String>,
    shape: Option<ApiShape>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiShape {
    #[serde(default)]
    links: Vec<ApiLink>,
}

#[derive(Debug, Deserialize)]
struct ApiLink {
    #[serde(default)]
    points: Vec<ApiPoint>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ApiPoint {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCurrentFlow {
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    free_flow: f64,
    #[serde(default)]
    jam_factor: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncidentResponse {
    source_updated: Option<String>,
    #[serde(default)]
    results: Vec<IncidentResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncidentResult {
    location: Option<ApiLocation>,
    incident_details: Option<ApiIncidentDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiIncidentDetails {
    description: Option<ApiText>,
    criticality: Option<String>,
    #[serde(rename = "type")]
    incident_type: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    #[serde(default)]
    road_closed: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ApiText {
    value: Option<String>,
}

// ============================================================================
// Conversion to records
// ============================================================================

/// First point of the location's first shape link, or (0, 0) when the feed
/// sent no shape.
fn first_position(location: &ApiLocation) -> GeoPoint {
    location
        .shape
        .as_ref()
        .and_then(|shape| shape.links.first())
        .and_then(|link| link.points.first())
        .map_or(GeoPoint::new(0.0, 0.0), |p| GeoPoint::new(p.lat, p.lng))
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn flow_records(payload: FlowResponse) -> Vec<RawRecord> {
    let source_updated = parse_time(payload.source_updated.as_deref());

    payload
        .results
        .into_iter()
        .map(|result| {
            let location = result.location.unwrap_or_default();
            let flow = result.current_flow.unwrap_or_default();
            RawRecord {
                description: location
                    .description
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
                position: first_position(&location),
                details: RecordDetails::Flow(FlowConditions {
                    speed: flow.speed,
                    free_flow_speed: flow.free_flow,
                    jam_factor: flow.jam_factor,
                }),
                source_updated,
            }
        })
        .collect()
}

fn incident_records(payload: IncidentResponse) -> Vec<RawRecord> {
    let source_updated = parse_time(payload.source_updated.as_deref());

    payload
        .results
        .into_iter()
        .map(|result| {
            let location = result.location.unwrap_or_default();
            let details = result.incident_details.unwrap_or_default();

            let description = details
                .description
                .and_then(|text| text.value)
                .or_else(|| location.description.clone())
                .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());

            RawRecord {
                description,
                position: first_position(&location),
                details: RecordDetails::Incident(IncidentInfo {
                    criticality: details
                        .criticality
                        .as_deref()
                        .and_then(Criticality::from_label),
                    incident_type: details.incident_type.unwrap_or_default(),
                    start_time: parse_time(details.start_time.as_deref()),
                    end_time: parse_time(details.end_time.as_deref()),
                    road_closed: details.road_closed,
                }),
                source_updated,
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_query_format() {
        let bbox = BoundingBox::new(13.08836, 52.33812, 13.761, 52.6755);
        assert_eq!(bbox.to_query(), "13.08836,52.33812,13.761,52.6755");
    }

    #[test]
    fn test_decode_flow_payload() {
        let json = r#"{
            "sourceUpdated": "2024-05-01T11:58:00Z",
            "results": [
                {
                    "location": {
                        "description": "Kurfürstendamm",
                        "shape": {
                            "links": [
                                { "points": [ { "lat": 52.5033, "lng": 13.3305 } ] }
                            ]
                        }
                    },
                    "currentFlow": { "speed": 12.4, "freeFlow": 13.9, "jamFactor": 2.2 }
                },
                {
                    "location": {},
                    "currentFlow": {}
                }
            ]
        }"#;
        let payload: FlowResponse = serde_json::from_str(json).unwrap();
        let records = flow_records(payload);
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].description, "Kurfürstendamm");
        assert_eq!(records[0].position, GeoPoint::new(52.5033, 13.3305));
        assert!(records[0].source_updated.is_some());
        match &records[0].details {
            RecordDetails::Flow(flow) => {
                assert_eq!(flow.speed, 12.4);
                assert_eq!(flow.free_flow_speed, 13.9);
                assert_eq!(flow.jam_factor, 2.2);
            }
            other => panic!("expected flow details, got {other:?}"),
        }

        // Missing fields fall back to their documented defaults.
        assert_eq!(records[1].description, UNKNOWN_LOCATION);
        assert_eq!(records[1].position, GeoPoint::new(0.0, 0.0));
        match &records[1].details {
            RecordDetails::Flow(flow) => assert_eq!(flow.jam_factor, 0.0),
            other => panic!("expected flow details, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_incident_payload() {
        let json = r#"{
            "results": [
                {
                    "location": {
                        "shape": {
                            "links": [
                                { "points": [ { "lat": 52.52, "lng": 13.405 } ] }
                            ]
                        }
                    },
                    "incidentDetails": {
                        "description": { "value": "Accident on A100" },
                        "criticality": "major",
                        "type": "accident",
                        "startTime": "2024-05-01T08:00:00Z",
                        "endTime": "2024-05-01T14:00:00Z",
                        "roadClosed": true
                    }
                },
                {
                    "incidentDetails": {
                        "criticality": "severe gridlock"
                    }
                }
            ]
        }"#;
        let payload: IncidentResponse = serde_json::from_str(json).unwrap();
        let records = incident_records(payload);
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].description, "Accident on A100");
        assert_eq!(records[0].position, GeoPoint::new(52.52, 13.405));
        match &records[0].details {
            RecordDetails::Incident(info) => {
                assert_eq!(info.criticality, Some(Criticality::Major));
                assert_eq!(info.incident_type, "accident");
                assert!(info.start_time.is_some());
                assert!(info.end_time.is_some());
                assert!(info.road_closed);
            }
            other => panic!("expected incident details, got {other:?}"),
        }

        // Unknown labels parse to None rather than failing the record.
        match &records[1].details {
            RecordDetails::Incident(info) => {
                assert_eq!(info.criticality, None);
                assert!(!info.road_closed);
                assert!(info.start_time.is_none());
            }
            other => panic!("expected incident details, got {other:?}"),
        }
        assert_eq!(records[1].description, UNKNOWN_LOCATION);
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert!(parse_time(Some("2024-05-01T08:00:00Z")).is_some());
        assert!(parse_time(Some("not a timestamp")).is_none());
        assert!(parse_time(None).is_none());
    }
}
