//! # Traffic Mapper
//!
//! Clustering and map-view preparation for live traffic data.
//!
//! This library provides:
//! - Record normalization with per-batch min-max feature scaling
//! - Dual clustering: fixed-k partitioning plus density-based outlier flagging
//! - Severity-ranked coloring and eager multi-view artifact building
//!
//! ## Features
//!
//! - **`http`** - Enable the HTTP feed client for live traffic APIs
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::Utc;
//! use traffic_mapper::{
//!     prepare_views, DatasetKind, FlowConditions, GeoPoint, PipelineConfig, RawRecord,
//!     RecordDetails, ViewArtifact, ViewMode,
//! };
//!
//! let records = vec![RawRecord {
//!     description: "Unter den Linden".to_string(),
//!     position: GeoPoint::new(52.5170, 13.3889),
//!     details: RecordDetails::Flow(FlowConditions {
//!         speed: 18.0,
//!         free_flow_speed: 50.0,
//!         jam_factor: 7.4,
//!     }),
//!     source_updated: Some(Utc::now()),
//! }];
//!
//! let views = prepare_views(DatasetKind::Flow, records, Utc::now(), &PipelineConfig::default());
//! assert_eq!(views.record_count(), 1);
//! assert!(matches!(views.artifact(ViewMode::Raw, true), ViewArtifact::Dots(_)));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod cluster;
pub mod normalize;
pub mod pipeline;
pub mod rank;
pub mod temporal;
pub mod view;

// HTTP module for feed fetching
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{BoundingBox, FetchError, HereClient};

pub use cluster::{ClusterAssignment, Dbscan, DensityClusterer, KMeans, PartitionClusterer, NOISE};
pub use normalize::{normalize_batch, NormalizedRecord, ScalingParams};
pub use pipeline::{prepare_views, BatchStage, CurrentBatch, PipelineConfig};
pub use rank::{criticality_color, rank_partition_colors, NOISE_COLOR, RAW_COLOR, SEVERITY_SCALE};
pub use temporal::filter_recent;
pub use view::{
    DotLayer, HeatCell, HeatLayer, RenderPoint, ViewArtifact, ViewConfig, ViewMode, ViewSet,
};

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use traffic_mapper::GeoPoint;
/// let point = GeoPoint::new(52.5200, 13.4050); // Berlin
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Create a new geographic point.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lng >= -180.0
            && self.lng <= 180.0
    }
}

/// Bounding box around a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from points. Returns `None` for empty input.
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.lat);
            max_lat = max_lat.max(p.lat);
            min_lng = min_lng.min(p.lng);
            max_lng = max_lng.max(p.lng);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// Which kind of dataset a batch holds. Flow and incident batches support
/// different view modes and density parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Flow,
    Incidents,
}

/// Categorical severity label for an incident record.
///
/// Unknown labels from the feed parse to `None` and carry ordinal 0 so the
/// record is kept rather than dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Minor,
    Moderate,
    Major,
}

impl Criticality {
    /// Parse a feed label case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "minor" => Some(Self::Minor),
            "moderate" => Some(Self::Moderate),
            "major" => Some(Self::Major),
            _ => None,
        }
    }

    /// Ordinal severity value: minor 1, moderate 2, major 3.
    pub fn ordinal(self) -> f64 {
        match self {
            Self::Minor => 1.0,
            Self::Moderate => 2.0,
            Self::Major => 3.0,
        }
    }

    /// Lowercase display label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Major => "major",
        }
    }
}

/// Congestion measurements carried by a flow record.
///
/// `jam_factor` is the upstream congestion metric, 0 (free-flowing) to
/// 10 (gridlock).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowConditions {
    pub speed: f64,
    pub free_flow_speed: f64,
    pub jam_factor: f64,
}

/// Incident metadata: severity label, active interval, closure flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentInfo {
    pub criticality: Option<Criticality>,
    pub incident_type: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub road_closed: bool,
}

/// Kind-specific payload of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordDetails {
    Flow(FlowConditions),
    Incident(IncidentInfo),
}

/// A single record from the traffic feed. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub description: String,
    pub position: GeoPoint,
    pub details: RecordDetails,
    pub source_updated: Option<DateTime<Utc>>,
}

impl RawRecord {
    /// Scalar severity metric used for clustering and ranking.
    ///
    /// Flow records use the jam factor directly; incident records map their
    /// criticality label to its ordinal, defaulting to 0 when the label is
    /// missing or was not recognized.
    pub fn severity(&self) -> f64 {
        match &self.details {
            RecordDetails::Flow(flow) => flow.jam_factor,
            RecordDetails::Incident(incident) => {
                incident.criticality.map_or(0.0, Criticality::ordinal)
            }
        }
    }

    /// Whether this record carries incident details.
    pub fn is_incident(&self) -> bool {
        matches!(self.details, RecordDetails::Incident(_))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_validation() {
        assert!(GeoPoint::new(52.5200, 13.4050).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 181.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_bounds_from_points() {
        let points = vec![
            GeoPoint::new(52.50, 13.30),
            GeoPoint::new(52.60, 13.40),
            GeoPoint::new(52.55, 13.35),
        ];
        let bounds = Bounds::from_points(&points).unwrap();
        assert_eq!(bounds.min_lat, 52.50);
        assert_eq!(bounds.max_lat, 52.60);
        assert_eq!(bounds.min_lng, 13.30);
        assert_eq!(bounds.max_lng, 13.40);

        let center = bounds.center();
        assert!((center.lat - 52.55).abs() < 1e-9);
        assert!((center.lng - 13.35).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_empty() {
        assert!(Bounds::from_points(&[]).is_none());
    }

    #[test]
    fn test_criticality_parsing() {
        assert_eq!(Criticality::from_label("minor"), Some(Criticality::Minor));
        assert_eq!(Criticality::from_label("MAJOR"), Some(Criticality::Major));
        assert_eq!(Criticality::from_label(" Moderate "), Some(Criticality::Moderate));
        assert_eq!(Criticality::from_label("critical"), None);
        assert_eq!(Criticality::from_label(""), None);
    }

    #[test]
    fn test_flow_severity_is_jam_factor() {
        let record = RawRecord {
            description: "A100".to_string(),
            position: GeoPoint::new(52.5, 13.4),
            details: RecordDetails::Flow(FlowConditions {
                speed: 30.0,
                free_flow_speed: 80.0,
                jam_factor: 6.3,
            }),
            source_updated: None,
        };
        assert_eq!(record.severity(), 6.3);
        assert!(!record.is_incident());
    }

    #[test]
    fn test_incident_severity_ordinal() {
        let mut record = RawRecord {
            description: "Accident on B96".to_string(),
            position: GeoPoint::new(52.5, 13.4),
            details: RecordDetails::Incident(IncidentInfo {
                criticality: Some(Criticality::Major),
                incident_type: "accident".to_string(),
                start_time: None,
                end_time: None,
                road_closed: true,
            }),
            source_updated: None,
        };
        assert_eq!(record.severity(), 3.0);
        assert!(record.is_incident());

        if let RecordDetails::Incident(ref mut info) = record.details {
            info.criticality = None;
        }
        assert_eq!(record.severity(), 0.0);
    }
}
